//! Batch preloader
//!
//! Primes the layered cache for a known set of keys and fields ahead of
//! bulk use (menu population, listings), collapsing an N-round-trip
//! pattern into one batched remote call per entity kind.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::cache::LayeredCache;
use crate::core::{EntityKey, RelationSet, Result};
use crate::remote::EntitySource;

/// Outcome statistics for one preload invocation
#[derive(Debug, Clone, Default)]
pub struct PreloadReport {
    pub entities_loaded: usize,
    pub remote_calls: usize,
    pub elapsed: Duration,
}

pub struct Preloader {
    source: Arc<dyn EntitySource>,
    cache: Arc<LayeredCache>,
}

impl Preloader {
    pub fn new(source: Arc<dyn EntitySource>, cache: Arc<LayeredCache>) -> Self {
        Self { source, cache }
    }

    /// Populate `fields` for all `keys` with one batched remote call
    /// per entity kind.
    ///
    /// Never memoized: preloading the same keys twice does the remote
    /// work twice — freshness is preferred over skipping work. Fetched
    /// values land in every tier as partial-field updates, so later
    /// `get_or_fetch` calls hit the cache for these fields.
    pub async fn preload(&self, keys: &[EntityKey], fields: &[String]) -> Result<PreloadReport> {
        let started = Instant::now();

        // BTreeMap for a deterministic kind order
        let mut by_kind: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for key in keys {
            let ids = by_kind.entry(key.kind.as_str()).or_default();
            if !ids.contains(&key.id) {
                ids.push(key.id.clone());
            }
        }

        let mut report = PreloadReport::default();
        for (kind, ids) in &by_kind {
            debug!("preloading {} {} entities", ids.len(), kind);
            let fetched = self.source.fetch_many(kind, ids, fields).await?;
            report.remote_calls += 1;

            for (id, field_map) in fetched {
                let key = EntityKey::new(*kind, id);
                self.cache.merge_fields(&key, field_map).await;
                report.entities_loaded += 1;
            }
        }

        report.elapsed = started.elapsed();
        info!(
            "preloaded {} entities in {} remote calls ({:.1}ms)",
            report.entities_loaded,
            report.remote_calls,
            report.elapsed.as_secs_f64() * 1000.0
        );
        Ok(report)
    }

    /// Prime a named relation (e.g. an asset's versions) and the listed
    /// members' fields in one pass.
    pub async fn preload_relation(
        &self,
        parent: &EntityKey,
        relation: &str,
        members: Vec<EntityKey>,
        fields: &[String],
    ) -> Result<PreloadReport> {
        self.cache.put_relation(RelationSet {
            parent: parent.clone(),
            relation: relation.to_string(),
            members: members.clone(),
        });
        self.preload(&members, fields).await
    }
}

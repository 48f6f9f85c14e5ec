//! Shared session
//!
//! Process-wide handle to the remote service with the layered cache
//! attached. All consuming components (browsers, publishers, hooks,
//! background workers) go through one handle so they observe the same
//! cache state instead of each opening an independent connection.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{CacheStats, CacheTier, DiskTier, LayeredCache, MemoryTier};
use crate::config::CacheConfig;
use crate::core::{EntityKey, EntitySnapshot, RelationSet, Result};
use crate::preload::{PreloadReport, Preloader};
use crate::refresh::{Operation, RefreshPolicy, StalenessHint};
use crate::remote::EntitySource;

static SHARED_SESSION: Lazy<RwLock<Option<Arc<SessionHandle>>>> =
    Lazy::new(|| RwLock::new(None));

/// Remote-service handle with the cache chain attached.
pub struct SessionHandle {
    source: Arc<dyn EntitySource>,
    cache: Arc<LayeredCache>,
    preloader: Preloader,
    policy: RefreshPolicy,
    degradations: Vec<String>,
}

impl SessionHandle {
    /// Build a handle with the tier chain derived from configuration.
    ///
    /// An unavailable durable tier degrades the chain to memory-only
    /// rather than failing construction; the degradation is recorded
    /// and logged.
    pub fn connect(config: &CacheConfig, source: Arc<dyn EntitySource>) -> Arc<Self> {
        let mut tiers: Vec<Arc<dyn CacheTier>> =
            vec![Arc::new(MemoryTier::new(config.memory.max_entries))];
        let mut degradations = Vec::new();

        if config.durable.enabled {
            let directory = config.durable_directory();
            match DiskTier::new(&directory, config.durable.max_entries) {
                Ok(tier) => {
                    info!("durable tier attached at {}", directory.display());
                    tiers.push(Arc::new(tier));
                }
                Err(e) => {
                    warn!(
                        "durable tier unavailable at {}: {} (running memory-only)",
                        directory.display(),
                        e
                    );
                    degradations.push(format!("durable tier unavailable: {e}"));
                }
            }
        } else {
            degradations.push("durable tier disabled by configuration".to_string());
        }

        let cache = Arc::new(LayeredCache::new(tiers));
        let preloader = Preloader::new(source.clone(), cache.clone());

        Arc::new(Self {
            source,
            cache,
            preloader,
            policy: RefreshPolicy,
            degradations,
        })
    }

    /// Read through the cache chain, fetching from the remote service
    /// on a full miss. Concurrent callers for the same entity share one
    /// round trip.
    pub async fn get_or_fetch(&self, kind: &str, id: &str) -> Result<EntitySnapshot> {
        let key = EntityKey::new(kind, id);
        let source = Arc::clone(&self.source);
        let fetch_key = key.clone();
        self.cache
            .get_or_fetch(&key, move || async move { source.fetch_one(&fetch_key).await })
            .await
    }

    /// Cached read without any remote fallback.
    pub async fn get(&self, key: &EntityKey) -> Option<EntitySnapshot> {
        self.cache.get(key).await
    }

    /// Prime the chain with authoritative data, e.g. after a remote write.
    pub async fn put(&self, snapshot: EntitySnapshot) {
        let key = snapshot.key.clone();
        self.cache.put(&key, snapshot).await;
    }

    /// Run an operation through the refresh policy.
    ///
    /// Forced operations issue a targeted remote repopulation of the
    /// policy-selected fields only; every other field keeps its cached
    /// value. Non-forced operations fall back to the normal chain read.
    pub async fn read_with_policy(
        &self,
        key: &EntityKey,
        operation: &Operation,
        hint: StalenessHint,
    ) -> Result<EntitySnapshot> {
        if !self.policy.should_force_remote(operation, hint) {
            return self.get_or_fetch(&key.kind, &key.id).await;
        }

        let fields: Vec<String> = self
            .policy
            .fields_to_repopulate(operation)
            .unwrap_or_default()
            .into_iter()
            .collect();

        let fetched = self
            .source
            .fetch_many(&key.kind, std::slice::from_ref(&key.id), &fields)
            .await?;
        let field_map = fetched.get(&key.id).cloned().unwrap_or_else(HashMap::new);
        Ok(self.cache.merge_fields(key, field_map).await)
    }

    /// User-initiated forced refresh of specific fields.
    pub async fn refresh(
        &self,
        key: &EntityKey,
        fields: HashSet<String>,
    ) -> Result<EntitySnapshot> {
        self.read_with_policy(
            key,
            &Operation::ExplicitRefresh { fields },
            StalenessHint::MayBeStale,
        )
        .await
    }

    /// Bulk-prime related data before a listing operation.
    pub async fn preload(&self, keys: &[EntityKey], fields: &[String]) -> Result<PreloadReport> {
        self.preloader.preload(keys, fields).await
    }

    pub async fn preload_relation(
        &self,
        parent: &EntityKey,
        relation: &str,
        members: Vec<EntityKey>,
        fields: &[String],
    ) -> Result<PreloadReport> {
        self.preloader
            .preload_relation(parent, relation, members, fields)
            .await
    }

    pub fn get_relation(&self, parent: &EntityKey, relation: &str) -> Option<RelationSet> {
        self.cache.get_relation(parent, relation)
    }

    pub async fn evict(&self, key: &EntityKey) {
        self.cache.evict(key).await;
    }

    pub async fn clear(&self) {
        self.cache.clear().await;
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Capabilities that were unavailable at construction time.
    pub fn degradations(&self) -> &[String] {
        &self.degradations
    }
}

/// Get the process-wide shared session, creating it on first call.
///
/// Single-winner initialization: concurrent first-callers never
/// construct two handles; later calls return the existing handle and
/// ignore their arguments.
pub fn get_shared_session(
    config: &CacheConfig,
    source: Arc<dyn EntitySource>,
) -> Arc<SessionHandle> {
    if let Some(handle) = SHARED_SESSION.read().as_ref() {
        return Arc::clone(handle);
    }

    let mut slot = SHARED_SESSION.write();
    if let Some(handle) = slot.as_ref() {
        // Lost the construction race; use the winner's handle
        return Arc::clone(handle);
    }

    info!("creating shared session");
    let handle = SessionHandle::connect(config, source);
    *slot = Some(Arc::clone(&handle));
    handle
}

/// Drop the shared session so the next call reconstructs it.
///
/// Callers still holding the old handle keep a working (now private)
/// session; intended for tests and reconnection.
pub fn reset_shared_session() {
    *SHARED_SESSION.write() = None;
    info!("shared session reset");
}

//! Layered cache chain
//!
//! Ordered tier walk (fast memory first, durable disk second) with
//! promotion on hit, write-through puts, and per-key coalescing of
//! remote fetches so fan-out callers share one round trip.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, watch};
use tracing::{debug, warn};

use super::tier::{CacheTier, TierStats};
use crate::core::{CacheError, EntityKey, EntitySnapshot, RelationSet, Result};

type FetchOutcome = Result<EntitySnapshot>;
type FlightMap = HashMap<EntityKey, watch::Receiver<Option<FetchOutcome>>>;

/// Aggregate view over the whole chain
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    /// Remote fetches actually issued by `get_or_fetch`
    pub remote_fetches: u64,
    /// Callers that joined someone else's in-flight fetch
    pub coalesced_waits: u64,
    pub tiers: Vec<TierStats>,
}

/// Ordered chain of cache tiers wrapping the remote service.
pub struct LayeredCache {
    tiers: Vec<Arc<dyn CacheTier>>,
    flights: Arc<Mutex<FlightMap>>,
    relations: RwLock<HashMap<(EntityKey, String), Vec<EntityKey>>>,
    remote_fetches: AtomicU64,
    coalesced_waits: AtomicU64,
}

impl LayeredCache {
    /// Build a chain from tiers in query order (fastest first).
    pub fn new(tiers: Vec<Arc<dyn CacheTier>>) -> Self {
        Self {
            tiers,
            flights: Arc::new(Mutex::new(HashMap::new())),
            relations: RwLock::new(HashMap::new()),
            remote_fetches: AtomicU64::new(0),
            coalesced_waits: AtomicU64::new(0),
        }
    }

    /// Walk the tiers in order; a hit at tier `i` is promoted into
    /// every tier before it. Tier read errors are logged and treated
    /// as misses at that tier.
    pub async fn get(&self, key: &EntityKey) -> Option<EntitySnapshot> {
        for (i, tier) in self.tiers.iter().enumerate() {
            match tier.get(key).await {
                Ok(Some(snapshot)) => {
                    for faster in &self.tiers[..i] {
                        if let Err(e) = faster.put(key, snapshot.clone()).await {
                            warn!("promotion to {} tier failed for {}: {}", faster.name(), key, e);
                        }
                    }
                    return Some(snapshot);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("{} tier read failed for {}: {} (treating as miss)", tier.name(), key, e);
                }
            }
        }
        None
    }

    /// Prime every tier with authoritative data (e.g. after a remote
    /// write) without a fetch. Tier write failures degrade that tier,
    /// they do not fail the put.
    pub async fn put(&self, key: &EntityKey, snapshot: EntitySnapshot) {
        for tier in &self.tiers {
            if let Err(e) = tier.put(key, snapshot.clone()).await {
                warn!("{} tier write failed for {}: {}", tier.name(), key, e);
            }
        }
    }

    /// Core read primitive: serve from the chain, or run `fetch` at
    /// most once per key per miss.
    ///
    /// Concurrent callers for the same key await the single in-flight
    /// fetch. The fetch runs on a spawned task, so a caller abandoning
    /// interest never cancels it for other waiters; the result still
    /// populates the tiers for whoever asks next. Fetch errors are
    /// delivered to every waiter and are never cached.
    pub async fn get_or_fetch<F, Fut>(&self, key: &EntityKey, fetch: F) -> Result<EntitySnapshot>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchOutcome> + Send + 'static,
    {
        if let Some(snapshot) = self.get(key).await {
            return Ok(snapshot);
        }

        let mut rx = {
            let mut flights = self.flights.lock().await;
            if let Some(rx) = flights.get(key) {
                self.coalesced_waits.fetch_add(1, Ordering::Relaxed);
                debug!("joining in-flight fetch for {}", key);
                rx.clone()
            } else {
                let (tx, rx) = watch::channel(None);
                flights.insert(key.clone(), rx.clone());
                self.remote_fetches.fetch_add(1, Ordering::Relaxed);

                let future = fetch();
                let tiers = self.tiers.clone();
                let flights = Arc::clone(&self.flights);
                let fetch_key = key.clone();
                tokio::spawn(async move {
                    let outcome = future.await;
                    if let Ok(snapshot) = &outcome {
                        for tier in &tiers {
                            if let Err(e) = tier.put(&fetch_key, snapshot.clone()).await {
                                warn!(
                                    "{} tier write failed for {}: {}",
                                    tier.name(),
                                    fetch_key,
                                    e
                                );
                            }
                        }
                    }
                    // Clear the flight before publishing so no later
                    // caller ever joins a finished fetch
                    flights.lock().await.remove(&fetch_key);
                    tx.send_replace(Some(outcome));
                });
                rx
            }
        };

        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                // Sender gone; the final value must already be set
                let last = rx.borrow().clone();
                return last.unwrap_or_else(|| Err(CacheError::Coalescing(key.to_string())));
            }
        }
    }

    /// Partial-field update: overwrite only the given fields in the
    /// cached snapshot (creating one if absent) and write the result
    /// through every tier.
    pub async fn merge_fields(
        &self,
        key: &EntityKey,
        fields: HashMap<String, serde_json::Value>,
    ) -> EntitySnapshot {
        let merged = match self.get(key).await {
            Some(existing) => existing.with_fields(fields),
            None => EntitySnapshot::new(key.clone(), fields),
        };
        self.put(key, merged.clone()).await;
        merged
    }

    pub fn put_relation(&self, relation: RelationSet) {
        self.relations.write().insert(
            (relation.parent.clone(), relation.relation.clone()),
            relation.members,
        );
    }

    pub fn get_relation(&self, parent: &EntityKey, relation: &str) -> Option<RelationSet> {
        self.relations
            .read()
            .get(&(parent.clone(), relation.to_string()))
            .map(|members| RelationSet {
                parent: parent.clone(),
                relation: relation.to_string(),
                members: members.clone(),
            })
    }

    /// Drop the key from every tier
    pub async fn evict(&self, key: &EntityKey) {
        for tier in &self.tiers {
            if let Err(e) = tier.evict(key).await {
                warn!("{} tier evict failed for {}: {}", tier.name(), key, e);
            }
        }
    }

    pub async fn clear(&self) {
        for tier in &self.tiers {
            if let Err(e) = tier.clear().await {
                warn!("{} tier clear failed: {}", tier.name(), e);
            }
        }
        self.relations.write().clear();
    }

    pub fn tier_stats(&self) -> Vec<TierStats> {
        self.tiers.iter().map(|t| t.stats()).collect()
    }

    pub fn stats(&self) -> CacheStats {
        let tiers = self.tier_stats();
        CacheStats {
            hits: tiers.iter().map(|t| t.hits).sum(),
            misses: tiers.iter().map(|t| t.misses).sum(),
            evictions: tiers.iter().map(|t| t.evictions).sum(),
            entries: tiers.iter().map(|t| t.entries).sum(),
            remote_fetches: self.remote_fetches.load(Ordering::Relaxed),
            coalesced_waits: self.coalesced_waits.load(Ordering::Relaxed),
            tiers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{DiskTier, MemoryTier};
    use serde_json::json;
    use tempfile::tempdir;

    fn memory_only(capacity: usize) -> LayeredCache {
        LayeredCache::new(vec![Arc::new(MemoryTier::new(capacity))])
    }

    fn snapshot(kind: &str, id: &str, name: &str) -> EntitySnapshot {
        EntitySnapshot::new(
            EntityKey::new(kind, id),
            HashMap::from([("name".to_string(), json!(name))]),
        )
    }

    #[tokio::test]
    async fn test_put_short_circuits_fetch() {
        let cache = memory_only(100);
        let key = EntityKey::new("AssetVersion", "v1");
        cache.put(&key, snapshot("AssetVersion", "v1", "v044")).await;

        let got = cache
            .get_or_fetch(&key, || async {
                Err(CacheError::RemoteUnavailable("must not be called".into()))
            })
            .await
            .unwrap();
        assert_eq!(got.field("name"), Some(&json!("v044")));
    }

    #[tokio::test]
    async fn test_miss_fetches_and_populates() {
        let cache = memory_only(100);
        let key = EntityKey::new("Component", "c1");

        let fetched = snapshot("Component", "c1", "maya_part");
        let got = cache
            .get_or_fetch(&key, {
                let fetched = fetched.clone();
                move || async move { Ok(fetched) }
            })
            .await
            .unwrap();
        assert_eq!(got.field("name"), Some(&json!("maya_part")));

        // Second read is a pure cache hit
        assert!(cache.get(&key).await.is_some());
        assert_eq!(cache.stats().remote_fetches, 1);
    }

    #[tokio::test]
    async fn test_fetch_error_not_cached() {
        let cache = memory_only(100);
        let key = EntityKey::new("Component", "c1");

        let err = cache
            .get_or_fetch(&key, || async {
                Err(CacheError::RemoteUnavailable("down".into()))
            })
            .await;
        assert!(matches!(err, Err(CacheError::RemoteUnavailable(_))));
        assert!(cache.get(&key).await.is_none());

        // Key is not left marked in-flight; the retry fetches again
        let got = cache
            .get_or_fetch(&key, || async { Ok(snapshot("Component", "c1", "ok")) })
            .await
            .unwrap();
        assert_eq!(got.field("name"), Some(&json!("ok")));
        assert_eq!(cache.stats().remote_fetches, 2);
    }

    #[tokio::test]
    async fn test_hit_promotes_to_faster_tier() {
        let dir = tempdir().unwrap();
        let memory = Arc::new(MemoryTier::new(100));
        let disk = Arc::new(DiskTier::new(dir.path(), 1000).unwrap());
        let cache = LayeredCache::new(vec![memory.clone(), disk.clone()]);

        let key = EntityKey::new("AssetVersion", "v1");
        disk.put(&key, snapshot("AssetVersion", "v1", "v044"))
            .await
            .unwrap();

        assert!(cache.get(&key).await.is_some());

        // Snapshot now sits in the memory tier as well
        assert!(memory.get(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_merge_fields_partial_update() {
        let cache = memory_only(100);
        let key = EntityKey::new("Component", "c1");
        cache
            .put(
                &key,
                EntitySnapshot::new(
                    key.clone(),
                    HashMap::from([
                        ("name".to_string(), json!("maya_part")),
                        ("size".to_string(), json!(1024)),
                    ]),
                ),
            )
            .await;

        let merged = cache
            .merge_fields(
                &key,
                HashMap::from([("component_locations".to_string(), json!(["studio"]))]),
            )
            .await;

        assert_eq!(merged.field("name"), Some(&json!("maya_part")));
        assert_eq!(merged.field("size"), Some(&json!(1024)));
        assert_eq!(merged.field("component_locations"), Some(&json!(["studio"])));
    }

    #[tokio::test]
    async fn test_relations_cached_separately() {
        let cache = memory_only(100);
        let asset = EntityKey::new("Asset", "a1");
        let members = vec![
            EntityKey::new("AssetVersion", "v1"),
            EntityKey::new("AssetVersion", "v2"),
        ];

        cache.put_relation(RelationSet {
            parent: asset.clone(),
            relation: "versions".to_string(),
            members: members.clone(),
        });

        let got = cache.get_relation(&asset, "versions").unwrap();
        assert_eq!(got.members, members);
        assert!(cache.get_relation(&asset, "components").is_none());

        // Relation members' own snapshots are not implicitly cached
        assert!(cache.get(&members[0]).await.is_none());
    }

    #[tokio::test]
    async fn test_evict_removes_from_all_tiers() {
        let dir = tempdir().unwrap();
        let cache = LayeredCache::new(vec![
            Arc::new(MemoryTier::new(100)),
            Arc::new(DiskTier::new(dir.path(), 1000).unwrap()),
        ]);

        let key = EntityKey::new("Asset", "a1");
        cache.put(&key, snapshot("Asset", "a1", "hero")).await;
        cache.evict(&key).await;

        assert!(cache.get(&key).await.is_none());
    }
}

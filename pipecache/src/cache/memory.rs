use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use super::tier::{CacheTier, TierStats};
use crate::core::{EntityKey, EntitySnapshot, Result};

/// Fast in-memory tier with LRU eviction.
///
/// Bounded by entry count; insertion past the bound evicts the
/// least-recently-used entry first. Eviction here never touches the
/// durable tier.
pub struct MemoryTier {
    inner: RwLock<LruState>,
}

struct LruState {
    data: HashMap<EntityKey, EntitySnapshot>,

    /// LRU ordering (most recent at back)
    order: VecDeque<EntityKey>,

    max_entries: usize,

    hits: u64,
    misses: u64,
    evictions: u64,
}

impl MemoryTier {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: RwLock::new(LruState {
                data: HashMap::new(),
                order: VecDeque::new(),
                max_entries: max_entries.max(1),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().data.is_empty()
    }
}

impl Default for MemoryTier {
    fn default() -> Self {
        // Default fast tier: 10,000 entries
        Self::new(10_000)
    }
}

#[async_trait::async_trait]
impl CacheTier for MemoryTier {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &EntityKey) -> Result<Option<EntitySnapshot>> {
        let mut state = self.inner.write();

        if let Some(snapshot) = state.data.get(key).cloned() {
            // Move to back of LRU (most recent)
            state.order.retain(|k| k != key);
            state.order.push_back(key.clone());
            state.hits += 1;
            debug!("memory tier HIT for {}", key);
            Ok(Some(snapshot))
        } else {
            state.misses += 1;
            debug!("memory tier MISS for {}", key);
            Ok(None)
        }
    }

    async fn put(&self, key: &EntityKey, snapshot: EntitySnapshot) -> Result<()> {
        let mut state = self.inner.write();

        // If key exists, this is a replacement, not a new entry
        if state.data.remove(key).is_some() {
            state.order.retain(|k| k != key);
        }

        // Evict least-recently-used entries before inserting past the bound
        while state.data.len() >= state.max_entries && !state.order.is_empty() {
            if let Some(evict_key) = state.order.pop_front() {
                state.data.remove(&evict_key);
                state.evictions += 1;
                debug!("memory tier EVICT {}", evict_key);
            }
        }

        state.data.insert(key.clone(), snapshot);
        state.order.push_back(key.clone());
        Ok(())
    }

    async fn evict(&self, key: &EntityKey) -> Result<()> {
        let mut state = self.inner.write();
        if state.data.remove(key).is_some() {
            state.order.retain(|k| k != key);
            state.evictions += 1;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.inner.write();
        let count = state.data.len();
        state.data.clear();
        state.order.clear();
        debug!("memory tier CLEAR ({} entries)", count);
        Ok(())
    }

    fn stats(&self) -> TierStats {
        let state = self.inner.read();
        TierStats {
            tier: "memory".to_string(),
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            entries: state.data.len(),
        }
    }
}

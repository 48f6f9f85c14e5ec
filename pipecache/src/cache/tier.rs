use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{EntityKey, EntitySnapshot, Result};

/// One layer in the cache chain.
///
/// The `LayeredCache` exclusively owns the ordered list of tiers; tiers
/// do not know about each other. A tier error on read is treated as a
/// miss at that tier by the chain, never as a fatal failure.
#[async_trait]
pub trait CacheTier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get(&self, key: &EntityKey) -> Result<Option<EntitySnapshot>>;

    async fn put(&self, key: &EntityKey, snapshot: EntitySnapshot) -> Result<()>;

    async fn evict(&self, key: &EntityKey) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    fn stats(&self) -> TierStats;
}

/// Per-tier counters, mutated only by the owning tier
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierStats {
    pub tier: String,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

//! Instrumentation decorator
//!
//! Wraps any tier (or the whole chain) and records hit/miss and latency
//! counters without altering behavior.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::tier::{CacheTier, TierStats};
use crate::core::{EntityKey, EntitySnapshot, Result};

/// Pure-observation wrapper around a cache tier.
///
/// Forwards every call unchanged; return values and error behavior of
/// the wrapped tier are untouched.
pub struct InstrumentedTier {
    inner: Arc<dyn CacheTier>,
    metrics: Mutex<OpMetrics>,
}

#[derive(Debug, Clone, Default)]
struct OpMetrics {
    gets: u64,
    puts: u64,
    hits: u64,
    misses: u64,
    get_time: Duration,
    put_time: Duration,
}

/// Aggregate counts and timing recorded by an [`InstrumentedTier`]
#[derive(Debug, Clone, Default)]
pub struct InstrumentReport {
    pub gets: u64,
    pub puts: u64,
    pub hits: u64,
    pub misses: u64,
    pub total_get_ms: f64,
    pub total_put_ms: f64,
    pub avg_get_ms: f64,
    pub avg_put_ms: f64,
}

impl InstrumentedTier {
    pub fn new(inner: Arc<dyn CacheTier>) -> Self {
        Self {
            inner,
            metrics: Mutex::new(OpMetrics::default()),
        }
    }

    pub fn report(&self) -> InstrumentReport {
        let m = self.metrics.lock();
        let total_get_ms = m.get_time.as_secs_f64() * 1000.0;
        let total_put_ms = m.put_time.as_secs_f64() * 1000.0;
        InstrumentReport {
            gets: m.gets,
            puts: m.puts,
            hits: m.hits,
            misses: m.misses,
            total_get_ms,
            total_put_ms,
            avg_get_ms: if m.gets > 0 {
                total_get_ms / m.gets as f64
            } else {
                0.0
            },
            avg_put_ms: if m.puts > 0 {
                total_put_ms / m.puts as f64
            } else {
                0.0
            },
        }
    }
}

#[async_trait::async_trait]
impl CacheTier for InstrumentedTier {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn get(&self, key: &EntityKey) -> Result<Option<EntitySnapshot>> {
        let started = Instant::now();
        let result = self.inner.get(key).await;
        let elapsed = started.elapsed();

        let mut m = self.metrics.lock();
        m.gets += 1;
        m.get_time += elapsed;
        match &result {
            Ok(Some(_)) => {
                m.hits += 1;
                debug!(
                    "{} HIT for {} ({:.1}ms)",
                    self.inner.name(),
                    key,
                    elapsed.as_secs_f64() * 1000.0
                );
            }
            _ => {
                m.misses += 1;
                debug!(
                    "{} MISS for {} ({:.1}ms)",
                    self.inner.name(),
                    key,
                    elapsed.as_secs_f64() * 1000.0
                );
            }
        }
        result
    }

    async fn put(&self, key: &EntityKey, snapshot: EntitySnapshot) -> Result<()> {
        let started = Instant::now();
        let result = self.inner.put(key, snapshot).await;

        let mut m = self.metrics.lock();
        m.puts += 1;
        m.put_time += started.elapsed();
        result
    }

    async fn evict(&self, key: &EntityKey) -> Result<()> {
        self.inner.evict(key).await
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }

    fn stats(&self) -> TierStats {
        self.inner.stats()
    }
}

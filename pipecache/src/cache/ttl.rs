//! Short-lived lookup cache
//!
//! Independent of the layered chain. Latency-sensitive call sites that
//! accept bounded staleness instantiate one of these per owner instead
//! of touching the main session cache.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default staleness window: 5 minutes
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

struct TtlEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Key/value cache with per-entry expiry.
///
/// Entries past their expiry read as absent (lazy expiry); an explicit
/// `cleanup_expired` sweep exists for memory reclamation.
pub struct TtlCache<K: Eq + Hash + Clone, V: Clone> {
    entries: RwLock<HashMap<K, TtlEntry<V>>>,
    default_ttl: Duration,
    max_entries: Option<usize>,
}

/// Snapshot of the cache population
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TtlStats {
    pub valid_items: usize,
    pub expired_items: usize,
    pub total_items: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            max_entries: None,
        }
    }

    /// Capped variant: inserting past the bound evicts the
    /// oldest-expiring entry first.
    pub fn with_capacity(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            max_entries: Some(max_entries.max(1)),
        }
    }

    /// Returns the value if present and not expired.
    ///
    /// An expired entry counts as a miss and is evicted on read.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if now < entry.expires_at => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Present but expired
        self.entries.write().remove(key);
        None
    }

    pub fn put(&self, key: K, value: V) {
        self.put_with_ttl(key, value, self.default_ttl);
    }

    /// Overwrites any existing entry with a fresh expiry of `now + ttl`.
    pub fn put_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let mut entries = self.entries.write();

        if let Some(max) = self.max_entries {
            if entries.len() >= max && !entries.contains_key(&key) {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.expires_at)
                    .map(|(k, _)| k.clone());
                if let Some(k) = oldest {
                    entries.remove(&k);
                }
            }
        }

        entries.insert(
            key,
            TtlEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn remove(&self, key: &K) {
        self.entries.write().remove(key);
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write();
        let count = entries.len();
        entries.clear();
        debug!("ttl cache cleared ({} entries)", count);
    }

    /// Remove all expired entries, returning how many were dropped
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| now < e.expires_at);
        before - entries.len()
    }

    pub fn stats(&self) -> TtlStats {
        let now = Instant::now();
        let entries = self.entries.read();
        let valid = entries.values().filter(|e| now < e.expires_at).count();
        TtlStats {
            valid_items: valid,
            expired_items: entries.len() - valid,
            total_items: entries.len(),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identity of a remotely-managed entity: kind plus identifier.
///
/// Unique across the remote graph and used as the cache key everywhere.
/// Identity never changes after creation; snapshot content changes only
/// by replacement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub kind: String,
    pub id: String,
}

impl EntityKey {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Stable string form used by the durable tier's index.
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Locally cached field values for one entity at one point in time.
///
/// Immutable once stored. A refresh produces a new snapshot that
/// replaces the old one; `with_fields` merges an explicitly-populated
/// field subset, leaving everything else as previously cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub key: EntityKey,
    pub fields: HashMap<String, Value>,
    /// Unix timestamp (seconds) of the fetch that produced this snapshot
    pub fetched_at: u64,
}

impl EntitySnapshot {
    pub fn new(key: EntityKey, fields: HashMap<String, Value>) -> Self {
        Self {
            key,
            fields,
            fetched_at: current_timestamp(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Build a replacement snapshot with the given fields overwritten.
    ///
    /// Fields not named keep their previously cached values. The fetch
    /// timestamp advances to now.
    pub fn with_fields(&self, fields: HashMap<String, Value>) -> Self {
        let mut merged = self.fields.clone();
        merged.extend(fields);
        Self {
            key: self.key.clone(),
            fields: merged,
            fetched_at: current_timestamp(),
        }
    }

    /// Seconds since this snapshot was fetched
    pub fn age_secs(&self) -> u64 {
        current_timestamp().saturating_sub(self.fetched_at)
    }
}

/// Ordered set of related entity keys reachable via a named relation
/// (e.g. an Asset's versions, a Version's components).
///
/// Cached separately from the related entities' own snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationSet {
    pub parent: EntityKey,
    pub relation: String,
    pub members: Vec<EntityKey>,
}

/// Get current Unix timestamp
pub(crate) fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

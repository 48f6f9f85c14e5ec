//! Remote entity-graph collaborator
//!
//! The cache treats the remote service as an opaque capability and the
//! only source of truth on a miss. Timeouts and retries belong to the
//! implementation behind this trait; the cache propagates its errors
//! unchanged and never caches a negative result.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::core::{EntityKey, EntitySnapshot, Result};

/// Field name -> value map for one entity, as returned by a batched fetch
pub type FieldMap = HashMap<String, Value>;

#[async_trait]
pub trait EntitySource: Send + Sync {
    /// Fetch the full snapshot for a single entity.
    async fn fetch_one(&self, key: &EntityKey) -> Result<EntitySnapshot>;

    /// Fetch the named fields for many entities of one kind in a single
    /// batched call. Returns a map of id -> partial field map; ids the
    /// remote does not know are simply absent from the result.
    async fn fetch_many(
        &self,
        kind: &str,
        ids: &[String],
        fields: &[String],
    ) -> Result<HashMap<String, FieldMap>>;
}

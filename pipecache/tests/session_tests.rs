use async_trait::async_trait;
use pipecache::{
    CacheConfig, EntityKey, EntitySnapshot, EntitySource, FieldMap, Operation, Result,
    SessionHandle, StalenessHint, get_shared_session, reset_shared_session,
};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::tempdir;

/// Test double for the remote entity-graph service
struct StubSource {
    fetch_one_calls: AtomicUsize,
    fetch_many_calls: AtomicUsize,
    /// Fields requested by the last fetch_many
    last_fields: Mutex<Vec<String>>,
}

impl StubSource {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            fetch_one_calls: AtomicUsize::new(0),
            fetch_many_calls: AtomicUsize::new(0),
            last_fields: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl EntitySource for StubSource {
    async fn fetch_one(&self, key: &EntityKey) -> Result<EntitySnapshot> {
        self.fetch_one_calls.fetch_add(1, Ordering::SeqCst);
        Ok(EntitySnapshot::new(
            key.clone(),
            HashMap::from([("name".to_string(), json!(format!("remote-{}", key.id)))]),
        ))
    }

    async fn fetch_many(
        &self,
        _kind: &str,
        ids: &[String],
        fields: &[String],
    ) -> Result<HashMap<String, FieldMap>> {
        self.fetch_many_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_fields.lock() = fields.to_vec();

        let mut out = HashMap::new();
        for id in ids {
            let mut map = FieldMap::new();
            for field in fields {
                map.insert(field.clone(), json!(format!("fresh-{field}-{id}")));
            }
            out.insert(id.clone(), map);
        }
        Ok(out)
    }
}

fn memory_only_config() -> CacheConfig {
    let mut config = CacheConfig::default();
    config.durable.enabled = false;
    config
}

fn durable_config(directory: &std::path::Path) -> CacheConfig {
    let mut config = CacheConfig::default();
    config.durable.directory = Some(directory.to_path_buf());
    config
}

#[tokio::test]
async fn test_get_or_fetch_roundtrip_then_cached() {
    let source = StubSource::new();
    let session = SessionHandle::connect(&memory_only_config(), source.clone());

    let first = session.get_or_fetch("AssetVersion", "v1").await.unwrap();
    assert_eq!(first.field("name"), Some(&json!("remote-v1")));
    assert_eq!(source.fetch_one_calls.load(Ordering::SeqCst), 1);

    // Second read comes from the cache
    let second = session.get_or_fetch("AssetVersion", "v1").await.unwrap();
    assert_eq!(second.field("name"), Some(&json!("remote-v1")));
    assert_eq!(source.fetch_one_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_forced_refresh_updates_only_named_fields() {
    let source = StubSource::new();
    let session = SessionHandle::connect(&memory_only_config(), source.clone());

    let key = EntityKey::new("AssetVersion", "v1");
    session
        .put(EntitySnapshot::new(
            key.clone(),
            HashMap::from([
                ("name".to_string(), json!("v044")),
                ("comment".to_string(), json!("old comment")),
            ]),
        ))
        .await;

    let refreshed = session
        .refresh(&key, HashSet::from(["comment".to_string()]))
        .await
        .unwrap();

    // Targeted repopulation: only "comment" was re-fetched
    assert_eq!(*source.last_fields.lock(), vec!["comment".to_string()]);
    assert_eq!(refreshed.field("comment"), Some(&json!("fresh-comment-v1")));
    assert_eq!(refreshed.field("name"), Some(&json!("v044")));

    // And the merged snapshot is what the cache now holds
    let cached = session.get(&key).await.unwrap();
    assert_eq!(cached.field("name"), Some(&json!("v044")));
}

#[tokio::test]
async fn test_browse_with_stale_hint_stays_on_cache_path() {
    let source = StubSource::new();
    let session = SessionHandle::connect(&memory_only_config(), source.clone());

    let key = EntityKey::new("Task", "t1");
    session
        .put(EntitySnapshot::new(
            key.clone(),
            HashMap::from([("name".to_string(), json!("animate"))]),
        ))
        .await;

    let got = session
        .read_with_policy(&key, &Operation::Browse, StalenessHint::MayBeStale)
        .await
        .unwrap();

    // The hint alone never forces a round trip
    assert_eq!(got.field("name"), Some(&json!("animate")));
    assert_eq!(source.fetch_one_calls.load(Ordering::SeqCst), 0);
    assert_eq!(source.fetch_many_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_preload_single_batched_call() {
    let source = StubSource::new();
    let session = SessionHandle::connect(&memory_only_config(), source.clone());

    let keys = vec![
        EntityKey::new("AssetVersion", "v1"),
        EntityKey::new("AssetVersion", "v2"),
        EntityKey::new("AssetVersion", "v3"),
    ];
    let report = session
        .preload(&keys, &["component_locations".to_string()])
        .await
        .unwrap();

    assert_eq!(source.fetch_many_calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.remote_calls, 1);
    assert_eq!(report.entities_loaded, 3);

    // Preload writes are visible to subsequent foreground reads
    let got = session.get(&keys[2]).await.unwrap();
    assert!(got.field("component_locations").is_some());
}

#[tokio::test]
async fn test_event_driven_invalidation_pattern() {
    // A "storage-location-membership changed" notification consumer is
    // expected to preload the targeted field for the affected keys.
    let source = StubSource::new();
    let session = SessionHandle::connect(&memory_only_config(), source.clone());

    let key = EntityKey::new("Component", "c1");
    session
        .put(EntitySnapshot::new(
            key.clone(),
            HashMap::from([
                ("name".to_string(), json!("maya_part")),
                ("component_locations".to_string(), json!(["studio"])),
            ]),
        ))
        .await;

    session
        .preload(
            std::slice::from_ref(&key),
            &["component_locations".to_string()],
        )
        .await
        .unwrap();

    let got = session.get(&key).await.unwrap();
    assert_eq!(
        got.field("component_locations"),
        Some(&json!("fresh-component_locations-c1"))
    );
    assert_eq!(got.field("name"), Some(&json!("maya_part")));
}

#[tokio::test]
async fn test_degraded_construction_without_durable_tier() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("not_a_dir");
    fs::write(&blocker, b"x").unwrap();

    let source = StubSource::new();
    let session = SessionHandle::connect(&durable_config(&blocker), source.clone());

    // Construction succeeded in memory-only mode
    assert!(!session.degradations().is_empty());
    let got = session.get_or_fetch("Asset", "a1").await.unwrap();
    assert_eq!(got.field("name"), Some(&json!("remote-a1")));
    assert_eq!(session.stats().tiers.len(), 1);
}

#[tokio::test]
async fn test_durable_tier_attached_when_available() {
    let dir = tempdir().unwrap();
    let source = StubSource::new();
    let session = SessionHandle::connect(&durable_config(dir.path()), source);

    assert!(session.degradations().is_empty());
    assert_eq!(session.stats().tiers.len(), 2);
}

#[tokio::test]
async fn test_shared_session_single_winner_and_reset() {
    let source = StubSource::new();
    let config = memory_only_config();

    let first = get_shared_session(&config, source.clone());
    let second = get_shared_session(&config, StubSource::new());
    assert!(Arc::ptr_eq(&first, &second));

    // Cache state is shared across callers
    first
        .put(EntitySnapshot::new(
            EntityKey::new("Project", "p1"),
            HashMap::from([("name".to_string(), json!("show"))]),
        ))
        .await;
    assert!(second.get(&EntityKey::new("Project", "p1")).await.is_some());

    reset_shared_session();
    let third = get_shared_session(&config, source);
    assert!(!Arc::ptr_eq(&first, &third));
}

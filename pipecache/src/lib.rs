//! pipecache — multi-tier entity cache for production asset pipelines
//!
//! Sits between client tools and a remote entity-graph service
//! (projects, tasks, assets, versions, components, storage locations),
//! minimizing round trips while keeping locally-held data usably fresh:
//!
//! - [`LayeredCache`]: fast in-memory LRU tier backed by a durable disk
//!   tier, with per-key coalescing of remote fetches
//! - [`TtlCache`]: independent short-lived lookup cache for
//!   latency-sensitive call sites
//! - [`Preloader`]: batched priming of many entities ahead of bulk use
//! - [`RefreshPolicy`]: explicit, field-scoped forced-refresh semantics
//! - [`SessionHandle`] / [`get_shared_session`]: one cache state per
//!   process, shared by every consumer

pub mod cache;
pub mod config;
pub mod core;
pub mod preload;
pub mod refresh;
pub mod remote;
pub mod session;

// Re-export commonly used types
pub use cache::{
    CacheStats, CacheTier, DiskTier, InstrumentReport, InstrumentedTier, LayeredCache, MemoryTier,
    TierStats, TtlCache, TtlStats,
};
pub use config::{CacheConfig, DURABLE_DIR_ENV};
pub use core::{CacheError, EntityKey, EntitySnapshot, RelationSet, Result};
pub use preload::{PreloadReport, Preloader};
pub use refresh::{Operation, RefreshPolicy, StalenessHint};
pub use remote::{EntitySource, FieldMap};
pub use session::{SessionHandle, get_shared_session, reset_shared_session};

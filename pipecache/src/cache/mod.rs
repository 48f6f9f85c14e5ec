pub mod disk;
pub mod instrumented;
pub mod layered;
pub mod memory;
pub mod tier;
pub mod ttl;

pub use disk::DiskTier;
pub use instrumented::{InstrumentReport, InstrumentedTier};
pub use layered::{CacheStats, LayeredCache};
pub use memory::MemoryTier;
pub use tier::{CacheTier, TierStats};
pub use ttl::{DEFAULT_TTL, TtlCache, TtlStats};

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment override selecting the durable tier's storage location
pub const DURABLE_DIR_ENV: &str = "PIPECACHE_DIR";

/// Cache-chain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub memory: MemoryTierConfig,
    pub durable: DurableTierConfig,
    /// Default staleness window for ad hoc lookup caches, in seconds
    pub lookup_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryTierConfig {
    pub max_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DurableTierConfig {
    pub enabled: bool,
    /// Storage directory; `None` selects the env override or the
    /// temp-dir default.
    pub directory: Option<PathBuf>,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory: MemoryTierConfig::default(),
            durable: DurableTierConfig::default(),
            lookup_ttl_secs: 300,
        }
    }
}

impl Default for MemoryTierConfig {
    fn default() -> Self {
        Self { max_entries: 10_000 }
    }
}

impl Default for DurableTierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            max_entries: 100_000,
        }
    }
}

impl CacheConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: CacheConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Resolve the durable tier's directory.
    ///
    /// Precedence: `PIPECACHE_DIR` env var, then the configured
    /// directory, then `<tmp>/pipecache`.
    pub fn durable_directory(&self) -> PathBuf {
        if let Ok(dir) = std::env::var(DURABLE_DIR_ENV) {
            if !dir.is_empty() {
                return PathBuf::from(dir);
            }
        }
        self.durable
            .directory
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("pipecache"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.memory.max_entries, 10_000);
        assert!(config.durable.enabled);
        assert_eq!(config.lookup_ttl_secs, 300);
    }

    #[test]
    fn test_partial_yaml() {
        let config: CacheConfig =
            serde_yaml::from_str("memory:\n  max_entries: 50\n").unwrap();
        assert_eq!(config.memory.max_entries, 50);
        assert_eq!(config.durable.max_entries, 100_000);
    }

    #[test]
    fn test_configured_directory_wins_over_default() {
        let config = CacheConfig {
            durable: DurableTierConfig {
                directory: Some(PathBuf::from("/var/cache/pipecache")),
                ..Default::default()
            },
            ..Default::default()
        };
        // Only meaningful when the env override is unset, which is the
        // normal state for the test run
        if std::env::var(DURABLE_DIR_ENV).is_err() {
            assert_eq!(
                config.durable_directory(),
                PathBuf::from("/var/cache/pipecache")
            );
        }
    }
}

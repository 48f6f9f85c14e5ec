//! Durable disk tier
//!
//! Append-only data file plus a JSON index, persisted across process
//! restarts. Backs the in-memory tier so fast-tier eviction never loses
//! data that was already fetched.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::tier::{CacheTier, TierStats};
use crate::core::types::current_timestamp;
use crate::core::{CacheError, EntityKey, EntitySnapshot, Result};

const DATA_FILE: &str = "snapshots.dat";
const INDEX_FILE: &str = "index.json";

/// Index entry locating one serialized snapshot in the data file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DiskEntry {
    offset: u64,
    size: u64,
    timestamp: u64,
    frequency: u32,
}

/// Durable cache tier backed by local files.
pub struct DiskTier {
    directory: PathBuf,
    max_entries: usize,
    index: RwLock<HashMap<String, DiskEntry>>,
    data_file: Mutex<DataFile>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

struct DataFile {
    file: File,
    offset: u64,
}

impl DiskTier {
    /// Create or reopen a durable tier at the given directory.
    pub fn new(directory: impl Into<PathBuf>, max_entries: usize) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|e| CacheError::Io(e.to_string()))?;

        let data_path = directory.join(DATA_FILE);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&data_path)
            .map_err(|e| CacheError::Io(e.to_string()))?;

        let offset = file
            .metadata()
            .map(|m| m.len())
            .map_err(|e| CacheError::Io(e.to_string()))?;

        let index = Self::load_index(&directory)?;
        debug!(
            "disk tier opened at {} ({} entries)",
            directory.display(),
            index.len()
        );

        Ok(Self {
            directory,
            max_entries: max_entries.max(1),
            index: RwLock::new(index),
            data_file: Mutex::new(DataFile { file, offset }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    fn load_index(directory: &Path) -> Result<HashMap<String, DiskEntry>> {
        let index_path = directory.join(INDEX_FILE);
        if !index_path.exists() {
            return Ok(HashMap::new());
        }

        let contents =
            fs::read_to_string(&index_path).map_err(|e| CacheError::Io(e.to_string()))?;
        serde_json::from_str(&contents)
            .map_err(|e| CacheError::Serialization(format!("failed to parse index: {e}")))
    }

    fn save_index(&self) -> Result<()> {
        let index_path = self.directory.join(INDEX_FILE);
        let json = {
            let index = self.index.read();
            serde_json::to_string(&*index)
                .map_err(|e| CacheError::Serialization(e.to_string()))?
        };
        fs::write(&index_path, json).map_err(|e| CacheError::Io(e.to_string()))
    }

    /// Evict the least frequently used entry from the index.
    ///
    /// Data-file space is reclaimed only on `clear`.
    fn evict_lfu(&self) {
        let evict_key = {
            let index = self.index.read();
            index
                .iter()
                .min_by_key(|(_, entry)| (entry.frequency, entry.timestamp))
                .map(|(key, _)| key.clone())
        };

        if let Some(key) = evict_key {
            self.index.write().remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!("disk tier EVICT {}", key);
        }
    }
}

#[async_trait::async_trait]
impl CacheTier for DiskTier {
    fn name(&self) -> &'static str {
        "disk"
    }

    async fn get(&self, key: &EntityKey) -> Result<Option<EntitySnapshot>> {
        let storage_key = key.storage_key();
        let entry = {
            let index = self.index.read();
            index.get(&storage_key).cloned()
        };

        let Some(entry) = entry else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        let buffer = {
            let mut data = self.data_file.lock();
            data.file
                .seek(SeekFrom::Start(entry.offset))
                .map_err(|e| CacheError::Io(e.to_string()))?;
            let mut buffer = vec![0u8; entry.size as usize];
            data.file
                .read_exact(&mut buffer)
                .map_err(|e| CacheError::Io(e.to_string()))?;
            buffer
        };

        let snapshot: EntitySnapshot = serde_json::from_slice(&buffer)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;

        if let Some(e) = self.index.write().get_mut(&storage_key) {
            e.frequency += 1;
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!("disk tier HIT for {}", key);
        Ok(Some(snapshot))
    }

    async fn put(&self, key: &EntityKey, snapshot: EntitySnapshot) -> Result<()> {
        let payload = serde_json::to_vec(&snapshot)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        let size = payload.len() as u64;
        let storage_key = key.storage_key();

        while self.index.read().len() >= self.max_entries
            && !self.index.read().contains_key(&storage_key)
        {
            self.evict_lfu();
        }

        let offset = {
            let mut data = self.data_file.lock();
            let offset = data.offset;
            data.file
                .seek(SeekFrom::Start(offset))
                .map_err(|e| CacheError::Io(e.to_string()))?;
            data.file
                .write_all(&payload)
                .map_err(|e| CacheError::Io(e.to_string()))?;
            data.file
                .flush()
                .map_err(|e| CacheError::Io(e.to_string()))?;
            data.offset += size;
            offset
        };

        self.index.write().insert(
            storage_key,
            DiskEntry {
                offset,
                size,
                timestamp: current_timestamp(),
                frequency: 1,
            },
        );

        // Persist the index on every write so the tier survives restart
        self.save_index()?;
        debug!("disk tier PUT {} ({} bytes)", key, size);
        Ok(())
    }

    async fn evict(&self, key: &EntityKey) -> Result<()> {
        if self.index.write().remove(&key.storage_key()).is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            self.save_index()?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.index.write().clear();

        let mut data = self.data_file.lock();
        data.file
            .set_len(0)
            .map_err(|e| CacheError::Io(e.to_string()))?;
        data.offset = 0;
        drop(data);

        self.save_index()
    }

    fn stats(&self) -> TierStats {
        TierStats {
            tier: "disk".to_string(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.index.read().len(),
        }
    }
}

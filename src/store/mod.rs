// src/store/mod.rs
//! Key-value persistence that survives process death

pub mod durable;

pub use durable::{DurableRecordingStore, PersistedSession, StoreKey, PENDING_UPLOAD_KEY};

use crate::error::{Result, TrailError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Async string-keyed store
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    /// Remove several keys as one unit. Backends that can do better than a loop override this.
    async fn remove_many(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }
}

/// Process-local store, used for tests and as a fallback
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<()> {
        let mut entries = self.entries.lock();
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}

/// All keys in one JSON file, rewritten atomically (temp file + rename) on every change
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write of the file within this process
    lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> Result<BTreeMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                TrailError::Persistence(format!("Corrupt store file {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(TrailError::Io(e)),
        }
    }

    async fn write_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = serde_json::to_string(map)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn update<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) + Send,
    {
        let _guard = self.lock.lock().await;
        // A corrupt file is replaced rather than blocking every future write
        let mut map = match self.read_map().await {
            Ok(map) => map,
            Err(TrailError::Persistence(msg)) => {
                tracing::warn!(error = %msg, "Discarding unreadable store contents");
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };
        apply(&mut map);
        self.write_map(&map).await
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_map().await?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|map| {
            map.insert(key.to_string(), value.to_string());
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.update(|map| {
            map.remove(key);
        })
        .await
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<()> {
        self.update(|map| {
            for key in keys {
                map.remove(*key);
            }
        })
        .await
    }
}

//! In-memory cache store
//!
//! Clones share the same entries, so a caller can keep a handle to a store
//! after handing it to a `RenderCache`.

use super::{CacheKey, CacheStore};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

#[derive(Debug, Clone)]
struct MemoryEntry {
    contents: Vec<u8>,
    modified: SystemTime,
}

/// Thread-safe map of cache entries
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<CacheKey, MemoryEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry with an explicit modification time
    pub fn write_at(&self, key: &str, contents: &[u8], modified: SystemTime) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                key.to_string(),
                MemoryEntry {
                    contents: contents.to_vec(),
                    modified,
                },
            );
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> Error {
        Error::storage_unavailable(
            "memory",
            io::Error::new(io::ErrorKind::Other, "cache lock poisoned"),
        )
    }
}

impl CacheStore for MemoryStore {
    fn write(&self, key: &str, contents: &[u8]) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.insert(
            key.to_string(),
            MemoryEntry {
                contents: contents.to_vec(),
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn read(&self, key: &str) -> Option<Vec<u8>> {
        let entries = self.entries.read().ok()?;
        entries.get(key).map(|e| e.contents.clone())
    }

    fn last_modified(&self, key: &str) -> Option<SystemTime> {
        let entries = self.entries.read().ok()?;
        entries.get(key).map(|e| e.modified)
    }

    fn list_keys(&self) -> Result<Vec<CacheKey>> {
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        let mut keys: Vec<CacheKey> = entries.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.remove(key);
        Ok(())
    }
}

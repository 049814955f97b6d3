//! Rendered-output cache
//!
//! Rendered templates are stored under a fingerprint of the template name
//! and its bindings, in any [`CacheStore`]:
//! - `FileStore`: one `<key>.cache` file per entry in a directory
//! - `MemoryStore`: process-local map, mostly for tests and embedding
//!
//! Entries are valid while `now - last_modified < ttl`. Stale entries are
//! left in place and overwritten by the next render.

pub mod file;
pub mod fingerprint;
pub mod memory;
pub mod stats;

pub use file::FileStore;
pub use fingerprint::{fingerprint, Fingerprint};
pub use memory::MemoryStore;
pub use stats::CacheStats;

use crate::error::{Error, Result};
use crate::views::Bindings;
use log::{debug, warn};
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

/// Cache key type, the hex fingerprint
pub type CacheKey = String;

/// Default lifetime of a cache entry in seconds
pub const DEFAULT_TTL_SECONDS: u64 = 3600;

/// Key-value storage backing the render cache
pub trait CacheStore: Send + Sync {
    /// Store `contents` under `key`, replacing any previous entry
    fn write(&self, key: &str, contents: &[u8]) -> Result<()>;

    fn read(&self, key: &str) -> Option<Vec<u8>>;

    /// When the entry was last written
    fn last_modified(&self, key: &str) -> Option<SystemTime>;

    fn list_keys(&self) -> Result<Vec<CacheKey>>;

    /// Remove an entry; removing a missing key is not an error
    fn delete(&self, key: &str) -> Result<()>;

    /// Directory backing the store, if any
    fn location(&self) -> Option<&Path> {
        None
    }
}

/// Whether an entry written at `modified` is still live at `now`
///
/// Entries stamped in the future (clock skew) count as brand new.
pub fn is_fresh(modified: SystemTime, ttl: Duration, now: SystemTime) -> bool {
    let age = now.duration_since(modified).unwrap_or_default();
    age < ttl
}

/// Fingerprinted, TTL-bounded cache of rendered output
pub struct RenderCache {
    store: Option<Arc<dyn CacheStore>>,
    enabled: bool,
    ttl: Duration,
    stats: RwLock<CacheStats>,
}

impl RenderCache {
    /// A disabled cache with no storage and the default TTL
    pub fn new() -> Self {
        Self {
            store: None,
            enabled: false,
            ttl: Duration::from_secs(DEFAULT_TTL_SECONDS),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    /// Use a directory as storage, creating it if needed
    pub fn configure_location(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let store = FileStore::open(path.as_ref())?;
        debug!("Render cache stored in {}", path.as_ref().display());
        self.store = Some(Arc::new(store));
        Ok(())
    }

    /// Builder form of [`RenderCache::set_store`]
    pub fn with_store(mut self, store: impl CacheStore + 'static) -> Self {
        self.set_store(store);
        self
    }

    pub fn set_store(&mut self, store: impl CacheStore + 'static) {
        self.store = Some(Arc::new(store));
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    pub fn location(&self) -> Option<&Path> {
        self.store.as_deref().and_then(|s| s.location())
    }

    /// Entry lifetime in seconds
    pub fn set_ttl(&mut self, seconds: u64) {
        self.ttl = Duration::from_secs(seconds);
    }

    pub fn ttl(&self) -> u64 {
        self.ttl.as_secs()
    }

    pub fn fingerprint(&self, name: &str, bindings: &Bindings) -> Fingerprint {
        fingerprint(name, bindings)
    }

    /// Fetch a live entry; anything unusable is a miss
    pub fn get(&self, key: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let store = self.store.as_ref()?;

        let modified = match store.last_modified(key) {
            Some(modified) => modified,
            None => {
                self.record(|s| s.misses += 1);
                return None;
            }
        };

        if !is_fresh(modified, self.ttl, SystemTime::now()) {
            debug!("Cache entry {} is stale", key);
            self.record(|s| {
                s.misses += 1;
                s.stale += 1;
            });
            return None;
        }

        let contents = match store.read(key) {
            Some(contents) => contents,
            None => {
                self.record(|s| s.misses += 1);
                return None;
            }
        };

        match String::from_utf8(contents) {
            Ok(output) => {
                self.record(|s| s.hits += 1);
                Some(output)
            }
            Err(_) => {
                warn!("Cache entry {} is not valid UTF-8, ignoring it", key);
                self.record(|s| s.misses += 1);
                None
            }
        }
    }

    /// Store rendered output; a no-op while disabled
    pub fn put(&self, key: &str, output: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let store = self.store.as_ref().ok_or(Error::CacheMisconfigured)?;

        store.write(key, output.as_bytes())?;
        self.record(|s| s.writes += 1);
        Ok(())
    }

    /// Remove every entry from storage
    pub fn clear(&self) -> Result<()> {
        let store = match self.store.as_ref() {
            Some(store) => store,
            None => return Ok(()),
        };

        let keys = store.list_keys()?;
        for key in &keys {
            store.delete(key)?;
        }
        debug!("Cleared {} cache entries", keys.len());
        Ok(())
    }

    /// Caching enabled without storage is a configuration error
    pub fn validate_setup(&self) -> Result<()> {
        if self.enabled && self.store.is_none() {
            return Err(Error::CacheMisconfigured);
        }
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.read().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn reset_stats(&self) {
        if let Ok(mut stats) = self.stats.write() {
            *stats = CacheStats::default();
        }
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RenderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCache")
            .field("enabled", &self.enabled)
            .field("ttl", &self.ttl)
            .field("location", &self.location())
            .field("has_store", &self.has_store())
            .finish()
    }
}

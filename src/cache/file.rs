use super::{CacheKey, CacheStore};
use crate::error::{Error, Result};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::NamedTempFile;

const ENTRY_SUFFIX: &str = ".cache";

/// Cache entries stored as `<directory>/<key>.cache`
///
/// Writes go to a temporary file in the same directory and are renamed
/// into place, so readers never observe a partially written entry.
#[derive(Debug, Clone)]
pub struct FileStore {
    directory: PathBuf,
}

impl FileStore {
    /// Open a store, creating the directory if it does not exist
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)
            .map_err(|e| Error::storage_unavailable(&directory, e))?;

        if !directory.is_dir() {
            return Err(Error::storage_unavailable(
                &directory,
                io::Error::new(io::ErrorKind::Other, "not a directory"),
            ));
        }

        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.contains("..") {
            return Err(Error::storage_unavailable(
                &self.directory,
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("invalid cache key '{}'", key),
                ),
            ));
        }
        Ok(self.directory.join(format!("{}{}", key, ENTRY_SUFFIX)))
    }
}

impl CacheStore for FileStore {
    fn write(&self, key: &str, contents: &[u8]) -> Result<()> {
        let path = self.entry_path(key)?;

        let mut temp = NamedTempFile::new_in(&self.directory)
            .map_err(|e| Error::storage_unavailable(&self.directory, e))?;
        temp.write_all(contents)
            .map_err(|e| Error::storage_unavailable(temp.path(), e))?;
        temp.persist(&path)
            .map_err(|e| Error::storage_unavailable(&path, e.error))?;
        Ok(())
    }

    fn read(&self, key: &str) -> Option<Vec<u8>> {
        fs::read(self.entry_path(key).ok()?).ok()
    }

    fn last_modified(&self, key: &str) -> Option<SystemTime> {
        fs::metadata(self.entry_path(key).ok()?)
            .and_then(|m| m.modified())
            .ok()
    }

    fn list_keys(&self) -> Result<Vec<CacheKey>> {
        let entries = fs::read_dir(&self.directory)
            .map_err(|e| Error::storage_unavailable(&self.directory, e))?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::storage_unavailable(&self.directory, e))?;
            if !entry.path().is_file() {
                continue;
            }
            if let Some(key) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_suffix(ENTRY_SUFFIX))
            {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.entry_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage_unavailable(&path, e)),
        }
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.directory)
    }
}

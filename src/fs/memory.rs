//! In-memory file source
//!
//! Holds named blobs so an engine session can serve banks that were
//! loaded up front (or generated) without going back to disk.

use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::debug;
use walkdir::WalkDir;

use super::{FileResource, FileSystem};
use crate::error::{BridgeError, Result};

/// Named byte blobs, shared between every resource opened from them
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file
    pub fn insert(&self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Result<()> {
        let data: Arc<[u8]> = Arc::from(data.into());
        self.files
            .write()
            .map_err(|_| BridgeError::LockPoisoned {
                what: "memory file system",
            })?
            .insert(name.into(), data);
        Ok(())
    }

    /// Remove a file; already-open resources keep their data
    pub fn remove(&self, name: &str) -> Result<bool> {
        Ok(self
            .files
            .write()
            .map_err(|_| BridgeError::LockPoisoned {
                what: "memory file system",
            })?
            .remove(name)
            .is_some())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files
            .read()
            .map(|files| files.contains_key(name))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.files.read().map(|files| files.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load every file under `dir`, keyed by its `/`-separated relative path
    ///
    /// Returns the number of files loaded.
    pub fn preload_dir(&self, dir: &Path) -> Result<usize> {
        if !dir.is_dir() {
            return Err(BridgeError::FileNotFound {
                path: dir.display().to_string(),
                source: None,
            });
        }

        let mut loaded = 0;
        for entry in WalkDir::new(dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
        {
            let relative = match entry.path().strip_prefix(dir) {
                Ok(relative) => relative,
                Err(_) => continue,
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            let data = fs::read(entry.path())?;
            debug!(name = %name, bytes = data.len(), "preloaded file");
            self.insert(name, data)?;
            loaded += 1;
        }

        Ok(loaded)
    }
}

impl FileSystem for MemoryFileSystem {
    fn open(&self, identifier: &str) -> Result<FileResource> {
        let data = self
            .files
            .read()
            .map_err(|_| BridgeError::LockPoisoned {
                what: "memory file system",
            })?
            .get(identifier)
            .cloned()
            .ok_or_else(|| BridgeError::FileNotFound {
                path: identifier.to_string(),
                source: None,
            })?;

        let size = data.len() as u64;
        Ok(FileResource::new(identifier, size, Box::new(Cursor::new(data))))
    }
}

//! Handle table
//!
//! Maps opaque integer handles to open [`FileResource`]s. Handles come
//! from a monotonically increasing counter and are never reused, so a
//! stale handle cached by the engine after close can never alias a newer
//! file.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::fs::FileResource;

/// Opaque token identifying one open file
///
/// Zero is never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileHandle(u64);

impl FileHandle {
    /// Value the engine uses for "no handle"
    pub const NULL: FileHandle = FileHandle(0);

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for FileHandle {
    fn from(raw: u64) -> Self {
        FileHandle(raw)
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Resource as shared between the table and any worker reading from it
pub type SharedResource = Arc<Mutex<FileResource>>;

/// Concurrent map from [`FileHandle`] to its open resource
#[derive(Debug)]
pub struct HandleTable {
    next: AtomicU64,
    entries: DashMap<FileHandle, SharedResource>,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            entries: DashMap::new(),
        }
    }

    /// Move `resource` into the table and return its fresh handle
    pub fn create(&self, resource: FileResource) -> FileHandle {
        let handle = FileHandle(self.next.fetch_add(1, Ordering::Relaxed));
        self.entries.insert(handle, Arc::new(Mutex::new(resource)));
        handle
    }

    /// Remove and release the resource behind `handle`
    ///
    /// Returns `false` when the handle is unknown or already disposed.
    /// The OS resource is released here unless an in-flight read still
    /// holds it, in which case it is released as soon as that read ends.
    pub fn dispose(&self, handle: FileHandle) -> bool {
        self.entries.remove(&handle).is_some()
    }

    /// Look up the resource behind `handle` without removing it
    pub fn try_get(&self, handle: FileHandle) -> Option<SharedResource> {
        self.entries.get(&handle).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, handle: FileHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Number of live handles
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of handles ever issued
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed) - 1
    }

    /// Dispose every live handle, returning how many were closed
    pub fn clear(&self) -> usize {
        let handles: Vec<FileHandle> = self.entries.iter().map(|entry| *entry.key()).collect();
        handles.into_iter().filter(|h| self.dispose(*h)).count()
    }
}

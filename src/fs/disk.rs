//! Files on disk, resolved under a root directory

use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use super::{FileResource, FileSystem};
use crate::error::{BridgeError, Result};

/// Opens identifiers as paths relative to `root`
///
/// Identifiers may not be absolute and may not climb out of the root.
#[derive(Debug, Clone)]
pub struct DiskFileSystem {
    root: PathBuf,
}

impl DiskFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an identifier to a path under the root
    pub fn resolve(&self, identifier: &str) -> Result<PathBuf> {
        let mut relative = PathBuf::new();
        let mut depth = 0usize;

        for component in Path::new(identifier).components() {
            match component {
                Component::Normal(part) => {
                    relative.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    if depth == 0 {
                        return Err(bad(identifier, "path escapes the bridge root"));
                    }
                    relative.pop();
                    depth -= 1;
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(bad(identifier, "absolute paths are not accepted"));
                }
            }
        }

        if depth == 0 {
            return Err(bad(identifier, "empty identifier"));
        }

        Ok(self.root.join(relative))
    }
}

impl FileSystem for DiskFileSystem {
    fn open(&self, identifier: &str) -> Result<FileResource> {
        let path = self.resolve(identifier)?;
        debug!(identifier, path = %path.display(), "opening disk file");

        let file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => BridgeError::FileNotFound {
                path: identifier.to_string(),
                source: Some(e),
            },
            _ => BridgeError::BadFile {
                path: identifier.to_string(),
                reason: e.to_string(),
                source: Some(e),
            },
        })?;

        let metadata = file.metadata().map_err(|e| BridgeError::BadFile {
            path: identifier.to_string(),
            reason: format!("cannot stat: {}", e),
            source: Some(e),
        })?;

        if !metadata.is_file() {
            return Err(bad(identifier, "not a regular file"));
        }

        Ok(FileResource::new(identifier, metadata.len(), Box::new(file)))
    }
}

fn bad(identifier: &str, reason: &str) -> BridgeError {
    BridgeError::BadFile {
        path: identifier.to_string(),
        reason: reason.to_string(),
        source: None,
    }
}

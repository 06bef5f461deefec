//! File sources
//!
//! The bridge never touches the file system directly. It asks a
//! [`FileSystem`] to open an identifier and gets back a [`FileResource`]:
//! a named, sized, seekable byte stream.

pub mod disk;
pub mod memory;

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};

use crate::error::Result;

pub use disk::DiskFileSystem;
pub use memory::MemoryFileSystem;

/// Any seekable byte stream a resource can wrap
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Source of openable files
pub trait FileSystem: Send + Sync {
    /// Open `identifier` and return the resource positioned at offset 0
    fn open(&self, identifier: &str) -> Result<FileResource>;
}

/// One open file: the underlying stream plus its cursor
pub struct FileResource {
    name: String,
    size: u64,
    stream: Box<dyn ReadSeek>,
}

impl FileResource {
    pub fn new(name: impl Into<String>, size: u64, stream: Box<dyn ReadSeek>) -> Self {
        Self {
            name: name.into(),
            size,
            stream,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size in bytes reported at open time
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Reposition the cursor to an absolute byte offset
    pub fn seek_to(&mut self, position: u64) -> io::Result<u64> {
        self.stream.seek(SeekFrom::Start(position))
    }

    /// Fill as much of `buf` as the stream allows
    ///
    /// Keeps reading until `buf` is full or the stream reports end of data,
    /// so a short count always means the resource ended.
    pub fn read_into(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl fmt::Debug for FileResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileResource")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

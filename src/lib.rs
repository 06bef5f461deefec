//! Nueva FS Bridge - Asynchronous File I/O for the Audio Engine
//!
//! The native audio engine owns its own streaming and mixing threads and
//! delegates every file operation to host code through six callbacks:
//! open, close, read, seek, async-read and async-cancel.
//!
//! # Architecture
//!
//! - [`fs`]: file sources (disk under a root, or named in-memory blobs)
//! - [`bridge::HandleTable`]: opaque integer handles to open resources
//! - [`bridge::AsyncRegistry`]: in-flight async reads, run on a worker pool
//!   with cooperative cancellation and exactly one completion per request
//! - [`FileBridge`]: implements [`FileCallbacks`] and never lets a fault
//!   cross the engine boundary

pub mod bridge;
pub mod cli;
pub mod config;
pub mod error;
pub mod fs;

pub use bridge::{
    AsyncBeginResult, AsyncReadCompletion, AsyncRequest, BridgeStats, FileBridge, FileCallbacks,
    FileHandle, FileStatus, OpenResult, ReadResult, RequestToken,
};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};

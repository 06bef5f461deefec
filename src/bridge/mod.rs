//! File I/O Bridge Module
//!
//! The boundary between the native engine's file system plugin and
//! host-side file sources:
//! - Handle table for open files
//! - Registry of in-flight asynchronous reads
//! - The six engine-facing callbacks and the bridge that implements them

pub mod callbacks;
pub mod file_bridge;
pub mod handle;
pub mod registry;
pub mod status;

pub use callbacks::{AsyncBeginResult, FileCallbacks, OpenResult, ReadResult};
pub use file_bridge::{BridgeStats, FileBridge};
pub use handle::{FileHandle, HandleTable, SharedResource};
pub use registry::{AsyncReadCompletion, AsyncRegistry, AsyncRequest, CompletionFn, RequestToken};
pub use status::FileStatus;

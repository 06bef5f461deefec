//! Engine-facing callback contract
//!
//! The native engine drives file I/O through exactly these six entry
//! points. Every one of them returns a [`FileStatus`] and none of them
//! may unwind: a panic inside a callback is caught and reported as
//! [`FileStatus::Internal`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;
use tracing::error;

use super::handle::FileHandle;
use super::registry::{AsyncRequest, RequestToken};
use super::status::FileStatus;

/// Result of the open callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OpenResult {
    pub status: FileStatus,
    /// File size in bytes; 0 unless `status` is `Ok`
    pub size: u64,
    /// The new handle; [`FileHandle::NULL`] unless `status` is `Ok`
    pub handle: FileHandle,
}

impl OpenResult {
    pub fn failed(status: FileStatus) -> Self {
        Self {
            status,
            size: 0,
            handle: FileHandle::NULL,
        }
    }
}

/// Result of the synchronous read callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadResult {
    pub status: FileStatus,
    pub bytes_read: usize,
}

impl ReadResult {
    pub fn failed(status: FileStatus) -> Self {
        Self {
            status,
            bytes_read: 0,
        }
    }
}

/// Result of the async-read callback
///
/// `token` is present only when the read was accepted; it is the key for
/// a later [`FileCallbacks::async_read_cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AsyncBeginResult {
    pub status: FileStatus,
    pub token: Option<RequestToken>,
}

/// The six file callbacks the engine is registered with
pub trait FileCallbacks: Send + Sync {
    /// Open a file by identifier and report its size
    ///
    /// Statuses: `Ok`, `NotFound`, `Bad`, `Internal`.
    fn open(&self, identifier: &str) -> OpenResult;

    /// Release a handle
    ///
    /// Statuses: `Ok`, `InvalidHandle`.
    fn close(&self, handle: FileHandle) -> FileStatus;

    /// Read up to `buffer.len()` bytes at the current cursor
    ///
    /// Statuses: `Ok`, `InvalidHandle`, `EndOfData`, `Eof`, `Internal`.
    fn read(&self, handle: FileHandle, buffer: &mut [u8]) -> ReadResult;

    /// Move the cursor to an absolute byte offset
    ///
    /// Statuses: `Ok`, `InvalidHandle`, `Internal`.
    fn seek(&self, handle: FileHandle, position: u64) -> FileStatus;

    /// Accept an asynchronous read; the request's completion fires later
    ///
    /// Statuses: `Ok` (accepted), `Internal` (not scheduled; the completion
    /// will never fire).
    fn async_read_begin(&self, request: AsyncRequest) -> AsyncBeginResult;

    /// Request cancellation of an accepted asynchronous read
    ///
    /// `Ok` when a pending read was signalled (its completion will carry
    /// `DiskEjected` unless it already passed its last checkpoint);
    /// `DiskEjected` when nothing is pending under `token`.
    fn async_read_cancel(&self, token: RequestToken) -> FileStatus;
}

/// Run a callback body, converting any panic into `fallback`
pub(crate) fn guarded<T>(callback: &'static str, fallback: T, body: impl FnOnce() -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(value) => value,
        Err(payload) => {
            error!(
                callback,
                panic = panic_message(payload.as_ref()),
                "bridge callback panicked"
            );
            fallback
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

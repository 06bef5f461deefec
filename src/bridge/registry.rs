//! Async operation registry
//!
//! Tracks every in-flight asynchronous read issued by the engine. Each
//! request gets an opaque [`RequestToken`] that the engine later uses to
//! cancel it. The read itself runs on the bridge's blocking worker pool.
//!
//! Exactly one completion is delivered per request. The worker owns a
//! [`CompletionGuard`] which delivers the completion and then removes the
//! record. If the work is dropped before it runs (runtime shutdown,
//! aborted while queued), the guard still fires with `DiskEjected`.
//! Cancel only raises a flag; it never completes or removes anything.

use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::handle::{FileHandle, HandleTable};
use super::status::FileStatus;
use crate::error::{BridgeError, Result};

/// Opaque correlation key for one asynchronous read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for RequestToken {
    fn from(raw: u64) -> Self {
        RequestToken(raw)
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Callback invoked once with the terminal result of an async read
pub type CompletionFn = Box<dyn FnOnce(AsyncReadCompletion) + Send + 'static>;

/// One asynchronous read issued by the engine
pub struct AsyncRequest {
    pub handle: FileHandle,
    pub offset: u64,
    pub length: usize,
    buffer: Vec<u8>,
    on_complete: CompletionFn,
}

impl AsyncRequest {
    pub fn new<F>(handle: FileHandle, offset: u64, length: usize, on_complete: F) -> Self
    where
        F: FnOnce(AsyncReadCompletion) + Send + 'static,
    {
        Self {
            handle,
            offset,
            length,
            buffer: Vec::new(),
            on_complete: Box::new(on_complete),
        }
    }

    /// Read into a caller-supplied buffer instead of a fresh allocation
    ///
    /// The buffer is resized to the bytes the read can produce, at most
    /// `length`, and handed back in the completion.
    pub fn with_buffer(mut self, buffer: Vec<u8>) -> Self {
        self.buffer = buffer;
        self
    }
}

impl fmt::Debug for AsyncRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncRequest")
            .field("handle", &self.handle)
            .field("offset", &self.offset)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// Terminal result of an async read
#[derive(Debug)]
pub struct AsyncReadCompletion {
    pub token: RequestToken,
    pub handle: FileHandle,
    pub status: FileStatus,
    pub bytes_read: usize,
    /// The request's buffer, returned to the caller
    pub buffer: Vec<u8>,
}

impl AsyncReadCompletion {
    /// The bytes actually read
    pub fn data(&self) -> &[u8] {
        &self.buffer[..self.bytes_read.min(self.buffer.len())]
    }
}

struct AsyncOperationRecord {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct RegistryState {
    records: HashMap<RequestToken, AsyncOperationRecord>,
    closed: bool,
}

#[derive(Default)]
struct RegistryShared {
    state: Mutex<RegistryState>,
    idle: Condvar,
}

impl RegistryShared {
    fn lock(&self) -> Result<MutexGuard<'_, RegistryState>> {
        self.state
            .lock()
            .map_err(|_| BridgeError::LockPoisoned { what: "async registry" })
    }

    /// The single point where a record leaves the registry
    fn remove(&self, token: RequestToken) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.records.remove(&token).is_none() {
            warn!(%token, "async record already removed");
        }
        drop(state);
        self.idle.notify_all();
    }
}

/// Delivers the single completion for one request, then removes its record
struct CompletionGuard {
    token: RequestToken,
    handle: FileHandle,
    on_complete: Option<CompletionFn>,
    buffer: Vec<u8>,
    shared: Arc<RegistryShared>,
}

impl CompletionGuard {
    fn complete(mut self, status: FileStatus, bytes_read: usize) {
        self.deliver(status, bytes_read);
    }

    fn deliver(&mut self, status: FileStatus, bytes_read: usize) {
        let Some(on_complete) = self.on_complete.take() else {
            return;
        };

        debug!(token = %self.token, handle = %self.handle, %status, bytes_read, "async read complete");
        let completion = AsyncReadCompletion {
            token: self.token,
            handle: self.handle,
            status,
            bytes_read,
            buffer: mem::take(&mut self.buffer),
        };

        if panic::catch_unwind(AssertUnwindSafe(move || on_complete(completion))).is_err() {
            error!(token = %self.token, "async completion callback panicked");
        }

        self.shared.remove(self.token);
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if self.on_complete.is_some() {
            warn!(token = %self.token, "async read dropped before running");
            self.deliver(FileStatus::DiskEjected, 0);
        }
    }
}

/// Registry of in-flight asynchronous reads
pub struct AsyncRegistry {
    shared: Arc<RegistryShared>,
    handles: Arc<HandleTable>,
    runtime: Handle,
    next_token: AtomicU64,
    max_in_flight: usize,
}

impl AsyncRegistry {
    pub fn new(handles: Arc<HandleTable>, runtime: Handle, max_in_flight: usize) -> Self {
        Self {
            shared: Arc::new(RegistryShared::default()),
            handles,
            runtime,
            next_token: AtomicU64::new(1),
            max_in_flight,
        }
    }

    /// Register `request` and schedule its read on the worker pool
    ///
    /// On error the request is dropped and its completion is never called.
    pub fn create_operation(&self, request: AsyncRequest) -> Result<RequestToken> {
        let cancel = CancellationToken::new();

        let token = {
            let mut state = self.shared.lock()?;
            if state.closed {
                return Err(BridgeError::SchedulerClosed);
            }
            if state.records.len() >= self.max_in_flight {
                return Err(BridgeError::TooManyInFlight {
                    limit: self.max_in_flight,
                });
            }
            let token = RequestToken(self.next_token.fetch_add(1, Ordering::Relaxed));
            state.records.insert(
                token,
                AsyncOperationRecord {
                    cancel: cancel.clone(),
                    task: None,
                },
            );
            token
        };

        let AsyncRequest {
            handle,
            offset,
            length,
            buffer,
            on_complete,
        } = request;
        debug!(%token, %handle, offset, length, "scheduling async read");

        let guard = CompletionGuard {
            token,
            handle,
            on_complete: Some(on_complete),
            buffer,
            shared: Arc::clone(&self.shared),
        };
        let handles = Arc::clone(&self.handles);

        let task = self
            .runtime
            .spawn_blocking(move || run_read(guard, &handles, &cancel, offset, length));

        // The record may already be gone if the read finished first.
        let mut state = self.shared.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = state.records.get_mut(&token) {
            record.task = Some(task);
        }

        Ok(token)
    }

    /// Request cancellation of `token`
    ///
    /// Returns whether a pending operation was found. The read observes the
    /// signal at its next checkpoint; a read already past its last
    /// checkpoint completes normally.
    pub fn cancel(&self, token: RequestToken) -> Result<bool> {
        let state = self.shared.lock()?;
        match state.records.get(&token) {
            Some(record) => {
                record.cancel.cancel();
                debug!(%token, "async read cancellation requested");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn is_pending(&self, token: RequestToken) -> bool {
        self.shared
            .lock()
            .map(|state| state.records.contains_key(&token))
            .unwrap_or(false)
    }

    /// Number of reads registered and not yet completed
    pub fn in_flight(&self) -> usize {
        self.shared
            .lock()
            .map(|state| state.records.len())
            .unwrap_or(0)
    }

    /// Total number of tokens ever issued
    pub fn issued(&self) -> u64 {
        self.next_token.load(Ordering::Relaxed) - 1
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().map(|state| state.closed).unwrap_or(true)
    }

    /// Block until no reads are in flight or `timeout` elapses
    ///
    /// Returns true if the registry drained.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let state = self.shared.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (state, _) = self
            .shared
            .idle
            .wait_timeout_while(state, timeout, |state| !state.records.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        state.records.is_empty()
    }

    /// Stop accepting new reads and cancel every pending one
    ///
    /// Returns the number of reads that were pending.
    pub fn close(&self) -> usize {
        let (pending, tasks): (usize, Vec<JoinHandle<()>>) = {
            let mut state = self.shared.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.closed = true;
            let pending = state.records.len();
            let tasks = state
                .records
                .values_mut()
                .filter_map(|record| {
                    record.cancel.cancel();
                    record.task.take()
                })
                .collect();
            (pending, tasks)
        };

        // Reads still queued are dropped unrun; their guards report DiskEjected.
        for task in tasks {
            task.abort();
        }
        pending
    }
}

impl fmt::Debug for AsyncRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncRegistry")
            .field("in_flight", &self.in_flight())
            .field("issued", &self.issued())
            .field("max_in_flight", &self.max_in_flight)
            .finish()
    }
}

/// Worker-side read body
fn run_read(
    mut guard: CompletionGuard,
    handles: &HandleTable,
    cancel: &CancellationToken,
    offset: u64,
    length: usize,
) {
    let handle = guard.handle;
    let buffer = &mut guard.buffer;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        read_at(handles, handle, cancel, offset, length, buffer)
    }));

    let (status, bytes_read) = match outcome {
        Ok(Ok(n)) => (FileStatus::for_read(length, n), n),
        Ok(Err(BridgeError::Cancelled)) => (FileStatus::DiskEjected, 0),
        Ok(Err(e)) => {
            warn!(token = %guard.token, %handle, error = %e, "async read failed");
            (e.status(), 0)
        }
        Err(_) => {
            error!(token = %guard.token, %handle, "async read panicked");
            (FileStatus::Internal, 0)
        }
    };

    guard.complete(status, bytes_read);
}

fn read_at(
    handles: &HandleTable,
    handle: FileHandle,
    cancel: &CancellationToken,
    offset: u64,
    length: usize,
    buffer: &mut Vec<u8>,
) -> Result<usize> {
    if cancel.is_cancelled() {
        return Err(BridgeError::Cancelled);
    }

    let resource = handles
        .try_get(handle)
        .ok_or(BridgeError::InvalidHandle { handle })?;
    let mut resource = resource
        .lock()
        .map_err(|_| BridgeError::LockPoisoned { what: "file resource" })?;

    resource.seek_to(offset)?;

    if cancel.is_cancelled() {
        return Err(BridgeError::Cancelled);
    }

    // Never allocate past the end of the resource, whatever length was asked.
    let remaining = resource.size().saturating_sub(offset);
    let capacity = usize::try_from(remaining).map_or(length, |r| r.min(length));
    buffer.resize(capacity, 0);
    Ok(resource.read_into(&mut buffer[..capacity])?)
}

//! The bridge instance an engine session registers its file callbacks with
//!
//! A [`FileBridge`] owns the handle table, the async registry and the
//! worker runtime that runs async reads. It is created when the engine
//! session starts and shut down (explicitly or on drop) when it ends.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info, warn};

use super::callbacks::{guarded, AsyncBeginResult, FileCallbacks, OpenResult, ReadResult};
use super::handle::{FileHandle, HandleTable};
use super::registry::{AsyncRegistry, AsyncRequest, RequestToken};
use super::status::FileStatus;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::fs::{DiskFileSystem, FileSystem};

/// Grace period for worker threads once the registry has drained
const RUNTIME_STOP_GRACE: Duration = Duration::from_millis(100);

/// Snapshot of bridge activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    pub open_handles: usize,
    pub in_flight: usize,
    pub handles_issued: u64,
    pub requests_issued: u64,
    pub shut_down: bool,
}

/// Host side of the engine's file system plugin
pub struct FileBridge {
    config: BridgeConfig,
    fs: Arc<dyn FileSystem>,
    handles: Arc<HandleTable>,
    registry: AsyncRegistry,
    runtime: Mutex<Option<Runtime>>,
    shut_down: AtomicBool,
}

impl FileBridge {
    /// Create a bridge serving files from `fs`
    pub fn new(config: BridgeConfig, fs: Arc<dyn FileSystem>) -> Result<Self> {
        config.validate()?;

        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.worker_threads)
            .thread_name("nueva-fsbridge-io")
            .enable_all()
            .build()
            .map_err(|e| BridgeError::Runtime {
                reason: format!("cannot start worker pool: {}", e),
            })?;

        let handles = Arc::new(HandleTable::new());
        let registry = AsyncRegistry::new(
            Arc::clone(&handles),
            runtime.handle().clone(),
            config.max_in_flight,
        );

        info!(
            root = %config.root.display(),
            workers = config.worker_threads,
            max_in_flight = config.max_in_flight,
            "file bridge started"
        );

        Ok(Self {
            config,
            fs,
            handles,
            registry,
            runtime: Mutex::new(Some(runtime)),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Create a bridge serving files from `config.root` on disk
    pub fn with_disk(config: BridgeConfig) -> Result<Self> {
        let disk = DiskFileSystem::new(config.root.clone());
        Self::new(config, Arc::new(disk))
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    pub fn registry(&self) -> &AsyncRegistry {
        &self.registry
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            open_handles: self.handles.len(),
            in_flight: self.registry.in_flight(),
            handles_issued: self.handles.issued(),
            requests_issued: self.registry.issued(),
            shut_down: self.is_shut_down(),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Block until every accepted async read has completed
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.registry.wait_idle(timeout)
    }

    /// Tear the bridge down
    ///
    /// Cancels every pending async read, waits up to the configured timeout
    /// for them to complete, stops the worker pool and closes all handles.
    /// Every accepted read still receives exactly one completion. Calling
    /// this more than once is a no-op.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let cancelled = self.registry.close();
        // On a worker thread (e.g. from inside a completion) we cannot wait
        // for the pool we are running on.
        let on_worker = tokio::runtime::Handle::try_current().is_ok();

        let drained = on_worker || self.registry.wait_idle(self.config.shutdown_timeout());
        if !drained {
            warn!(
                in_flight = self.registry.in_flight(),
                "async reads still running at shutdown"
            );
        }

        let runtime = self
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(runtime) = runtime {
            if on_worker {
                runtime.shutdown_background();
            } else {
                runtime.shutdown_timeout(RUNTIME_STOP_GRACE);
            }
        }

        let closed = self.handles.clear();
        info!(cancelled, closed, "file bridge shut down");
    }

    fn open_file(&self, identifier: &str) -> Result<(FileHandle, u64)> {
        if self.is_shut_down() {
            return Err(BridgeError::SchedulerClosed);
        }
        let resource = self.fs.open(identifier)?;
        let size = resource.size();
        let handle = self.handles.create(resource);
        Ok((handle, size))
    }

    fn read_file(&self, handle: FileHandle, buffer: &mut [u8]) -> Result<usize> {
        let resource = self
            .handles
            .try_get(handle)
            .ok_or(BridgeError::InvalidHandle { handle })?;
        let mut resource = resource
            .lock()
            .map_err(|_| BridgeError::LockPoisoned { what: "file resource" })?;
        Ok(resource.read_into(buffer)?)
    }

    fn seek_file(&self, handle: FileHandle, position: u64) -> Result<()> {
        let resource = self
            .handles
            .try_get(handle)
            .ok_or(BridgeError::InvalidHandle { handle })?;
        let mut resource = resource
            .lock()
            .map_err(|_| BridgeError::LockPoisoned { what: "file resource" })?;
        resource.seek_to(position)?;
        Ok(())
    }
}

impl FileCallbacks for FileBridge {
    fn open(&self, identifier: &str) -> OpenResult {
        guarded("open", OpenResult::failed(FileStatus::Internal), || {
            match self.open_file(identifier) {
                Ok((handle, size)) => {
                    debug!(identifier, %handle, size, "opened");
                    OpenResult {
                        status: FileStatus::Ok,
                        size,
                        handle,
                    }
                }
                Err(e) => {
                    log_failure("open", &e);
                    OpenResult::failed(e.status())
                }
            }
        })
    }

    fn close(&self, handle: FileHandle) -> FileStatus {
        guarded("close", FileStatus::Internal, || {
            if self.handles.dispose(handle) {
                debug!(%handle, "closed");
                FileStatus::Ok
            } else {
                debug!(%handle, "close of unknown handle");
                FileStatus::InvalidHandle
            }
        })
    }

    fn read(&self, handle: FileHandle, buffer: &mut [u8]) -> ReadResult {
        guarded("read", ReadResult::failed(FileStatus::Internal), || {
            match self.read_file(handle, buffer) {
                Ok(bytes_read) => ReadResult {
                    status: FileStatus::for_read(buffer.len(), bytes_read),
                    bytes_read,
                },
                Err(e) => {
                    log_failure("read", &e);
                    ReadResult::failed(e.status())
                }
            }
        })
    }

    fn seek(&self, handle: FileHandle, position: u64) -> FileStatus {
        guarded("seek", FileStatus::Internal, || {
            match self.seek_file(handle, position) {
                Ok(()) => FileStatus::Ok,
                Err(e) => {
                    log_failure("seek", &e);
                    e.status()
                }
            }
        })
    }

    fn async_read_begin(&self, request: AsyncRequest) -> AsyncBeginResult {
        let rejected = AsyncBeginResult {
            status: FileStatus::Internal,
            token: None,
        };
        guarded("async_read_begin", rejected, || {
            match self.registry.create_operation(request) {
                Ok(token) => AsyncBeginResult {
                    status: FileStatus::Ok,
                    token: Some(token),
                },
                Err(e) => {
                    warn!(error = %e, code = e.error_code(), "async read rejected");
                    rejected
                }
            }
        })
    }

    fn async_read_cancel(&self, token: RequestToken) -> FileStatus {
        guarded("async_read_cancel", FileStatus::Internal, || {
            match self.registry.cancel(token) {
                Ok(true) => FileStatus::Ok,
                Ok(false) => {
                    debug!(%token, "nothing pending to cancel");
                    FileStatus::DiskEjected
                }
                Err(e) => {
                    log_failure("async_read_cancel", &e);
                    FileStatus::Internal
                }
            }
        })
    }
}

impl Drop for FileBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for FileBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileBridge")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn log_failure(callback: &'static str, error: &BridgeError) {
    if error.is_recoverable() {
        debug!(callback, error = %error, code = error.error_code(), "callback failed");
    } else {
        warn!(callback, error = %error, code = error.error_code(), "callback failed");
    }
}

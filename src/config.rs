//! Bridge configuration
//!
//! Settings come from defaults, then an optional JSON file, then
//! `NUEVA_FS_*` environment overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Default number of blocking worker threads for async reads
const DEFAULT_WORKER_THREADS: usize = 2;

/// Default cap on concurrently in-flight async reads
const DEFAULT_MAX_IN_FLIGHT: usize = 64;

/// Default time shutdown waits for outstanding reads
const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 2000;

/// Configuration for a [`FileBridge`](crate::FileBridge)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Directory identifiers are resolved against
    pub root: PathBuf,
    /// Threads in the worker pool that runs async reads
    pub worker_threads: usize,
    /// Maximum async reads registered at once; further requests are rejected
    pub max_in_flight: usize,
    /// How long shutdown waits for outstanding reads to drain
    pub shutdown_timeout_ms: u64,
    /// `tracing` filter directive used by the CLI
    pub log_filter: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            worker_threads: DEFAULT_WORKER_THREADS,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            log_filter: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load a JSON configuration file; missing keys take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| BridgeError::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: BridgeConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `NUEVA_FS_*` environment overrides
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (environment in production)
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup("NUEVA_FS_ROOT") {
            self.root = PathBuf::from(root);
        }
        if let Some(value) = lookup("NUEVA_FS_WORKERS") {
            self.worker_threads = parse_number("NUEVA_FS_WORKERS", &value)?;
        }
        if let Some(value) = lookup("NUEVA_FS_MAX_IN_FLIGHT") {
            self.max_in_flight = parse_number("NUEVA_FS_MAX_IN_FLIGHT", &value)?;
        }
        if let Some(value) = lookup("NUEVA_FS_SHUTDOWN_TIMEOUT_MS") {
            self.shutdown_timeout_ms = parse_number("NUEVA_FS_SHUTDOWN_TIMEOUT_MS", &value)?;
        }
        if let Some(filter) = lookup("NUEVA_FS_LOG") {
            self.log_filter = filter;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject settings the bridge cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(BridgeError::Config {
                reason: "worker_threads must be at least 1".to_string(),
            });
        }
        if self.max_in_flight == 0 {
            return Err(BridgeError::Config {
                reason: "max_in_flight must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| BridgeError::Config {
        reason: format!("{} must be a non-negative integer, got '{}'", key, value),
    })
}

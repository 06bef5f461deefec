//! CLI Command Implementations
//!
//! Each command opens files through [`FileCallbacks`] exactly as the engine
//! would and turns non-`Ok` statuses into errors.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use log::{info, warn};
use sha2::{Digest, Sha256};

use crate::bridge::{
    AsyncReadCompletion, AsyncRequest, BridgeStats, FileBridge, FileCallbacks, FileHandle,
    FileStatus,
};

/// How long a command waits for any single async completion
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(30);

/// Totals reported by [`stream`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    pub size: u64,
    pub bytes_read: u64,
    pub reads: usize,
}

/// Copy a file to `out` using synchronous read callbacks.
pub fn cat(bridge: &FileBridge, identifier: &str, chunk: usize, out: &mut dyn Write) -> Result<u64> {
    let handle = open(bridge, identifier)?.0;
    let result = copy_sync(bridge, handle, chunk.max(1), out);
    close(bridge, handle);
    result
}

fn copy_sync(bridge: &FileBridge, handle: FileHandle, chunk: usize, out: &mut dyn Write) -> Result<u64> {
    let mut buffer = vec![0u8; chunk];
    let mut total = 0u64;

    loop {
        let result = bridge.read(handle, &mut buffer);
        match result.status {
            FileStatus::Ok | FileStatus::Eof => {
                out.write_all(&buffer[..result.bytes_read])?;
                total += result.bytes_read as u64;
                if result.status == FileStatus::Eof {
                    break;
                }
            }
            FileStatus::EndOfData => break,
            status => bail!("read failed: {}", status),
        }
    }

    out.flush()?;
    Ok(total)
}

/// Read a whole file with one async read at a time.
pub fn stream(bridge: &FileBridge, identifier: &str, chunk: usize) -> Result<StreamSummary> {
    let (handle, size) = open(bridge, identifier)?;
    let result = stream_handle(bridge, handle, size, chunk.max(1));
    close(bridge, handle);
    result
}

fn stream_handle(bridge: &FileBridge, handle: FileHandle, size: u64, chunk: usize) -> Result<StreamSummary> {
    let (tx, rx) = mpsc::channel();
    let mut summary = StreamSummary {
        size,
        bytes_read: 0,
        reads: 0,
    };
    let mut buffer = Vec::with_capacity(chunk);

    loop {
        let tx = tx.clone();
        let request = AsyncRequest::new(handle, summary.bytes_read, chunk, move |c| {
            let _ = tx.send(c);
        })
        .with_buffer(buffer);
        submit(bridge, request)?;

        let completion = wait(&rx)?;
        summary.reads += 1;
        summary.bytes_read += completion.bytes_read as u64;
        info!(
            "read #{} at {}: {} bytes ({})",
            summary.reads,
            completion.token,
            completion.bytes_read,
            completion.status
        );

        match completion.status {
            FileStatus::Ok => buffer = completion.buffer,
            FileStatus::Eof | FileStatus::EndOfData => break,
            status => bail!("async read failed: {}", status),
        }
    }

    Ok(summary)
}

/// SHA-256 of a file, read with up to `depth` async reads in flight.
///
/// Completions may arrive out of order; chunks are hashed in file order.
pub fn checksum(bridge: &FileBridge, identifier: &str, chunk: usize, depth: usize) -> Result<String> {
    let (handle, size) = open(bridge, identifier)?;
    let result = checksum_handle(bridge, handle, size, chunk.max(1) as u64, depth.max(1));
    close(bridge, handle);
    result
}

fn checksum_handle(bridge: &FileBridge, handle: FileHandle, size: u64, chunk: u64, depth: usize) -> Result<String> {
    let chunks = size.div_ceil(chunk);
    let (tx, rx) = mpsc::channel();
    let mut hasher = Sha256::new();
    let mut ready: BTreeMap<u64, AsyncReadCompletion> = BTreeMap::new();
    let mut offsets: BTreeMap<u64, u64> = BTreeMap::new();
    let mut next_submit = 0u64;
    let mut next_hash = 0u64;

    while next_hash < chunks {
        while next_submit < chunks && offsets.len() < depth {
            let offset = next_submit * chunk;
            let length = chunk.min(size - offset) as usize;
            let tx = tx.clone();
            let token = submit(
                bridge,
                AsyncRequest::new(handle, offset, length, move |c| {
                    let _ = tx.send(c);
                }),
            )?;
            offsets.insert(token.raw(), next_submit);
            next_submit += 1;
        }

        let completion = wait(&rx)?;
        let index = offsets
            .remove(&completion.token.raw())
            .ok_or_else(|| anyhow!("completion for unknown request {}", completion.token))?;
        if completion.status != FileStatus::Ok {
            bail!("chunk {} failed: {}", index, completion.status);
        }
        ready.insert(index, completion);

        while let Some(completion) = ready.remove(&next_hash) {
            hasher.update(completion.data());
            next_hash += 1;
        }
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Open every identifier and report bridge statistics.
///
/// Files that fail to open are skipped with a warning.
pub fn stats(bridge: &FileBridge, identifiers: &[String]) -> BridgeStats {
    for identifier in identifiers {
        let result = bridge.open(identifier);
        if result.status.is_ok() {
            info!("{}: {} bytes as {}", identifier, result.size, result.handle);
        } else {
            warn!("{}: {}", identifier, result.status);
        }
    }
    bridge.stats()
}

fn open(bridge: &FileBridge, identifier: &str) -> Result<(FileHandle, u64)> {
    let result = bridge.open(identifier);
    if !result.status.is_ok() {
        bail!("cannot open '{}': {}", identifier, result.status);
    }
    info!("opened {} ({} bytes) as {}", identifier, result.size, result.handle);
    Ok((result.handle, result.size))
}

fn close(bridge: &FileBridge, handle: FileHandle) {
    let status = bridge.close(handle);
    if !status.is_ok() {
        warn!("close {} returned {}", handle, status);
    }
}

fn submit(bridge: &FileBridge, request: AsyncRequest) -> Result<crate::bridge::RequestToken> {
    let begin = bridge.async_read_begin(request);
    match (begin.status, begin.token) {
        (FileStatus::Ok, Some(token)) => Ok(token),
        (status, _) => bail!("async read not accepted: {}", status),
    }
}

fn wait(rx: &mpsc::Receiver<AsyncReadCompletion>) -> Result<AsyncReadCompletion> {
    rx.recv_timeout(COMPLETION_TIMEOUT)
        .context("timed out waiting for async read completion")
}

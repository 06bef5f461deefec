//! Async Read Tests
//!
//! Asynchronous read scheduling, cancellation and completion guarantees.

use std::collections::HashMap;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use nueva_fsbridge::fs::{FileResource, FileSystem, MemoryFileSystem};
use nueva_fsbridge::{
    AsyncReadCompletion, AsyncRequest, BridgeConfig, BridgeError, FileBridge, FileCallbacks,
    FileHandle, FileStatus, RequestToken,
};

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(100);

/// Reader that can hold a worker inside its first seek or its first read
struct GatedReader {
    inner: Cursor<Vec<u8>>,
    read_gate: Option<Receiver<()>>,
    seek_gate: Option<SeekGate>,
}

/// Announces entry into `seek` and then waits for release
struct SeekGate {
    entered: Sender<()>,
    release: Receiver<()>,
}

impl Read for GatedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(gate) = self.read_gate.take() {
            let _ = gate.recv();
        }
        self.inner.read(buf)
    }
}

impl Seek for GatedReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if let Some(gate) = self.seek_gate.take() {
            let _ = gate.entered.send(());
            let _ = gate.release.recv();
        }
        self.inner.seek(pos)
    }
}

/// Serves "gate" and "seek-gate" as gated files and everything else from memory
struct GatedFs {
    memory: MemoryFileSystem,
    read_gate: Mutex<Option<Receiver<()>>>,
    seek_gate: Mutex<Option<SeekGate>>,
}

impl FileSystem for GatedFs {
    fn open(&self, identifier: &str) -> nueva_fsbridge::Result<FileResource> {
        let (read_gate, seek_gate) = match identifier {
            "gate" => (self.read_gate.lock().unwrap().take(), None),
            "seek-gate" => (None, self.seek_gate.lock().unwrap().take()),
            _ => return self.memory.open(identifier),
        };
        let reader = GatedReader {
            inner: Cursor::new(vec![0xAA; 16]),
            read_gate,
            seek_gate,
        };
        Ok(FileResource::new(identifier, 16, Box::new(reader)))
    }
}

fn gated_fs(read_gate: Option<Receiver<()>>, seek_gate: Option<SeekGate>) -> GatedFs {
    let memory = MemoryFileSystem::new();
    memory.insert("data", (0u8..64).collect::<Vec<_>>()).unwrap();
    GatedFs {
        memory,
        read_gate: Mutex::new(read_gate),
        seek_gate: Mutex::new(seek_gate),
    }
}

/// Bridge with a single worker thread plus a gated file that can hold it
fn gated_bridge(max_in_flight: usize) -> (FileBridge, Sender<()>) {
    let (open_gate, gate) = mpsc::channel();
    let config = BridgeConfig {
        worker_threads: 1,
        max_in_flight,
        ..BridgeConfig::default()
    };
    let fs = gated_fs(Some(gate), None);
    (FileBridge::new(config, Arc::new(fs)).unwrap(), open_gate)
}

/// Bridge whose "seek-gate" file holds its first seek until released
///
/// Returns the bridge, a receiver signalled once a worker is inside the
/// seek, and the sender that releases it.
fn seek_gated_bridge() -> (FileBridge, Receiver<()>, Sender<()>) {
    let (entered_tx, entered) = mpsc::channel();
    let (release, release_rx) = mpsc::channel();
    let gate = SeekGate {
        entered: entered_tx,
        release: release_rx,
    };
    let fs = gated_fs(None, Some(gate));
    let bridge = FileBridge::new(BridgeConfig::default(), Arc::new(fs)).unwrap();
    (bridge, entered, release)
}

fn memory_bridge(files: &[(&str, Vec<u8>)]) -> FileBridge {
    let memory = MemoryFileSystem::new();
    for (name, data) in files {
        memory.insert(*name, data.clone()).unwrap();
    }
    FileBridge::new(BridgeConfig::default(), Arc::new(memory)).unwrap()
}

fn request(
    handle: FileHandle,
    offset: u64,
    length: usize,
    tx: &Sender<AsyncReadCompletion>,
) -> AsyncRequest {
    let tx = tx.clone();
    AsyncRequest::new(handle, offset, length, move |c| {
        let _ = tx.send(c);
    })
}

fn begin(bridge: &FileBridge, request: AsyncRequest) -> RequestToken {
    let result = bridge.async_read_begin(request);
    assert_eq!(result.status, FileStatus::Ok);
    result.token.expect("accepted read has a token")
}

/// Occupy the single worker with a read blocked on the gate
fn occupy_worker(bridge: &FileBridge, tx: &Sender<AsyncReadCompletion>) -> RequestToken {
    let gate = bridge.open("gate");
    assert_eq!(gate.status, FileStatus::Ok);
    begin(bridge, request(gate.handle, 0, 16, tx))
}

// === Completion ===

#[test]
fn test_async_read_delivers_data() {
    let bridge = memory_bridge(&[("a", (0u8..32).collect())]);
    let handle = bridge.open("a").handle;
    let (tx, rx) = mpsc::channel();

    let token = begin(&bridge, request(handle, 8, 4, &tx));
    let completion = rx.recv_timeout(WAIT).unwrap();

    assert_eq!(completion.token, token);
    assert_eq!(completion.handle, handle);
    assert_eq!(completion.status, FileStatus::Ok);
    assert_eq!(completion.data(), &[8, 9, 10, 11]);
}

#[test]
fn test_async_read_short_and_past_end() {
    let bridge = memory_bridge(&[("a", vec![1u8; 10])]);
    let handle = bridge.open("a").handle;
    let (tx, rx) = mpsc::channel();

    begin(&bridge, request(handle, 6, 8, &tx));
    let short = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(short.status, FileStatus::Eof);
    assert_eq!(short.bytes_read, 4);

    begin(&bridge, request(handle, 10, 8, &tx));
    let past_end = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(past_end.status, FileStatus::EndOfData);
    assert_eq!(past_end.bytes_read, 0);
}

#[test]
fn test_async_read_huge_length_on_tiny_file() {
    let bridge = memory_bridge(&[("tiny", vec![5u8; 4])]);
    let handle = bridge.open("tiny").handle;
    let (tx, rx) = mpsc::channel();

    begin(&bridge, request(handle, 0, 1usize << 46, &tx));
    let completion = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(completion.status, FileStatus::Eof);
    assert_eq!(completion.bytes_read, 4);
    assert_eq!(completion.data(), &[5, 5, 5, 5]);

    assert!(bridge.wait_idle(WAIT));
    assert_eq!(bridge.stats().open_handles, 1);
}

#[test]
fn test_async_read_on_closed_handle() {
    let bridge = memory_bridge(&[("a", vec![1u8; 10])]);
    let handle = bridge.open("a").handle;
    bridge.close(handle);
    let (tx, rx) = mpsc::channel();

    begin(&bridge, request(handle, 0, 4, &tx));
    let completion = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(completion.status, FileStatus::InvalidHandle);
    assert_eq!(completion.bytes_read, 0);
}

#[test]
fn test_concurrent_reads_on_distinct_handles_complete_once_each() {
    const N: usize = 32;
    let files: Vec<(String, Vec<u8>)> = (0..N)
        .map(|i| (format!("file-{}", i), vec![i as u8; 256]))
        .collect();
    let refs: Vec<(&str, Vec<u8>)> = files.iter().map(|(n, d)| (n.as_str(), d.clone())).collect();
    let bridge = Arc::new(memory_bridge(&refs));
    let (tx, rx) = mpsc::channel();

    let issuers: Vec<_> = (0..N)
        .map(|i| {
            let bridge = Arc::clone(&bridge);
            let tx = tx.clone();
            thread::spawn(move || {
                let handle = bridge.open(&format!("file-{}", i)).handle;
                (begin(&bridge, request(handle, 0, 256, &tx)), i as u8)
            })
        })
        .collect();
    let expected: HashMap<RequestToken, u8> =
        issuers.into_iter().map(|t| t.join().unwrap()).collect();

    let mut seen: HashMap<RequestToken, usize> = HashMap::new();
    for _ in 0..N {
        let completion = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(completion.status, FileStatus::Ok);
        let fill = expected[&completion.token];
        assert!(completion.data().iter().all(|b| *b == fill));
        *seen.entry(completion.token).or_default() += 1;
    }

    assert!(bridge.wait_idle(WAIT));
    assert!(rx.recv_timeout(QUIET).is_err());
    assert_eq!(seen.len(), N);
    assert!(seen.values().all(|count| *count == 1));
}

// === Cancellation ===

#[test]
fn test_cancel_before_first_checkpoint_ejects_once() {
    let (bridge, open_gate) = gated_bridge(8);
    let (tx, rx) = mpsc::channel();
    let blocker = occupy_worker(&bridge, &tx);

    let handle = bridge.open("data").handle;
    let token = begin(&bridge, request(handle, 0, 16, &tx));
    assert_eq!(bridge.async_read_cancel(token), FileStatus::Ok);

    open_gate.send(()).unwrap();

    let mut completions: HashMap<RequestToken, AsyncReadCompletion> = HashMap::new();
    for _ in 0..2 {
        let completion = rx.recv_timeout(WAIT).unwrap();
        assert!(completions.insert(completion.token, completion).is_none());
    }

    assert_eq!(completions[&blocker].status, FileStatus::Ok);
    assert_eq!(completions[&token].status, FileStatus::DiskEjected);
    assert_eq!(completions[&token].bytes_read, 0);

    assert!(bridge.wait_idle(WAIT));
    assert!(!bridge.registry().is_pending(token));
    assert!(rx.recv_timeout(QUIET).is_err());
}

#[test]
fn test_cancel_after_seek_ejects_once() {
    let (bridge, entered, release) = seek_gated_bridge();
    let handle = bridge.open("seek-gate").handle;
    let (tx, rx) = mpsc::channel();

    let token = begin(&bridge, request(handle, 4, 8, &tx));

    // The worker is past the pre-seek check and parked inside the seek.
    entered.recv_timeout(WAIT).unwrap();
    assert_eq!(bridge.async_read_cancel(token), FileStatus::Ok);
    release.send(()).unwrap();

    let completion = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(completion.token, token);
    assert_eq!(completion.status, FileStatus::DiskEjected);
    assert_eq!(completion.bytes_read, 0);
    assert!(completion.data().is_empty());

    assert!(bridge.wait_idle(WAIT));
    assert!(!bridge.registry().is_pending(token));
    assert!(rx.recv_timeout(QUIET).is_err());
}

#[test]
fn test_cancel_after_completion_finds_nothing() {
    let bridge = memory_bridge(&[("a", vec![3u8; 8])]);
    let handle = bridge.open("a").handle;
    let (tx, rx) = mpsc::channel();

    let token = begin(&bridge, request(handle, 0, 8, &tx));
    assert_eq!(rx.recv_timeout(WAIT).unwrap().status, FileStatus::Ok);
    assert!(bridge.wait_idle(WAIT));

    assert_eq!(bridge.async_read_cancel(token), FileStatus::DiskEjected);
    assert!(rx.recv_timeout(QUIET).is_err());
}

#[test]
fn test_cancel_unknown_token() {
    let bridge = memory_bridge(&[]);
    assert_eq!(
        bridge.async_read_cancel(RequestToken::from(999)),
        FileStatus::DiskEjected
    );
}

#[test]
fn test_cancel_while_reading_completes_normally() {
    let (bridge, open_gate) = gated_bridge(8);
    let (tx, rx) = mpsc::channel();
    let blocker = occupy_worker(&bridge, &tx);

    // Let the worker reach the blocked read, past both checkpoints.
    thread::sleep(QUIET);
    assert_eq!(bridge.async_read_cancel(blocker), FileStatus::Ok);
    open_gate.send(()).unwrap();

    let completion = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(completion.token, blocker);
    assert_eq!(completion.status, FileStatus::Ok);
    assert_eq!(completion.bytes_read, 16);
    assert!(rx.recv_timeout(QUIET).is_err());
}

// === Scheduling ===

#[test]
fn test_in_flight_limit_rejects_without_completion() {
    let (bridge, open_gate) = gated_bridge(1);
    let (tx, rx) = mpsc::channel();
    let blocker = occupy_worker(&bridge, &tx);

    let handle = bridge.open("data").handle;
    let rejected = bridge.async_read_begin(request(handle, 0, 4, &tx));
    assert_eq!(rejected.status, FileStatus::Internal);
    assert!(rejected.token.is_none());
    assert_eq!(bridge.stats().requests_issued, 1);

    open_gate.send(()).unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap().token, blocker);
    assert!(rx.recv_timeout(QUIET).is_err());
}

#[test]
fn test_shutdown_completes_pending_reads_exactly_once() {
    let (bridge, open_gate) = gated_bridge(16);
    let (tx, rx) = mpsc::channel();
    let blocker = occupy_worker(&bridge, &tx);

    let handle = bridge.open("data").handle;
    let queued: Vec<RequestToken> = (0..5)
        .map(|i| begin(&bridge, request(handle, i * 8, 8, &tx)))
        .collect();

    // The blocker must be inside its read before shutdown cancels everything.
    thread::sleep(QUIET);
    let opener = thread::spawn(move || {
        thread::sleep(QUIET);
        open_gate.send(()).unwrap();
    });
    bridge.shutdown();
    opener.join().unwrap();

    let mut statuses: HashMap<RequestToken, FileStatus> = HashMap::new();
    for _ in 0..6 {
        let completion = rx.recv_timeout(WAIT).unwrap();
        assert!(statuses.insert(completion.token, completion.status).is_none());
    }
    assert!(rx.recv_timeout(QUIET).is_err());

    assert_eq!(statuses[&blocker], FileStatus::Ok);
    for token in queued {
        assert_eq!(statuses[&token], FileStatus::DiskEjected);
    }
    assert_eq!(bridge.stats().in_flight, 0);

    let after = bridge.async_read_begin(request(handle, 0, 8, &tx));
    assert_eq!(after.status, FileStatus::Internal);
}

#[test]
fn test_registry_rejects_when_closed() {
    let bridge = memory_bridge(&[("a", vec![0u8; 4])]);
    let handle = bridge.open("a").handle;
    bridge.registry().close();

    let (tx, _rx) = mpsc::channel();
    let err = bridge
        .registry()
        .create_operation(request(handle, 0, 4, &tx))
        .unwrap_err();
    assert!(matches!(err, BridgeError::SchedulerClosed));
}

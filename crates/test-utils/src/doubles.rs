//! Test doubles for the execution engine seams.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use qexec::exec::forward::{Diagnostics, LineSink, StreamKind};
use qexec::exec::spawner::{OsSpawner, ProcessSpawner, SpawnRequest};
use tokio::process::Child;

/// Captures every forwarded line; each `write_line` call is kept separately
/// so tests can check that lines were never split.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All writes so far, lossily decoded.
    pub fn lines(&self) -> Vec<String> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LineSink for MemorySink {
    fn write_line(&self, line: &[u8]) -> io::Result<()> {
        self.writes.lock().unwrap().push(line.to_vec());
        Ok(())
    }
}

/// Records what would have been spawned.
///
/// With `failing()`, every spawn fails with `NotFound`; with `delegating()`,
/// the real [`OsSpawner`] is used after recording.
#[derive(Debug, Clone)]
pub struct SpySpawner {
    calls: Arc<AtomicUsize>,
    argvs: Arc<Mutex<Vec<Vec<String>>>>,
    delegate: bool,
}

impl SpySpawner {
    pub fn failing() -> Self {
        Self {
            calls: Arc::default(),
            argvs: Arc::default(),
            delegate: false,
        }
    }

    pub fn delegating() -> Self {
        Self {
            delegate: true,
            ..Self::failing()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn argvs(&self) -> Vec<Vec<String>> {
        self.argvs.lock().unwrap().clone()
    }
}

impl ProcessSpawner for SpySpawner {
    fn spawn(&self, request: &SpawnRequest<'_>) -> io::Result<Child> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.argvs
            .lock()
            .unwrap()
            .push(request.command.argv().to_vec());

        if self.delegate {
            OsSpawner.spawn(request)
        } else {
            Err(io::Error::new(io::ErrorKind::NotFound, "spy spawner refuses to start processes"))
        }
    }
}

/// Keeps every reported stream anomaly.
#[derive(Debug, Default, Clone)]
pub struct RecordingDiagnostics {
    seen: Arc<Mutex<Vec<(String, StreamKind, io::ErrorKind)>>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self) -> Vec<(String, StreamKind, io::ErrorKind)> {
        self.seen.lock().unwrap().clone()
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn stream_error(&self, prefix: &str, stream: StreamKind, error: &io::Error) {
        self.seen
            .lock()
            .unwrap()
            .push((prefix.to_string(), stream, error.kind()));
    }
}

// src/exec/forward.rs

//! Line-by-line forwarding of child output streams.
//!
//! Every complete line read from a child stream is written to a [`LineSink`]
//! as `"<prefix> <line>\n"` in a single `write_line` call. Concurrent
//! forwarders (two per job, any number of jobs) can share one sink because a
//! line is never split across calls.

use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

/// Which child stream a forwarder is reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}

/// Destination for forwarded lines.
///
/// Implementations must write `line` (prefix, body and trailing newline) as
/// one unit; they are shared by all running jobs.
pub trait LineSink: Send + Sync {
    fn write_line(&self, line: &[u8]) -> io::Result<()>;
}

/// Write to a process-wide stream that may block, e.g. stdout piped into a
/// slow reader.
///
/// On a multi-threaded runtime the worker hands its other tasks off first.
/// `block_in_place` is not available on a current-thread runtime, which
/// writes directly.
fn write_blocking<W: Write>(mut stream: W, line: &[u8]) -> io::Result<()> {
    let mut write = || {
        stream.write_all(line)?;
        stream.flush()
    };
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(write)
        }
        _ => write(),
    }
}

/// The dispatcher's own standard output.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl LineSink for StdoutSink {
    fn write_line(&self, line: &[u8]) -> io::Result<()> {
        write_blocking(io::stdout().lock(), line)
    }
}

/// The dispatcher's own standard error.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrSink;

impl LineSink for StderrSink {
    fn write_line(&self, line: &[u8]) -> io::Result<()> {
        write_blocking(io::stderr().lock(), line)
    }
}

/// Receiver for non-fatal stream anomalies.
///
/// Nothing reported here changes a job's outcome.
pub trait Diagnostics: Send + Sync {
    fn stream_error(&self, prefix: &str, stream: StreamKind, error: &io::Error);
}

/// Default diagnostics: a `warn!` event per anomaly.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn stream_error(&self, prefix: &str, stream: StreamKind, error: &io::Error) {
        warn!(prefix, %stream, error = %error, "error while forwarding job output");
    }
}

/// A read failure caused by the child having gone away is just end-of-stream.
fn is_closed_pipe(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof
    )
}

/// After the child has exited, a read that stays idle this long ends the drain.
pub const DRAIN_IDLE: Duration = Duration::from_millis(100);

/// Upper bound on draining after the child has exited.
pub const DRAIN_LIMIT: Duration = Duration::from_secs(2);

/// Copy `reader` to `sink` until end-of-stream, prefixing every line.
///
/// A trailing fragment without a newline is forwarded as a final line.
/// `\r\n` endings are normalized to `\n`. Returns the number of lines
/// forwarded.
///
/// Once `exited` is cancelled the stream is only drained of what is already
/// buffered: a background process that inherited the pipe can keep it open
/// long after the job itself is gone.
pub async fn forward_lines<R>(
    prefix: &str,
    stream: StreamKind,
    reader: R,
    sink: &dyn LineSink,
    diagnostics: &dyn Diagnostics,
    exited: &CancellationToken,
) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut forwarder = LineForwarder::new(prefix, stream, sink, diagnostics);
    let mut reader = BufReader::new(reader);
    // `read_until` appends partial reads to `chunk`, so an interrupted read
    // resumes where it stopped.
    let mut chunk = Vec::new();
    let mut drain_limit: Option<Instant> = None;

    loop {
        let read = match drain_limit {
            None => tokio::select! {
                res = reader.read_until(b'\n', &mut chunk) => res,
                _ = exited.cancelled() => {
                    drain_limit = Some(Instant::now() + DRAIN_LIMIT);
                    continue;
                }
            },
            Some(limit) => {
                let deadline = (Instant::now() + DRAIN_IDLE).min(limit);
                match timeout_at(deadline, reader.read_until(b'\n', &mut chunk)).await {
                    Ok(res) => res,
                    Err(_) => {
                        trace!(prefix, %stream, "stream still open after job exit");
                        break;
                    }
                }
            }
        };

        match read {
            Ok(0) => break,
            Ok(_) => {
                forwarder.emit(&chunk);
                chunk.clear();
            }
            Err(e) => {
                if !is_closed_pipe(&e) {
                    diagnostics.stream_error(prefix, stream, &e);
                }
                break;
            }
        }
    }

    if !chunk.is_empty() {
        forwarder.emit(&chunk);
    }

    trace!(prefix, %stream, lines = forwarder.forwarded, "stream forwarder finished");
    forwarder.forwarded
}

struct LineForwarder<'a> {
    prefix: &'a str,
    stream: StreamKind,
    sink: &'a dyn LineSink,
    diagnostics: &'a dyn Diagnostics,
    out: Vec<u8>,
    head: usize,
    forwarded: usize,
    sink_failed: bool,
}

impl<'a> LineForwarder<'a> {
    fn new(
        prefix: &'a str,
        stream: StreamKind,
        sink: &'a dyn LineSink,
        diagnostics: &'a dyn Diagnostics,
    ) -> Self {
        let mut out = Vec::with_capacity(prefix.len() + 128);
        out.extend_from_slice(prefix.as_bytes());
        out.push(b' ');
        let head = out.len();
        Self {
            prefix,
            stream,
            sink,
            diagnostics,
            out,
            head,
            forwarded: 0,
            sink_failed: false,
        }
    }

    fn emit(&mut self, chunk: &[u8]) {
        let body = chunk.strip_suffix(b"\n").unwrap_or(chunk);
        let body = body.strip_suffix(b"\r").unwrap_or(body);

        self.out.truncate(self.head);
        self.out.extend_from_slice(body);
        self.out.push(b'\n');

        // Keep draining after a sink failure so the child never blocks on a
        // full pipe; report it once.
        if let Err(e) = self.sink.write_line(&self.out) {
            if !self.sink_failed {
                self.diagnostics.stream_error(self.prefix, self.stream, &e);
                self.sink_failed = true;
            }
        }
        self.forwarded += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncWriteExt, ReadBuf};

    fn never() -> CancellationToken {
        CancellationToken::new()
    }

    #[derive(Default)]
    struct VecSink {
        writes: Mutex<Vec<Vec<u8>>>,
    }

    impl LineSink for VecSink {
        fn write_line(&self, line: &[u8]) -> io::Result<()> {
            self.writes.lock().unwrap().push(line.to_vec());
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingDiagnostics {
        seen: Mutex<Vec<io::ErrorKind>>,
    }

    impl Diagnostics for CountingDiagnostics {
        fn stream_error(&self, _prefix: &str, _stream: StreamKind, error: &io::Error) {
            self.seen.lock().unwrap().push(error.kind());
        }
    }

    /// Yields `data`, then fails with `kind`.
    struct FailingReader {
        data: Option<Vec<u8>>,
        kind: io::ErrorKind,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            match self.data.take() {
                Some(data) => {
                    buf.put_slice(&data);
                    Poll::Ready(Ok(()))
                }
                None => Poll::Ready(Err(io::Error::new(self.kind, "boom"))),
            }
        }
    }

    #[tokio::test]
    async fn each_line_is_one_prefixed_write() {
        let sink = VecSink::default();
        let diag = CountingDiagnostics::default();

        let n = forward_lines(
            "[jobs]",
            StreamKind::Stdout,
            &b"one\ntwo\r\nthree"[..],
            &sink,
            &diag,
            &never(),
        )
        .await;

        assert_eq!(n, 3);
        let writes = sink.writes.lock().unwrap();
        assert_eq!(
            *writes,
            vec![
                b"[jobs] one\n".to_vec(),
                b"[jobs] two\n".to_vec(),
                b"[jobs] three\n".to_vec(),
            ]
        );
        assert!(diag.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_lines_are_preserved() {
        let sink = VecSink::default();
        let n = forward_lines(
            "p",
            StreamKind::Stderr,
            &b"\n\nx\n"[..],
            &sink,
            &TracingDiagnostics,
            &never(),
        )
        .await;

        assert_eq!(n, 3);
        assert_eq!(sink.writes.lock().unwrap()[0], b"p \n".to_vec());
    }

    #[tokio::test]
    async fn closed_pipe_is_not_reported() {
        let sink = VecSink::default();
        let diag = CountingDiagnostics::default();
        let reader = FailingReader {
            data: Some(b"last words\n".to_vec()),
            kind: io::ErrorKind::BrokenPipe,
        };

        let n = forward_lines("p", StreamKind::Stdout, reader, &sink, &diag, &never()).await;

        assert_eq!(n, 1);
        assert!(diag.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn other_read_errors_are_reported_once() {
        let sink = VecSink::default();
        let diag = CountingDiagnostics::default();
        let reader = FailingReader {
            data: None,
            kind: io::ErrorKind::InvalidData,
        };

        let n = forward_lines("p", StreamKind::Stdout, reader, &sink, &diag, &never()).await;

        assert_eq!(n, 0);
        assert_eq!(*diag.seen.lock().unwrap(), vec![io::ErrorKind::InvalidData]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn process_sinks_write_from_worker_threads() {
        StdoutSink.write_line(b"[sink] stdout from a worker\n").unwrap();
        StderrSink.write_line(b"[sink] stderr from a worker\n").unwrap();
    }

    #[tokio::test]
    async fn process_sinks_write_on_current_thread_runtime() {
        StdoutSink.write_line(b"[sink] stdout from current thread\n").unwrap();
    }

    #[tokio::test]
    async fn open_stream_is_drained_once_the_job_exits() {
        // The write end stays open, as when a background process inherits it.
        let (mut writer, reader) = tokio::io::duplex(64);
        writer.write_all(b"done\nparti").await.unwrap();

        let exited = CancellationToken::new();
        let sink = VecSink::default();
        let forward = forward_lines(
            "p",
            StreamKind::Stdout,
            reader,
            &sink,
            &TracingDiagnostics,
            &exited,
        );
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            exited.cancel();
        };

        let (n, ()) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(forward, cancel)
        })
        .await
        .expect("forwarder should stop after the job exits");

        assert_eq!(n, 2);
        assert_eq!(
            *sink.writes.lock().unwrap(),
            vec![b"p done\n".to_vec(), b"p parti\n".to_vec()]
        );
        drop(writer);
    }
}

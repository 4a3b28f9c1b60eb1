//! Continuous draining of the child's output streams.
//!
//! Each stream is read by its own task into a shared, size-capped buffer.
//! The caller keeps a handle on that buffer, so whatever was read survives
//! a read error or an abandoned reader.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const READ_CHUNK_SIZE: usize = 8192;

/// Default per-stream capture limit.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Upper bound on waiting for a pipe to close once the child is gone.
///
/// Grandchildren that inherited the pipes can keep them open after the
/// direct child exits or is killed.
pub(crate) const IO_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Which output stream a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

#[derive(Debug)]
struct Tail {
    bytes: VecDeque<u8>,
    limit: usize,
    dropped: usize,
}

/// The most recent `limit` bytes of one stream; older bytes are dropped first.
#[derive(Debug, Clone)]
pub(crate) struct OutputBuffer {
    inner: Arc<Mutex<Tail>>,
}

impl OutputBuffer {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Tail {
                bytes: VecDeque::new(),
                limit,
                dropped: 0,
            })),
        }
    }

    pub(crate) fn push(&self, chunk: &[u8]) {
        let mut tail = self.inner.lock();
        tail.bytes.extend(chunk);
        let excess = tail.bytes.len().saturating_sub(tail.limit);
        if excess > 0 {
            tail.bytes.drain(..excess);
            tail.dropped += excess;
        }
    }

    /// Bytes discarded from the front so far.
    pub(crate) fn dropped(&self) -> usize {
        self.inner.lock().dropped
    }

    /// Lossy UTF-8 view of the kept bytes.
    ///
    /// After truncation, a partial character at the cut is skipped.
    pub(crate) fn text(&self) -> String {
        let tail = self.inner.lock();
        let (front, back) = tail.bytes.as_slices();
        let mut bytes = Vec::with_capacity(tail.bytes.len());
        bytes.extend_from_slice(front);
        bytes.extend_from_slice(back);
        let start = if tail.dropped > 0 {
            bytes.iter().take_while(|&&b| b & 0b1100_0000 == 0b1000_0000).count()
        } else {
            0
        };
        String::from_utf8_lossy(&bytes[start..]).into_owned()
    }
}

/// Reads `reader` to EOF into `buffer`, logging each chunk as it arrives.
pub(crate) async fn read_stream<R>(
    mut reader: R,
    kind: StreamKind,
    buffer: OutputBuffer,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        debug!(stream = %kind, bytes = n, "{}", String::from_utf8_lossy(&chunk[..n]).trim_end());
        buffer.push(&chunk[..n]);
    }
}

/// A running reader task and the buffer it fills.
#[derive(Debug)]
pub(crate) struct StreamReader {
    kind: StreamKind,
    buffer: OutputBuffer,
    handle: JoinHandle<std::io::Result<()>>,
}

/// Spawns a reader task for one stream, keeping at most `limit` bytes.
pub(crate) fn spawn_reader<R>(reader: R, kind: StreamKind, limit: usize) -> StreamReader
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer = OutputBuffer::new(limit);
    let handle = tokio::spawn(read_stream(reader, kind, buffer.clone()));
    StreamReader {
        kind,
        buffer,
        handle,
    }
}

impl StreamReader {
    /// Waits for the reader to finish and returns what it captured.
    ///
    /// A reader still blocked after [`IO_DRAIN_TIMEOUT`] is aborted. Bytes
    /// read before an abort or a read error are kept.
    pub(crate) async fn collect(mut self) -> String {
        let kind = self.kind;
        match tokio::time::timeout(IO_DRAIN_TIMEOUT, &mut self.handle).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(err))) => {
                warn!(stream = %kind, error = %err, "failed to read child output");
            }
            Ok(Err(join_err)) => {
                warn!(stream = %kind, error = %join_err, "output reader task failed");
            }
            Err(_elapsed) => {
                warn!(stream = %kind, "output pipe still open after child exit; abandoning it");
                self.handle.abort();
            }
        }
        let dropped = self.buffer.dropped();
        if dropped > 0 {
            warn!(stream = %kind, dropped_bytes = dropped, "child output exceeded the capture limit; kept the tail");
        }
        self.buffer.text()
    }
}

//! Progress streaming back to the caller.
//!
//! Output is best effort: once a write fails (the client went away) the
//! channel is closed and later writes are dropped. The deployment itself
//! keeps going.

use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

/// Destination for progress bytes. Each `send` is delivered as one chunk.
#[async_trait]
pub trait ProgressSink: Send {
    async fn send(&mut self, chunk: Bytes) -> io::Result<()>;
}

/// Feeds an mpsc channel, typically drained into an HTTP response body.
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }

    /// A sink and the receiver it feeds.
    pub fn pair(buffer: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl ProgressSink for ChannelSink {
    async fn send(&mut self, chunk: Bytes) -> io::Result<()> {
        self.tx
            .send(chunk)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "receiver dropped"))
    }
}

/// Writes and flushes every chunk to an `AsyncWrite`.
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl<W> ProgressSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, chunk: Bytes) -> io::Result<()> {
        self.writer.write_all(&chunk).await?;
        self.writer.flush().await
    }
}

/// Collects output in memory; optionally starts failing after a byte budget.
#[derive(Clone, Default)]
pub struct MemorySink {
    buf: Arc<Mutex<Vec<u8>>>,
    fail_after: Option<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept up to `bytes` bytes, then fail like a disconnected client.
    pub fn failing_after(bytes: usize) -> Self {
        Self {
            buf: Arc::default(),
            fail_after: Some(bytes),
        }
    }

    pub fn contents(&self) -> String {
        let buf = self.buf.lock().unwrap_or_else(|p| p.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }
}

#[async_trait]
impl ProgressSink for MemorySink {
    async fn send(&mut self, chunk: Bytes) -> io::Result<()> {
        let mut buf = self.buf.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(limit) = self.fail_after {
            if buf.len() + chunk.len() > limit {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"));
            }
        }
        buf.extend_from_slice(&chunk);
        Ok(())
    }
}

/// Best-effort progress writer wrapped around a sink.
pub struct ProgressChannel {
    sink: Box<dyn ProgressSink>,
    closed: bool,
    bytes_written: u64,
}

impl ProgressChannel {
    pub fn new(sink: impl ProgressSink + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            closed: false,
            bytes_written: 0,
        }
    }

    /// Deliver one chunk. Returns false if the channel is (now) closed.
    pub async fn write(&mut self, chunk: Bytes) -> bool {
        if self.closed {
            return false;
        }
        let len = chunk.len() as u64;
        match self.sink.send(chunk).await {
            Ok(()) => {
                self.bytes_written += len;
                true
            }
            Err(e) => {
                debug!(error = %e, written = self.bytes_written, "progress channel closed");
                self.closed = true;
                false
            }
        }
    }

    /// Deliver `text` followed by a newline.
    pub async fn line(&mut self, text: impl AsRef<str>) -> bool {
        self.write(Bytes::from(format!("{}\n", text.as_ref()))).await
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

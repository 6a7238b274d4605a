//! Single-flight shared reader over one byte stream.
//!
//! A [`SharedSource`] owns the underlying stream and a [`LineBuffer`] cache.
//! Any number of [`StageCursor`]s read it at their own pace: cached bytes are
//! served straight from the buffer, and only a cursor at the frontier takes
//! the fetch lock and performs a real read.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;

use super::LineBuffer;

/// Size of a single read from an underlying stream.
pub const PAGE_SIZE: usize = 4096;

/// Boxed byte stream accepted by [`SharedSource::new`].
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// A byte stream readable concurrently by many cursors.
pub struct SharedSource {
    buffer: LineBuffer,
    /// Guards reads from the underlying stream (single-flight fetch).
    reader: Mutex<ByteStream>,
}

impl std::fmt::Debug for SharedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSource")
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

impl SharedSource {
    /// Wraps `reader`. The source takes exclusive ownership of it.
    pub fn new<R>(reader: R) -> Arc<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Arc::new(Self {
            buffer: LineBuffer::new(),
            reader: Mutex::new(Box::new(reader)),
        })
    }

    /// A source whose whole content is `text`.
    pub fn from_text(text: impl Into<String>) -> Arc<Self> {
        Self::new(io::Cursor::new(text.into().into_bytes()))
    }

    /// A source that is immediately at end-of-stream.
    pub fn empty() -> Arc<Self> {
        Self::new(tokio::io::empty())
    }

    /// Returns a new cursor positioned at the start of the stream.
    pub fn cursor(self: &Arc<Self>) -> StageCursor {
        StageCursor {
            source: Arc::clone(self),
            offset: 0,
        }
    }

    /// The cache holding every byte read from the stream so far.
    pub fn buffer(&self) -> &LineBuffer {
        &self.buffer
    }
}

/// An independent read position into a [`SharedSource`].
#[derive(Debug)]
pub struct StageCursor {
    source: Arc<SharedSource>,
    offset: usize,
}

impl StageCursor {
    /// Reads the next bytes into `dst`.
    ///
    /// Returns `Ok(0)` at end of stream. End-of-stream and errors come from
    /// the underlying stream and are not cached: every cursor that reaches the
    /// frontier observes them on its own.
    ///
    /// # Errors
    /// Returns the underlying stream's read error.
    pub async fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        if dst.is_empty() {
            return Ok(0);
        }
        if let Some(n) = self.read_cached(dst) {
            return Ok(n);
        }

        let source = Arc::clone(&self.source);
        let mut reader = source.reader.lock().await;
        // Another cursor may have fetched while we waited for the lock.
        if let Some(n) = self.read_cached(dst) {
            return Ok(n);
        }

        let n = reader.read(dst).await?;
        if n > 0 {
            source.buffer.append(&dst[..n]);
            self.offset += n;
        }
        Ok(n)
    }

    fn read_cached(&mut self, dst: &mut [u8]) -> Option<usize> {
        if self.offset >= self.source.buffer.len() {
            return None;
        }
        let n = self.source.buffer.read_at(dst, self.offset);
        self.offset += n;
        Some(n)
    }

    /// Next unread byte position.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn source(&self) -> &Arc<SharedSource> {
        &self.source
    }
}

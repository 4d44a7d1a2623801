//! Append-only sinks for operation inline data.

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use crate::error::{DeltaError, DeltaResult};
use crate::operation::{AnnotatedOperation, DataLocator};

/// Thread-safe append-only byte sink.
///
/// Concurrent callers are serialized; each append returns the offset its
/// bytes start at.
pub trait BlobSink: Send + Sync {
    /// Appends `data` and returns its offset.
    fn append(&self, data: &[u8]) -> io::Result<u64>;

    /// Bytes appended so far.
    fn len(&self) -> u64;

    /// Returns `true` when nothing has been appended.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Blob kept in memory.
#[derive(Debug, Default)]
pub struct MemoryBlobSink {
    data: Mutex<Vec<u8>>,
}

impl MemoryBlobSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current contents.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Consumes the sink and returns its contents.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.data.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BlobSink for MemoryBlobSink {
    fn append(&self, data: &[u8]) -> io::Result<u64> {
        let mut blob = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        let offset = blob.len() as u64;
        blob.extend_from_slice(data);
        Ok(offset)
    }

    fn len(&self) -> u64 {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).len() as u64
    }
}

struct FileBlob {
    writer: Box<dyn Write + Send>,
    written: u64,
    failed: bool,
}

impl FileBlob {
    fn check(&self) -> io::Result<()> {
        if self.failed {
            return Err(io::Error::other("blob sink is unusable after a failed write"));
        }
        Ok(())
    }
}

/// Blob streamed to a file.
///
/// A failed append leaves an unknown number of bytes behind, so every later
/// append or flush fails as well.
pub struct FileBlobSink {
    inner: Mutex<FileBlob>,
}

impl FileBlobSink {
    /// Creates (or truncates) the blob file at `path`.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::from_writer(BufWriter::new(file)))
    }

    /// Streams the blob into `writer`.
    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Mutex::new(FileBlob {
                writer: Box::new(writer),
                written: 0,
                failed: false,
            }),
        }
    }

    /// Flushes buffered bytes to the file.
    pub fn flush(&self) -> io::Result<()> {
        let mut blob = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        blob.check()?;
        let result = blob.writer.flush();
        blob.failed = result.is_err();
        result
    }
}

impl fmt::Debug for FileBlobSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let blob = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("FileBlobSink")
            .field("written", &blob.written)
            .field("failed", &blob.failed)
            .finish_non_exhaustive()
    }
}

impl BlobSink for FileBlobSink {
    fn append(&self, data: &[u8]) -> io::Result<u64> {
        let mut blob = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        blob.check()?;
        let offset = blob.written;
        if let Err(error) = blob.writer.write_all(data) {
            blob.failed = true;
            return Err(error);
        }
        blob.written += data.len() as u64;
        Ok(offset)
    }

    fn len(&self) -> u64 {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).written
    }
}

/// Writes the pending payload of `op`, if any, and records its location.
pub fn commit_payload(op: &mut AnnotatedOperation, sink: &dyn BlobSink) -> DeltaResult<()> {
    if !op.has_pending_payload() {
        return Ok(());
    }
    let payload = op.take_payload();
    let offset = sink.append(&payload).map_err(|source| DeltaError::Blob {
        len: payload.len(),
        source,
    })?;
    op.operation.data = Some(DataLocator {
        offset,
        length: payload.len() as u64,
    });
    Ok(())
}

/// Writes every pending payload in list order.
pub fn commit_payloads(ops: &mut [AnnotatedOperation], sink: &dyn BlobSink) -> DeltaResult<()> {
    ops.iter_mut().try_for_each(|op| commit_payload(op, sink))
}

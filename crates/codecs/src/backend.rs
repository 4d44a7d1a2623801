//! Pluggable diff backends and the registry passed to the engine.
//!
//! Every backend is a pure function of its inputs and must be callable from
//! several worker threads at once.

use std::fmt;
use std::sync::Arc;

use crate::bsdiff::{Bsdiff, BytePatch, ZstdBsdiff};
use crate::error::CodecError;
use crate::hints::{CompressedContainer, StreamRange};

/// Byte-wise binary diff.
pub trait ByteDiffer: Send + Sync {
    /// Short backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Diffs `new` against `old`, returning the patch and its control stream.
    fn diff(&self, old: &[u8], new: &[u8]) -> Result<BytePatch, CodecError>;
}

/// Diff that decodes compressible sub-streams before comparing.
pub trait StreamDiffer: Send + Sync {
    /// Short backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Diffs `new` against `old` using the sub-stream locations of both.
    fn diff(
        &self,
        old: &[u8],
        new: &[u8],
        old_streams: &[StreamRange],
        new_streams: &[StreamRange],
    ) -> Result<Vec<u8>, CodecError>;
}

/// Diff over the decompressed contents of block-compressed containers.
pub trait ContainerDiffer: Send + Sync {
    /// Short backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Diffs `new` against `old` using both container layouts.
    fn diff(
        &self,
        old: &[u8],
        new: &[u8],
        old_layout: &CompressedContainer,
        new_layout: &CompressedContainer,
    ) -> Result<Vec<u8>, CodecError>;
}

/// Diff specialised for executables and archives.
pub trait ExecutableDiffer: Send + Sync {
    /// Short backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Diffs `new` against `old`.
    fn diff(&self, old: &[u8], new: &[u8]) -> Result<Vec<u8>, CodecError>;
}

/// Diff backends available to one run.
///
/// An operation kind whose backend is absent is never attempted, even when
/// the configuration enables it.
#[derive(Clone)]
pub struct CodecSet {
    byte: Option<Arc<dyn ByteDiffer>>,
    compressed_byte: Option<Arc<dyn ByteDiffer>>,
    stream: Option<Arc<dyn StreamDiffer>>,
    container: Option<Arc<dyn ContainerDiffer>>,
    executable: Option<Arc<dyn ExecutableDiffer>>,
}

impl CodecSet {
    /// A registry without any diff backend. Only full operations are possible.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            byte: None,
            compressed_byte: None,
            stream: None,
            container: None,
            executable: None,
        }
    }

    /// Replaces the plain byte-wise backend.
    #[must_use]
    pub fn with_byte_differ<D: ByteDiffer + 'static>(mut self, differ: D) -> Self {
        self.byte = Some(Arc::new(differ));
        self
    }

    /// Replaces the compressed byte-wise backend.
    #[must_use]
    pub fn with_compressed_byte_differ<D: ByteDiffer + 'static>(mut self, differ: D) -> Self {
        self.compressed_byte = Some(Arc::new(differ));
        self
    }

    /// Installs a stream-aware backend.
    #[must_use]
    pub fn with_stream_differ<D: StreamDiffer + 'static>(mut self, differ: D) -> Self {
        self.stream = Some(Arc::new(differ));
        self
    }

    /// Installs a container-aware backend.
    #[must_use]
    pub fn with_container_differ<D: ContainerDiffer + 'static>(mut self, differ: D) -> Self {
        self.container = Some(Arc::new(differ));
        self
    }

    /// Installs an executable-aware backend.
    #[must_use]
    pub fn with_executable_differ<D: ExecutableDiffer + 'static>(mut self, differ: D) -> Self {
        self.executable = Some(Arc::new(differ));
        self
    }

    /// Plain byte-wise backend, if any.
    #[must_use]
    pub fn byte_differ(&self) -> Option<&dyn ByteDiffer> {
        self.byte.as_deref()
    }

    /// Compressed byte-wise backend, if any.
    #[must_use]
    pub fn compressed_byte_differ(&self) -> Option<&dyn ByteDiffer> {
        self.compressed_byte.as_deref()
    }

    /// Stream-aware backend, if any.
    #[must_use]
    pub fn stream_differ(&self) -> Option<&dyn StreamDiffer> {
        self.stream.as_deref()
    }

    /// Container-aware backend, if any.
    #[must_use]
    pub fn container_differ(&self) -> Option<&dyn ContainerDiffer> {
        self.container.as_deref()
    }

    /// Executable-aware backend, if any.
    #[must_use]
    pub fn executable_differ(&self) -> Option<&dyn ExecutableDiffer> {
        self.executable.as_deref()
    }
}

impl Default for CodecSet {
    fn default() -> Self {
        Self::none()
            .with_byte_differ(Bsdiff)
            .with_compressed_byte_differ(ZstdBsdiff::default())
    }
}

impl fmt::Debug for CodecSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecSet")
            .field("byte", &self.byte.as_ref().map(|d| d.name()))
            .field("compressed_byte", &self.compressed_byte.as_ref().map(|d| d.name()))
            .field("stream", &self.stream.as_ref().map(|d| d.name()))
            .field("container", &self.container.as_ref().map(|d| d.name()))
            .field("executable", &self.executable.as_ref().map(|d| d.name()))
            .finish()
    }
}

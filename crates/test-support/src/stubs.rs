//! Backends with fixed behavior.

use codecs::hints::{CompressedContainer, StreamRange};
use codecs::{ByteDiffer, BytePatch, CodecError, ContainerDiffer, ExecutableDiffer, StreamDiffer};

/// Returns a patch of a fixed size regardless of input.
#[derive(Clone, Copy, Debug)]
pub struct SizedPatchBackend {
    /// Patch size in bytes.
    pub size: usize,
}

impl SizedPatchBackend {
    /// Backend producing `size`-byte patches.
    #[must_use]
    pub const fn new(size: usize) -> Self {
        Self { size }
    }

    fn patch(self) -> Vec<u8> {
        vec![0xa5; self.size]
    }
}

impl ByteDiffer for SizedPatchBackend {
    fn name(&self) -> &'static str {
        "sized-stub"
    }

    fn diff(&self, _old: &[u8], _new: &[u8]) -> Result<BytePatch, CodecError> {
        Ok(BytePatch {
            data: self.patch(),
            controls: Vec::new(),
        })
    }
}

impl StreamDiffer for SizedPatchBackend {
    fn name(&self) -> &'static str {
        "sized-stub"
    }

    fn diff(
        &self,
        _old: &[u8],
        _new: &[u8],
        _old_streams: &[StreamRange],
        _new_streams: &[StreamRange],
    ) -> Result<Vec<u8>, CodecError> {
        Ok(self.patch())
    }
}

impl ContainerDiffer for SizedPatchBackend {
    fn name(&self) -> &'static str {
        "sized-stub"
    }

    fn diff(
        &self,
        _old: &[u8],
        _new: &[u8],
        _old_layout: &CompressedContainer,
        _new_layout: &CompressedContainer,
    ) -> Result<Vec<u8>, CodecError> {
        Ok(self.patch())
    }
}

impl ExecutableDiffer for SizedPatchBackend {
    fn name(&self) -> &'static str {
        "sized-stub"
    }

    fn diff(&self, _old: &[u8], _new: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(self.patch())
    }
}

/// Fails every call.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailingBackend;

impl FailingBackend {
    fn error() -> CodecError {
        CodecError::unsupported("failing-stub", "always fails")
    }
}

impl ByteDiffer for FailingBackend {
    fn name(&self) -> &'static str {
        "failing-stub"
    }

    fn diff(&self, _old: &[u8], _new: &[u8]) -> Result<BytePatch, CodecError> {
        Err(Self::error())
    }
}

impl StreamDiffer for FailingBackend {
    fn name(&self) -> &'static str {
        "failing-stub"
    }

    fn diff(
        &self,
        _old: &[u8],
        _new: &[u8],
        _old_streams: &[StreamRange],
        _new_streams: &[StreamRange],
    ) -> Result<Vec<u8>, CodecError> {
        Err(Self::error())
    }
}

impl ExecutableDiffer for FailingBackend {
    fn name(&self) -> &'static str {
        "failing-stub"
    }

    fn diff(&self, _old: &[u8], _new: &[u8]) -> Result<Vec<u8>, CodecError> {
        Err(Self::error())
    }
}

//! Operations emitted by the engine.

use core::fmt;

use codecs::algorithm::CompressionAlgorithm;
use extents::{Extent, blocks_in_extents};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How an operation produces its destination blocks.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum OperationKind {
    /// Inline data written verbatim.
    Replace,
    /// Inline data, xz compressed.
    ReplaceXz,
    /// Inline data, bzip2 compressed.
    ReplaceBzip2,
    /// Destination blocks are zero-filled.
    Zero,
    /// Destination blocks are discarded.
    Discard,
    /// Destination blocks are copied from source blocks.
    SourceCopy,
    /// Plain byte-wise binary diff against the source blocks.
    ByteDiff,
    /// Compressed byte-wise binary diff against the source blocks.
    ByteDiffCompressed,
    /// Diff over decoded compressible sub-streams.
    StreamDiff,
    /// Executable-aware binary patch.
    BinaryPatchDiff,
    /// Diff over the decompressed contents of a block-compressed container.
    ContainerAwareDiff,
}

impl OperationKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 11] = [
        Self::Replace,
        Self::ReplaceXz,
        Self::ReplaceBzip2,
        Self::Zero,
        Self::Discard,
        Self::SourceCopy,
        Self::ByteDiff,
        Self::ByteDiffCompressed,
        Self::StreamDiff,
        Self::BinaryPatchDiff,
        Self::ContainerAwareDiff,
    ];

    /// Canonical upper-case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Replace => "REPLACE",
            Self::ReplaceXz => "REPLACE_XZ",
            Self::ReplaceBzip2 => "REPLACE_BZIP2",
            Self::Zero => "ZERO",
            Self::Discard => "DISCARD",
            Self::SourceCopy => "SOURCE_COPY",
            Self::ByteDiff => "BYTE_DIFF",
            Self::ByteDiffCompressed => "BYTE_DIFF_COMPRESSED",
            Self::StreamDiff => "STREAM_DIFF",
            Self::BinaryPatchDiff => "BINARY_PATCH_DIFF",
            Self::ContainerAwareDiff => "CONTAINER_AWARE_DIFF",
        }
    }

    /// Returns `true` for kinds that read source blocks.
    #[must_use]
    pub const fn reads_source(self) -> bool {
        matches!(
            self,
            Self::SourceCopy
                | Self::ByteDiff
                | Self::ByteDiffCompressed
                | Self::StreamDiff
                | Self::BinaryPatchDiff
                | Self::ContainerAwareDiff
        )
    }

    /// Returns `true` for the byte-wise diff kinds.
    #[must_use]
    pub const fn is_byte_diff(self) -> bool {
        matches!(self, Self::ByteDiff | Self::ByteDiffCompressed)
    }

    /// Returns `true` for kinds that carry no inline data.
    #[must_use]
    pub const fn is_dataless(self) -> bool {
        matches!(self, Self::Zero | Self::Discard | Self::SourceCopy)
    }

    /// Replace kind produced by `algorithm`.
    #[must_use]
    pub const fn for_compression(algorithm: CompressionAlgorithm) -> Self {
        match algorithm {
            CompressionAlgorithm::Xz => Self::ReplaceXz,
            CompressionAlgorithm::Bzip2 => Self::ReplaceBzip2,
        }
    }

    /// Compression used by a replace kind, if any.
    #[must_use]
    pub const fn compression(self) -> Option<CompressionAlgorithm> {
        match self {
            Self::ReplaceXz => Some(CompressionAlgorithm::Xz),
            Self::ReplaceBzip2 => Some(CompressionAlgorithm::Bzip2),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Location of an operation's inline data inside the data blob.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DataLocator {
    /// Offset of the first byte in the blob.
    pub offset: u64,
    /// Length in bytes.
    pub length: u64,
}

/// One instruction of the update.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Operation {
    /// How the destination is produced.
    pub kind: OperationKind,
    /// Destination blocks, in payload order.
    pub dst_extents: Vec<Extent>,
    /// Source blocks, in payload order. Empty unless the kind reads source.
    pub src_extents: Vec<Extent>,
    /// Source length in bytes, only set for byte diffs on old protocol versions.
    pub src_length: Option<u64>,
    /// Destination length in bytes, only set for byte diffs on old protocol versions.
    pub dst_length: Option<u64>,
    /// Inline data location once written to the blob.
    pub data: Option<DataLocator>,
}

impl Operation {
    /// Creates an operation writing `dst_extents`.
    #[must_use]
    pub fn new(kind: OperationKind, dst_extents: Vec<Extent>) -> Self {
        Self {
            kind,
            dst_extents,
            src_extents: Vec::new(),
            src_length: None,
            dst_length: None,
            data: None,
        }
    }

    /// Sets the source extents.
    #[must_use]
    pub fn with_src_extents(mut self, src_extents: Vec<Extent>) -> Self {
        self.src_extents = src_extents;
        self
    }

    /// Number of destination blocks.
    #[must_use]
    pub fn dst_block_count(&self) -> u64 {
        blocks_in_extents(&self.dst_extents)
    }

    /// Number of source blocks.
    #[must_use]
    pub fn src_block_count(&self) -> u64 {
        blocks_in_extents(&self.src_extents)
    }
}

/// Kind of a merge hint.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MergeKind {
    /// The destination block is the XOR of the source block and patch data.
    Xor,
}

/// Block-level hint letting a snapshot-based applier rebuild destination
/// blocks by XOR against source blocks.
///
/// With a nonzero `src_offset` the source bytes straddle two blocks, so
/// `src_extent` is one block longer than `dst_extent`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct XorHint {
    /// Source blocks.
    pub src_extent: Extent,
    /// Destination blocks.
    pub dst_extent: Extent,
    /// Byte offset of the source data within the first source block.
    pub src_offset: u64,
    /// Hint kind.
    pub kind: MergeKind,
}

/// An operation with its diagnostic name, merge hints and, until it is
/// written to the blob, its inline payload.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AnnotatedOperation {
    /// File or pseudo-file name, with `:block_offset` when chunked.
    pub name: String,
    /// The operation.
    pub operation: Operation,
    /// XOR merge hints derived from a byte diff.
    pub xor_hints: Vec<XorHint>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pending: Vec<u8>,
}

impl AnnotatedOperation {
    /// Wraps `operation` under `name` with no payload.
    #[must_use]
    pub fn new(name: impl Into<String>, operation: Operation) -> Self {
        Self {
            name: name.into(),
            operation,
            xor_hints: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Attaches an inline payload that still has to be written to the blob.
    #[must_use]
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.pending = payload;
        self
    }

    /// Attaches merge hints.
    #[must_use]
    pub fn with_xor_hints(mut self, hints: Vec<XorHint>) -> Self {
        self.xor_hints = hints;
        self
    }

    /// Payload not yet written to the blob.
    #[must_use]
    pub fn pending_payload(&self) -> &[u8] {
        &self.pending
    }

    /// Returns `true` while inline data waits to be written.
    #[must_use]
    pub fn has_pending_payload(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Removes and returns the pending payload.
    pub fn take_payload(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }
}

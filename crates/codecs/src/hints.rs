//! Per-file format hints consumed by the format-aware diff backends.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Framing of a compressible sub-stream embedded in a file.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum StreamKind {
    /// Raw deflate.
    Deflate,
    /// zlib-framed deflate.
    Zlib,
    /// gzip member.
    Gzip,
}

/// Byte range of a compressible sub-stream, relative to the start of its file.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StreamRange {
    /// Framing of the stream.
    pub kind: StreamKind,
    /// Offset of the first byte.
    pub offset: u64,
    /// Length in bytes.
    pub length: u64,
}

impl StreamRange {
    /// Creates a stream hint.
    #[must_use]
    pub const fn new(kind: StreamKind, offset: u64, length: u64) -> Self {
        Self {
            kind,
            offset,
            length,
        }
    }

    /// One past the last byte.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Restricts `streams` to the byte window `[start, start + len)` and rebases
/// the survivors onto the window.
///
/// A stream that straddles a window edge cannot be decoded from the window
/// alone and is dropped.
#[must_use]
pub fn clip_streams(streams: &[StreamRange], start: u64, len: u64) -> Vec<StreamRange> {
    let end = start.saturating_add(len);
    streams
        .iter()
        .filter(|stream| stream.length > 0 && stream.offset >= start && stream.end() <= end)
        .map(|stream| StreamRange::new(stream.kind, stream.offset - start, stream.length))
        .collect()
}

/// Returns `true` when both lists contain at least one stream of the same kind.
#[must_use]
pub fn share_stream_kind(old: &[StreamRange], new: &[StreamRange]) -> bool {
    old.iter()
        .any(|left| new.iter().any(|right| left.kind == right.kind))
}

/// Compression scheme of a block-compressed container file.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ContainerAlgorithm {
    /// Blocks stored without compression.
    Uncompressed,
    /// LZ4 blocks.
    Lz4,
    /// LZ4HC blocks.
    Lz4Hc,
    /// LZMA blocks.
    Lzma,
    /// Deflate blocks.
    Deflate,
}

/// One compressed block of a container.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CompressedBlock {
    /// Offset of the block's data once decompressed.
    pub uncompressed_offset: u64,
    /// Size of the block once decompressed.
    pub uncompressed_length: u64,
    /// Stored size of the block.
    pub compressed_length: u64,
}

impl CompressedBlock {
    /// Creates a block record.
    #[must_use]
    pub const fn new(uncompressed_offset: u64, uncompressed_length: u64, compressed_length: u64) -> Self {
        Self {
            uncompressed_offset,
            uncompressed_length,
            compressed_length,
        }
    }

    /// Returns `true` when the block is stored as-is.
    #[must_use]
    pub const fn is_stored(&self) -> bool {
        self.compressed_length >= self.uncompressed_length
    }
}

/// Layout of a file made of independently compressed blocks.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CompressedContainer {
    /// Algorithm used for every compressed block.
    pub algorithm: ContainerAlgorithm,
    /// Nominal uncompressed block size.
    pub block_size: u64,
    /// Blocks in file order.
    pub blocks: Vec<CompressedBlock>,
}

impl CompressedContainer {
    /// Creates a container description.
    #[must_use]
    pub const fn new(algorithm: ContainerAlgorithm, block_size: u64, blocks: Vec<CompressedBlock>) -> Self {
        Self {
            algorithm,
            block_size,
            blocks,
        }
    }

    /// Total size of the decompressed data.
    #[must_use]
    pub fn uncompressed_size(&self) -> u64 {
        self.blocks
            .last()
            .map_or(0, |block| block.uncompressed_offset + block.uncompressed_length)
    }

    /// Returns `true` when the container has no compressed block worth
    /// decoding, i.e. every block is stored.
    #[must_use]
    pub fn is_trivial(&self) -> bool {
        self.algorithm == ContainerAlgorithm::Uncompressed
            || self.blocks.iter().all(CompressedBlock::is_stored)
    }
}

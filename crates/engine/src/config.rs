//! Run configuration.
//!
//! [`PayloadGenerationConfig`] is built from [`Default`] and the chained
//! `with_*` methods, then checked once by [`PayloadGenerationConfig::validate`]
//! before a partition run starts.

use std::num::NonZeroUsize;

use bitflags::bitflags;
use codecs::algorithm::CompressionAlgorithm;
use codecs::suffix::SuffixList;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::operation::OperationKind;

/// Default block size in bytes.
pub const DEFAULT_BLOCK_SIZE: u64 = 4096;

/// Protocol minor version emitted by default.
pub const DEFAULT_MINOR_VERSION: u32 = 8;

/// First minor version whose byte diffs no longer carry explicit lengths.
pub const BYTE_DIFF_LENGTHS_DROPPED_VERSION: u32 = 3;

/// Default soft chunk: 2 MiB of 4 KiB blocks.
pub const DEFAULT_SOFT_CHUNK_BLOCKS: u64 = 512;

const MIB: u64 = 1024 * 1024;

bitflags! {
    /// Set of operation kinds a run may emit.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct OperationKindSet: u16 {
        /// [`OperationKind::Replace`].
        const REPLACE = 1 << 0;
        /// [`OperationKind::ReplaceXz`].
        const REPLACE_XZ = 1 << 1;
        /// [`OperationKind::ReplaceBzip2`].
        const REPLACE_BZIP2 = 1 << 2;
        /// [`OperationKind::Zero`].
        const ZERO = 1 << 3;
        /// [`OperationKind::Discard`].
        const DISCARD = 1 << 4;
        /// [`OperationKind::SourceCopy`].
        const SOURCE_COPY = 1 << 5;
        /// [`OperationKind::ByteDiff`].
        const BYTE_DIFF = 1 << 6;
        /// [`OperationKind::ByteDiffCompressed`].
        const BYTE_DIFF_COMPRESSED = 1 << 7;
        /// [`OperationKind::StreamDiff`].
        const STREAM_DIFF = 1 << 8;
        /// [`OperationKind::BinaryPatchDiff`].
        const BINARY_PATCH_DIFF = 1 << 9;
        /// [`OperationKind::ContainerAwareDiff`].
        const CONTAINER_AWARE_DIFF = 1 << 10;

        /// Whole-data operations only.
        const FULL = Self::REPLACE.bits() | Self::REPLACE_XZ.bits() | Self::REPLACE_BZIP2.bits();
    }
}

impl OperationKindSet {
    /// Flag for a single kind.
    #[must_use]
    pub const fn from_kind(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Replace => Self::REPLACE,
            OperationKind::ReplaceXz => Self::REPLACE_XZ,
            OperationKind::ReplaceBzip2 => Self::REPLACE_BZIP2,
            OperationKind::Zero => Self::ZERO,
            OperationKind::Discard => Self::DISCARD,
            OperationKind::SourceCopy => Self::SOURCE_COPY,
            OperationKind::ByteDiff => Self::BYTE_DIFF,
            OperationKind::ByteDiffCompressed => Self::BYTE_DIFF_COMPRESSED,
            OperationKind::StreamDiff => Self::STREAM_DIFF,
            OperationKind::BinaryPatchDiff => Self::BINARY_PATCH_DIFF,
            OperationKind::ContainerAwareDiff => Self::CONTAINER_AWARE_DIFF,
        }
    }

    /// Returns `true` when `kind` may be emitted.
    #[must_use]
    pub const fn allows(self, kind: OperationKind) -> bool {
        self.contains(Self::from_kind(kind))
    }
}

impl Default for OperationKindSet {
    fn default() -> Self {
        Self::all().difference(Self::DISCARD)
    }
}

/// Size of the windows a file is split into.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ChunkSize {
    /// One window per file.
    WholeFile,
    /// Windows of at most this many blocks.
    Blocks(u64),
}

impl ChunkSize {
    /// Window length in blocks for a file of `total_blocks` blocks.
    #[must_use]
    pub const fn window(self, total_blocks: u64) -> u64 {
        match self {
            Self::WholeFile => total_blocks,
            Self::Blocks(blocks) => blocks,
        }
    }
}

/// Per-kind input ceilings. A candidate is skipped when the larger of its
/// old and new windows exceeds its ceiling.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DiffSizeLimits {
    /// Byte-wise diff ceiling in bytes.
    pub byte_diff: u64,
    /// Stream-aware diff ceiling in bytes.
    pub stream_diff: u64,
    /// Executable-aware diff ceiling in bytes.
    pub binary_patch: u64,
    /// Container-aware diff ceiling in bytes.
    pub container_aware: u64,
}

impl DiffSizeLimits {
    /// Ceiling for `kind`; unbounded for kinds without one.
    #[must_use]
    pub const fn limit_for(&self, kind: OperationKind) -> u64 {
        match kind {
            OperationKind::ByteDiff | OperationKind::ByteDiffCompressed => self.byte_diff,
            OperationKind::StreamDiff => self.stream_diff,
            OperationKind::BinaryPatchDiff => self.binary_patch,
            OperationKind::ContainerAwareDiff => self.container_aware,
            _ => u64::MAX,
        }
    }
}

impl Default for DiffSizeLimits {
    fn default() -> Self {
        Self {
            byte_diff: 200 * MIB,
            stream_diff: 150 * MIB,
            binary_patch: 150 * MIB,
            container_aware: 150 * MIB,
        }
    }
}

/// Payload bytes a source-reading operation costs beyond its data.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DiffOverhead {
    /// Fixed cost per operation.
    pub fixed_bytes: u64,
    /// Cost per source extent.
    pub per_source_extent_bytes: u64,
}

impl DiffOverhead {
    /// Effective size of a source-reading candidate.
    #[must_use]
    pub const fn charge(&self, size: u64, source_extents: u64) -> u64 {
        size.saturating_add(self.fixed_bytes)
            .saturating_add(self.per_source_extent_bytes.saturating_mul(source_extents))
    }
}

impl Default for DiffOverhead {
    fn default() -> Self {
        Self {
            fixed_bytes: 38,
            per_source_extent_bytes: 6,
        }
    }
}

/// When inline payloads reach the blob sink.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BlobWriteMode {
    /// Payloads travel with job results and are appended in merged order.
    #[default]
    InOrder,
    /// Each job appends its payloads as soon as it finishes.
    Streaming,
}

/// Invalid configuration values.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// The block size is zero or not a power of two.
    #[error("block size must be a non-zero power of two, got {0}")]
    BlockSize(u64),
    /// REPLACE is the fallback of every window and cannot be disabled.
    #[error("REPLACE must stay enabled")]
    ReplaceDisabled,
    /// A chunk size of zero blocks.
    #[error("{which} chunk size must be at least one block")]
    ZeroChunk {
        /// `hard` or `soft`.
        which: &'static str,
    },
    /// A non-empty partition without an image path.
    #[error("partition {name} has {size} bytes but no image path")]
    MissingPath {
        /// Partition name.
        name: String,
        /// Declared size.
        size: u64,
    },
    /// The partition size is not a whole number of blocks.
    #[error("partition {name} size {size} is not a multiple of the block size {block_size}")]
    UnalignedPartition {
        /// Partition name.
        name: String,
        /// Declared size.
        size: u64,
        /// Configured block size.
        block_size: u64,
    },
}

/// Knobs of one delta generation run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PayloadGenerationConfig {
    /// Block size in bytes.
    pub block_size: u64,
    /// Protocol minor version of the payload being produced.
    pub minor_version: u32,
    /// Kinds the run may emit.
    pub enabled_operations: OperationKindSet,
    /// Compressors tried for full operations, in order.
    pub compressors: Vec<CompressionAlgorithm>,
    /// Window size for regular files.
    pub hard_chunk: ChunkSize,
    /// Window size for the non-file-data region.
    pub soft_chunk: ChunkSize,
    /// Per-kind input ceilings.
    pub size_limits: DiffSizeLimits,
    /// Overhead charged to source-reading candidates.
    pub diff_overhead: DiffOverhead,
    /// Derive XOR merge hints from accepted byte diffs.
    pub enable_vabc_xor: bool,
    /// Worker count override.
    pub worker_threads: Option<NonZeroUsize>,
    /// When payloads are written to the blob.
    pub blob_write_mode: BlobWriteMode,
    /// File suffixes eligible for the executable-aware diff.
    pub executable_suffixes: SuffixList,
}

impl Default for PayloadGenerationConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            minor_version: DEFAULT_MINOR_VERSION,
            enabled_operations: OperationKindSet::default(),
            compressors: CompressionAlgorithm::default_order(),
            hard_chunk: ChunkSize::WholeFile,
            soft_chunk: ChunkSize::Blocks(DEFAULT_SOFT_CHUNK_BLOCKS),
            size_limits: DiffSizeLimits::default(),
            diff_overhead: DiffOverhead::default(),
            enable_vabc_xor: false,
            worker_threads: None,
            blob_write_mode: BlobWriteMode::default(),
            executable_suffixes: SuffixList::default(),
        }
    }
}

impl PayloadGenerationConfig {
    /// Sets the block size.
    #[must_use]
    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size;
        self
    }

    /// Sets the protocol minor version.
    #[must_use]
    pub fn with_minor_version(mut self, minor_version: u32) -> Self {
        self.minor_version = minor_version;
        self
    }

    /// Replaces the enabled kinds.
    #[must_use]
    pub fn with_enabled_operations(mut self, kinds: OperationKindSet) -> Self {
        self.enabled_operations = kinds;
        self
    }

    /// Replaces the compressor list.
    #[must_use]
    pub fn with_compressors(mut self, compressors: Vec<CompressionAlgorithm>) -> Self {
        self.compressors = compressors;
        self
    }

    /// Sets the window size for regular files.
    #[must_use]
    pub fn with_hard_chunk(mut self, chunk: ChunkSize) -> Self {
        self.hard_chunk = chunk;
        self
    }

    /// Sets the window size for the non-file-data region.
    #[must_use]
    pub fn with_soft_chunk(mut self, chunk: ChunkSize) -> Self {
        self.soft_chunk = chunk;
        self
    }

    /// Replaces the per-kind ceilings.
    #[must_use]
    pub fn with_size_limits(mut self, limits: DiffSizeLimits) -> Self {
        self.size_limits = limits;
        self
    }

    /// Replaces the overhead charged to source-reading candidates.
    #[must_use]
    pub fn with_diff_overhead(mut self, overhead: DiffOverhead) -> Self {
        self.diff_overhead = overhead;
        self
    }

    /// Enables or disables XOR merge hints.
    #[must_use]
    pub fn with_vabc_xor(mut self, enabled: bool) -> Self {
        self.enable_vabc_xor = enabled;
        self
    }

    /// Overrides the worker count.
    #[must_use]
    pub fn with_worker_threads(mut self, threads: NonZeroUsize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    /// Sets when payloads reach the blob.
    #[must_use]
    pub fn with_blob_write_mode(mut self, mode: BlobWriteMode) -> Self {
        self.blob_write_mode = mode;
        self
    }

    /// Replaces the executable suffix allow-list.
    #[must_use]
    pub fn with_executable_suffixes(mut self, suffixes: SuffixList) -> Self {
        self.executable_suffixes = suffixes;
        self
    }

    /// Returns `true` when byte diffs must carry explicit lengths.
    #[must_use]
    pub const fn byte_diff_needs_lengths(&self) -> bool {
        self.minor_version < BYTE_DIFF_LENGTHS_DROPPED_VERSION
    }

    /// Number of workers for a run.
    #[must_use]
    pub fn effective_worker_threads(&self) -> usize {
        self.worker_threads.map_or_else(
            || {
                std::thread::available_parallelism()
                    .map_or(1, NonZeroUsize::get)
                    .max(4)
            },
            NonZeroUsize::get,
        )
    }

    /// Checks the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 || !self.block_size.is_power_of_two() {
            return Err(ConfigError::BlockSize(self.block_size));
        }
        if !self.enabled_operations.contains(OperationKindSet::REPLACE) {
            return Err(ConfigError::ReplaceDisabled);
        }
        if self.hard_chunk == ChunkSize::Blocks(0) {
            return Err(ConfigError::ZeroChunk { which: "hard" });
        }
        if self.soft_chunk == ChunkSize::Blocks(0) {
            return Err(ConfigError::ZeroChunk { which: "soft" });
        }
        Ok(())
    }
}

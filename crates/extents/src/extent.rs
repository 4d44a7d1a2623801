//! crates/extents/src/extent.rs
//!
//! The [`Extent`] type and helpers over ordered extent lists.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A contiguous range of blocks: `[start_block, start_block + num_blocks)`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Extent {
    /// First block covered by the extent.
    pub start_block: u64,
    /// Number of blocks covered by the extent.
    pub num_blocks: u64,
}

impl Extent {
    /// Creates a new extent.
    #[must_use]
    pub const fn new(start_block: u64, num_blocks: u64) -> Self {
        Self {
            start_block,
            num_blocks,
        }
    }

    /// Returns the first block past the extent.
    #[must_use]
    pub const fn end_block(self) -> u64 {
        self.start_block + self.num_blocks
    }

    /// Returns `true` when the extent covers no blocks.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.num_blocks == 0
    }

    /// Returns `true` when `block` lies inside the extent.
    #[must_use]
    pub const fn contains_block(self, block: u64) -> bool {
        block >= self.start_block && block < self.end_block()
    }

    /// Returns `true` when both extents share at least one block.
    #[must_use]
    pub const fn overlaps(self, other: Self) -> bool {
        self.start_block < other.end_block() && other.start_block < self.end_block()
    }

    /// Iterates over the block numbers covered by the extent.
    pub fn blocks(self) -> impl Iterator<Item = u64> {
        self.start_block..self.end_block()
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.num_blocks == 0 {
            return write!(f, "[{}, empty)", self.start_block);
        }
        write!(f, "[{}..{})", self.start_block, self.end_block())
    }
}

/// Total number of blocks covered by an extent list.
#[must_use]
pub fn blocks_in_extents(extents: &[Extent]) -> u64 {
    extents.iter().map(|extent| extent.num_blocks).sum()
}

/// Appends `block` to the list, extending the last extent when it is contiguous.
pub fn append_block(extents: &mut Vec<Extent>, block: u64) {
    append_extent(extents, Extent::new(block, 1));
}

/// Appends `extent` to the list, merging it into the last extent when contiguous.
///
/// Empty extents are dropped.
pub fn append_extent(extents: &mut Vec<Extent>, extent: Extent) {
    if extent.is_empty() {
        return;
    }
    if let Some(last) = extents.last_mut() {
        if last.end_block() == extent.start_block {
            last.num_blocks += extent.num_blocks;
            return;
        }
    }
    extents.push(extent);
}

/// Drops empty extents and merges contiguous neighbours, keeping the list order.
#[must_use]
pub fn normalize_extents(extents: &[Extent]) -> Vec<Extent> {
    let mut normalized = Vec::with_capacity(extents.len());
    for extent in extents {
        append_extent(&mut normalized, *extent);
    }
    normalized
}

/// Returns the window `[block_offset, block_offset + block_count)` of the block
/// sequence described by `extents`.
///
/// The offset and count are measured in blocks of the concatenated list, not in
/// partition block numbers. When the list holds fewer blocks than requested the
/// result is truncated, possibly to an empty list.
#[must_use]
pub fn extents_sublist(extents: &[Extent], block_offset: u64, block_count: u64) -> Vec<Extent> {
    let mut result = Vec::new();
    let window_end = block_offset.saturating_add(block_count);
    let mut scanned = 0u64;

    for extent in extents {
        if scanned >= window_end {
            break;
        }
        let extent_end = scanned + extent.num_blocks;
        if extent_end > block_offset {
            let skip = block_offset.saturating_sub(scanned);
            let take = extent_end.min(window_end) - scanned - skip;
            append_extent(&mut result, Extent::new(extent.start_block + skip, take));
        }
        scanned = extent_end;
    }

    result
}

/// Maps the `relative_block`-th block of the list to its partition block number.
#[must_use]
pub fn block_at(extents: &[Extent], relative_block: u64) -> Option<u64> {
    let mut remaining = relative_block;
    for extent in extents {
        if remaining < extent.num_blocks {
            return Some(extent.start_block + remaining);
        }
        remaining -= extent.num_blocks;
    }
    None
}

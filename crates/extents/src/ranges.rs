//! crates/extents/src/ranges.rs
//!
//! Ordered set of blocks stored as merged half-open ranges.

use std::collections::BTreeMap;

use crate::extent::{Extent, append_extent};

/// A set of blocks kept as disjoint, non-adjacent ranges.
///
/// Ranges are keyed by their first block and store the first block past their
/// end, so lookups for a block only need the closest range starting at or
/// before it.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExtentRanges {
    ranges: BTreeMap<u64, u64>,
    blocks: u64,
}

impl ExtentRanges {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from a list of possibly overlapping extents.
    #[must_use]
    pub fn from_extents(extents: &[Extent]) -> Self {
        let mut ranges = Self::new();
        ranges.add_extents(extents);
        ranges
    }

    /// Number of blocks in the set.
    #[must_use]
    pub const fn block_count(&self) -> u64 {
        self.blocks
    }

    /// Returns `true` when the set holds no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Adds a single block.
    pub fn add_block(&mut self, block: u64) {
        self.add_range(block, 1);
    }

    /// Adds an extent.
    pub fn add_extent(&mut self, extent: Extent) {
        self.add_range(extent.start_block, extent.num_blocks);
    }

    /// Adds every extent of the list.
    pub fn add_extents(&mut self, extents: &[Extent]) {
        for extent in extents {
            self.add_extent(*extent);
        }
    }

    /// Adds every block of another set.
    pub fn add_ranges(&mut self, other: &Self) {
        for (&start, &end) in &other.ranges {
            self.add_range(start, end - start);
        }
    }

    /// Adds `[start, start + num_blocks)`, merging with overlapping or adjacent ranges.
    pub fn add_range(&mut self, start: u64, num_blocks: u64) {
        if num_blocks == 0 {
            return;
        }
        let mut merged_start = start;
        let mut merged_end = start + num_blocks;

        let touching: Vec<u64> = self
            .ranges
            .range(..=merged_end)
            .rev()
            .take_while(|&(_, &end)| end >= merged_start)
            .map(|(&start, _)| start)
            .collect();

        for range_start in touching {
            if let Some(range_end) = self.ranges.remove(&range_start) {
                self.blocks -= range_end - range_start;
                merged_start = merged_start.min(range_start);
                merged_end = merged_end.max(range_end);
            }
        }

        self.ranges.insert(merged_start, merged_end);
        self.blocks += merged_end - merged_start;
    }

    /// Removes an extent from the set.
    pub fn subtract_extent(&mut self, extent: Extent) {
        self.subtract_range(extent.start_block, extent.num_blocks);
    }

    /// Removes every extent of the list from the set.
    pub fn subtract_extents(&mut self, extents: &[Extent]) {
        for extent in extents {
            self.subtract_extent(*extent);
        }
    }

    /// Removes every block of another set.
    pub fn subtract_ranges(&mut self, other: &Self) {
        for (&start, &end) in &other.ranges {
            self.subtract_range(start, end - start);
        }
    }

    /// Removes `[start, start + num_blocks)` from the set.
    pub fn subtract_range(&mut self, start: u64, num_blocks: u64) {
        if num_blocks == 0 {
            return;
        }
        let end = start + num_blocks;

        let overlapping: Vec<u64> = self
            .ranges
            .range(..end)
            .rev()
            .take_while(|&(_, &range_end)| range_end > start)
            .map(|(&range_start, _)| range_start)
            .collect();

        for range_start in overlapping {
            let Some(range_end) = self.ranges.remove(&range_start) else {
                continue;
            };
            self.blocks -= range_end - range_start;
            if range_start < start {
                self.ranges.insert(range_start, start);
                self.blocks += start - range_start;
            }
            if range_end > end {
                self.ranges.insert(end, range_end);
                self.blocks += range_end - end;
            }
        }
    }

    /// Returns `true` when `block` is in the set.
    #[must_use]
    pub fn contains_block(&self, block: u64) -> bool {
        self.ranges
            .range(..=block)
            .next_back()
            .is_some_and(|(_, &end)| block < end)
    }

    /// Returns `true` when every block of `extent` is in the set.
    #[must_use]
    pub fn contains_extent(&self, extent: Extent) -> bool {
        if extent.is_empty() {
            return true;
        }
        self.ranges
            .range(..=extent.start_block)
            .next_back()
            .is_some_and(|(_, &end)| extent.end_block() <= end)
    }

    /// Returns `true` when at least one block of `extent` is in the set.
    #[must_use]
    pub fn overlaps_extent(&self, extent: Extent) -> bool {
        if extent.is_empty() {
            return false;
        }
        self.ranges
            .range(..extent.end_block())
            .next_back()
            .is_some_and(|(_, &end)| end > extent.start_block)
    }

    /// Returns the set as ascending, merged extents.
    #[must_use]
    pub fn extents(&self) -> Vec<Extent> {
        self.ranges
            .iter()
            .map(|(&start, &end)| Extent::new(start, end - start))
            .collect()
    }

    /// Iterates the merged ranges overlapping `extent` in ascending order.
    fn overlapping(&self, extent: Extent) -> impl Iterator<Item = (u64, u64)> + '_ {
        let first = self
            .ranges
            .range(..=extent.start_block)
            .next_back()
            .filter(|&(_, &end)| end > extent.start_block);
        first
            .into_iter()
            .chain(self.ranges.range(extent.start_block + 1..extent.end_block()))
            .map(|(&start, &end)| (start, end))
    }
}

/// Returns the parts of `extents` that are not contained in `ranges`.
///
/// The input order is preserved; an extent split by the tracker yields its
/// surviving pieces in ascending order.
#[must_use]
pub fn filter_extent_ranges(extents: &[Extent], ranges: &ExtentRanges) -> Vec<Extent> {
    let mut result = Vec::with_capacity(extents.len());

    for extent in extents {
        if extent.is_empty() {
            continue;
        }
        let mut cursor = extent.start_block;
        for (start, end) in ranges.overlapping(*extent) {
            if start > cursor {
                append_extent(&mut result, Extent::new(cursor, start - cursor));
            }
            cursor = cursor.max(end);
            if cursor >= extent.end_block() {
                break;
            }
        }
        if cursor < extent.end_block() {
            append_extent(&mut result, Extent::new(cursor, extent.end_block() - cursor));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_merges_overlapping_and_adjacent_ranges() {
        let mut ranges = ExtentRanges::new();
        ranges.add_range(10, 5);
        ranges.add_range(20, 5);
        assert_eq!(ranges.block_count(), 10);

        ranges.add_range(15, 5);
        assert_eq!(ranges.extents(), vec![Extent::new(10, 15)]);
        assert_eq!(ranges.block_count(), 15);

        ranges.add_range(12, 2);
        assert_eq!(ranges.extents(), vec![Extent::new(10, 15)]);
        assert_eq!(ranges.block_count(), 15);
    }

    #[test]
    fn add_is_idempotent() {
        let mut ranges = ExtentRanges::new();
        ranges.add_extent(Extent::new(3, 4));
        ranges.add_extent(Extent::new(3, 4));
        assert_eq!(ranges.block_count(), 4);
        assert_eq!(ranges.extents(), vec![Extent::new(3, 4)]);
    }

    #[test]
    fn add_spanning_range_swallows_several() {
        let mut ranges = ExtentRanges::new();
        ranges.add_range(0, 2);
        ranges.add_range(5, 2);
        ranges.add_range(9, 2);
        ranges.add_range(1, 9);
        assert_eq!(ranges.extents(), vec![Extent::new(0, 11)]);
        assert_eq!(ranges.block_count(), 11);
    }

    #[test]
    fn subtract_splits_ranges() {
        let mut ranges = ExtentRanges::from_extents(&[Extent::new(0, 10)]);
        ranges.subtract_extent(Extent::new(3, 2));
        assert_eq!(ranges.extents(), vec![Extent::new(0, 3), Extent::new(5, 5)]);
        assert_eq!(ranges.block_count(), 8);

        ranges.subtract_range(0, 100);
        assert!(ranges.is_empty());
        assert_eq!(ranges.block_count(), 0);
    }

    #[test]
    fn contains_block_respects_bounds() {
        let ranges = ExtentRanges::from_extents(&[Extent::new(4, 2), Extent::new(10, 1)]);
        assert!(!ranges.contains_block(3));
        assert!(ranges.contains_block(4));
        assert!(ranges.contains_block(5));
        assert!(!ranges.contains_block(6));
        assert!(ranges.contains_block(10));
        assert!(!ranges.contains_block(11));
    }

    #[test]
    fn contains_and_overlaps_extent() {
        let ranges = ExtentRanges::from_extents(&[Extent::new(4, 4)]);
        assert!(ranges.contains_extent(Extent::new(5, 2)));
        assert!(!ranges.contains_extent(Extent::new(6, 4)));
        assert!(ranges.overlaps_extent(Extent::new(6, 4)));
        assert!(ranges.overlaps_extent(Extent::new(0, 5)));
        assert!(!ranges.overlaps_extent(Extent::new(8, 4)));
        assert!(!ranges.overlaps_extent(Extent::new(0, 4)));
    }

    #[test]
    fn filter_preserves_input_order() {
        let ranges = ExtentRanges::from_extents(&[Extent::new(2, 2), Extent::new(20, 5)]);
        let input = [Extent::new(18, 10), Extent::new(0, 6)];
        assert_eq!(
            filter_extent_ranges(&input, &ranges),
            vec![
                Extent::new(18, 2),
                Extent::new(25, 3),
                Extent::new(0, 2),
                Extent::new(4, 2),
            ]
        );
    }

    #[test]
    fn filter_removes_fully_covered_extents() {
        let ranges = ExtentRanges::from_extents(&[Extent::new(0, 100)]);
        assert!(filter_extent_ranges(&[Extent::new(5, 1), Extent::new(50, 50)], &ranges).is_empty());
    }

    #[test]
    fn filter_single_block_extent() {
        let ranges = ExtentRanges::from_extents(&[Extent::new(7, 1)]);
        assert_eq!(
            filter_extent_ranges(&[Extent::new(6, 1), Extent::new(7, 1)], &ranges),
            vec![Extent::new(6, 1)]
        );
    }
}

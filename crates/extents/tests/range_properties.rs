//! Property tests for the extent range tracker.
//!
//! The tracker is compared against a plain block bitmap so that merging,
//! subtraction and filtering can be checked on arbitrary inputs.

use extents::{Extent, ExtentRanges, blocks_in_extents, extents_sublist, filter_extent_ranges};
use proptest::prelude::*;

const UNIVERSE: u64 = 256;

fn extent_strategy() -> impl Strategy<Value = Extent> {
    (0..UNIVERSE, 0u64..24).prop_map(|(start, len)| Extent::new(start, len.min(UNIVERSE - start)))
}

fn bitmap(extents: &[Extent]) -> Vec<bool> {
    let mut map = vec![false; UNIVERSE as usize];
    for extent in extents {
        for block in extent.blocks() {
            map[block as usize] = true;
        }
    }
    map
}

proptest! {
    #[test]
    fn union_matches_bitmap(list in prop::collection::vec(extent_strategy(), 0..32)) {
        let ranges = ExtentRanges::from_extents(&list);
        let expected = bitmap(&list);

        for block in 0..UNIVERSE {
            prop_assert_eq!(ranges.contains_block(block), expected[block as usize]);
        }
        let count = expected.iter().filter(|&&set| set).count() as u64;
        prop_assert_eq!(ranges.block_count(), count);

        let merged = ranges.extents();
        for pair in merged.windows(2) {
            prop_assert!(pair[0].end_block() < pair[1].start_block);
        }
    }

    #[test]
    fn subtract_matches_bitmap(
        added in prop::collection::vec(extent_strategy(), 0..16),
        removed in prop::collection::vec(extent_strategy(), 0..16),
    ) {
        let mut ranges = ExtentRanges::from_extents(&added);
        ranges.subtract_extents(&removed);

        let plus = bitmap(&added);
        let minus = bitmap(&removed);
        for block in 0..UNIVERSE {
            let expected = plus[block as usize] && !minus[block as usize];
            prop_assert_eq!(ranges.contains_block(block), expected);
        }
    }

    #[test]
    fn filter_keeps_exactly_the_uncovered_blocks(
        tracked in prop::collection::vec(extent_strategy(), 0..16),
        input in prop::collection::vec(extent_strategy(), 0..8),
    ) {
        let ranges = ExtentRanges::from_extents(&tracked);
        let filtered = filter_extent_ranges(&input, &ranges);

        for extent in &filtered {
            prop_assert!(!extent.is_empty());
            prop_assert!(!ranges.overlaps_extent(*extent));
        }

        let expected: Vec<u64> = input
            .iter()
            .flat_map(|extent| extent.blocks())
            .filter(|&block| !ranges.contains_block(block))
            .collect();
        let actual: Vec<u64> = filtered.iter().flat_map(|extent| extent.blocks()).collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn sublists_partition_the_list(
        input in prop::collection::vec(extent_strategy(), 0..8),
        chunk in 1u64..16,
    ) {
        let total = blocks_in_extents(&input);
        let mut rebuilt = Vec::new();
        let mut offset = 0;
        while offset < total {
            let window = extents_sublist(&input, offset, chunk);
            prop_assert_eq!(blocks_in_extents(&window), chunk.min(total - offset));
            rebuilt.extend(window.iter().flat_map(|extent| extent.blocks()));
            offset += chunk;
        }
        let expected: Vec<u64> = input.iter().flat_map(|extent| extent.blocks()).collect();
        prop_assert_eq!(rebuilt, expected);
    }
}

//! XOR merge hints derived from a byte-wise diff.
//!
//! A snapshot-based applier can rebuild a destination block as the XOR of a
//! source block and the patch bytes whenever the diff covered that block with
//! a single matched run. This module walks the diff's control stream and
//! reports those blocks.

use codecs::ControlEntry;
use extents::{Extent, ExtentRanges, block_at, blocks_in_extents};

use crate::operation::{MergeKind, XorHint};

/// Derives block-level XOR hints for a byte diff from `src_extents` to
/// `dst_extents`.
///
/// # Invariants
///
/// - Only whole destination blocks inside a matched run are reported.
/// - No destination block appears in two hints.
/// - Adjoining blocks with the same source offset are coalesced.
/// - A hint with a nonzero source offset covers one extra source block.
#[must_use]
pub fn populate_xor_hints(
    controls: &[ControlEntry],
    src_extents: &[Extent],
    dst_extents: &[Extent],
    block_size: u64,
) -> Vec<XorHint> {
    let src_bytes = blocks_in_extents(src_extents) * block_size;
    let mut covered = ExtentRanges::new();
    let mut hints: Vec<XorHint> = Vec::new();
    let mut old_pos: i64 = 0;
    let mut new_pos: u64 = 0;

    for entry in controls {
        let run_start = new_pos;
        let run_end = new_pos + entry.diff_len;
        let mut dst_rel = run_start.div_ceil(block_size);

        while (dst_rel + 1) * block_size <= run_end {
            let src_pos = old_pos + (dst_rel * block_size - run_start) as i64;
            if let Some((src_block, src_offset)) =
                source_block(src_extents, src_pos, src_bytes, block_size)
            {
                if let Some(dst_block) = block_at(dst_extents, dst_rel) {
                    if !covered.contains_block(dst_block) {
                        covered.add_block(dst_block);
                        push_hint(&mut hints, src_block, dst_block, src_offset);
                    }
                }
            }
            dst_rel += 1;
        }

        new_pos = run_end + entry.extra_len;
        old_pos += entry.diff_len as i64 + entry.seek;
    }

    for hint in &mut hints {
        if hint.src_offset != 0 {
            hint.src_extent.num_blocks += 1;
        }
    }
    hints
}

/// Maps a source byte position to `(partition block, offset)`, or `None`
/// when the block's bytes leave the source extents or span two blocks that
/// are not physically adjacent.
fn source_block(src_extents: &[Extent], src_pos: i64, src_bytes: u64, block_size: u64) -> Option<(u64, u64)> {
    let src_pos = u64::try_from(src_pos).ok()?;
    if src_pos + block_size > src_bytes {
        return None;
    }
    let rel = src_pos / block_size;
    let offset = src_pos % block_size;
    let block = block_at(src_extents, rel)?;
    if offset != 0 && block_at(src_extents, rel + 1) != Some(block + 1) {
        return None;
    }
    Some((block, offset))
}

fn push_hint(hints: &mut Vec<XorHint>, src_block: u64, dst_block: u64, src_offset: u64) {
    if let Some(last) = hints.last_mut() {
        if last.src_offset == src_offset
            && last.dst_extent.end_block() == dst_block
            && last.src_extent.end_block() == src_block
        {
            last.dst_extent.num_blocks += 1;
            last.src_extent.num_blocks += 1;
            return;
        }
    }
    hints.push(XorHint {
        src_extent: Extent::new(src_block, 1),
        dst_extent: Extent::new(dst_block, 1),
        src_offset,
        kind: MergeKind::Xor,
    });
}

//! Partition-wide zero and moved-block pass.
//!
//! # Overview
//!
//! Runs once per partition, before any file is diffed. New blocks that are
//! entirely zero become ZERO operations; new blocks whose content exists
//! somewhere in the old partition become SOURCE_COPY operations reading that
//! old block. Everything claimed here is marked visited so no file job sees
//! it again.
//!
//! # Invariants
//!
//! - Each old block is paired with at most one new block.
//! - When several old blocks share a content identity, the lowest-numbered
//!   one still available is used first.
//! - Old zero blocks are visited up front and never serve as copy sources.

use extents::{Extent, ExtentRanges, append_block, blocks_in_extents, extents_sublist};
use rustc_hash::FxHashMap;

use crate::block_identity::{BlockIdentities, ZERO_BLOCK_ID};
use crate::config::ChunkSize;
use crate::error::{DeltaResult, StructuralError};
use crate::file_delta::{FileJob, FileSide, JobContext, process_file};
use crate::operation::{AnnotatedOperation, Operation, OperationKind};
use crate::partition::{IDENTICAL_BLOCKS_NAME, ZEROS_NAME};

/// Operations and block counts produced by [`zero_moved_pass`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ZeroMovedOutcome {
    /// Operations producing the zero blocks, ascending.
    pub zero_ops: Vec<AnnotatedOperation>,
    /// SOURCE_COPY operations for relocated blocks, ascending by destination.
    pub copy_ops: Vec<AnnotatedOperation>,
    /// New blocks produced as zeros.
    pub zero_blocks: u64,
    /// New blocks copied from the old partition.
    pub moved_blocks: u64,
}

impl ZeroMovedOutcome {
    /// Number of operations emitted.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.zero_ops.len() + self.copy_ops.len()
    }
}

/// Claims zero and relocated blocks of the new partition.
///
/// `old_visited` and `new_visited` are extended with every block the pass
/// claims. New blocks already in `new_visited` are left alone.
pub fn zero_moved_pass(
    identities: &BlockIdentities,
    old_visited: &mut ExtentRanges,
    new_visited: &mut ExtentRanges,
    ctx: &JobContext<'_>,
) -> DeltaResult<ZeroMovedOutcome> {
    let config = ctx.config;
    let copy_enabled = config.enabled_operations.allows(OperationKind::SourceCopy);

    let mut old_blocks_map: FxHashMap<u64, Vec<u64>> = FxHashMap::default();
    for (block, &id) in identities.old.iter().enumerate().rev() {
        let block = block as u64;
        if id == ZERO_BLOCK_ID {
            old_visited.add_block(block);
        } else if copy_enabled && !old_visited.contains_block(block) {
            old_blocks_map.entry(id).or_default().push(block);
        }
    }

    let mut new_zeros: Vec<Extent> = Vec::new();
    let mut new_identical: Vec<Extent> = Vec::new();
    let mut old_identical: Vec<Extent> = Vec::new();
    for (block, &id) in identities.new.iter().enumerate() {
        let block = block as u64;
        if new_visited.contains_block(block) {
            continue;
        }
        if id == ZERO_BLOCK_ID {
            append_block(&mut new_zeros, block);
            continue;
        }
        if let Some(old_block) = old_blocks_map.get_mut(&id).and_then(Vec::pop) {
            append_block(&mut new_identical, block);
            append_block(&mut old_identical, old_block);
        }
    }

    new_visited.add_extents(&new_zeros);
    new_visited.add_extents(&new_identical);
    old_visited.add_extents(&old_identical);

    let mut outcome = ZeroMovedOutcome {
        zero_blocks: blocks_in_extents(&new_zeros),
        moved_blocks: blocks_in_extents(&new_identical),
        ..ZeroMovedOutcome::default()
    };

    if config.enabled_operations.allows(OperationKind::Zero) {
        for extent in chunk_extents(&new_zeros, config.hard_chunk)? {
            outcome.zero_ops.push(AnnotatedOperation::new(
                ZEROS_NAME,
                Operation::new(OperationKind::Zero, vec![extent]),
            ));
        }
    } else if !new_zeros.is_empty() {
        let job = FileJob {
            name: ZEROS_NAME.to_owned(),
            old: FileSide::default(),
            new: FileSide::blocks(new_zeros),
            chunk: config.hard_chunk,
        };
        outcome.zero_ops = process_file(&job, ctx)?;
    }

    let mut used = 0u64;
    for extent in chunk_extents(&new_identical, config.hard_chunk)? {
        let src = extents_sublist(&old_identical, used, extent.num_blocks);
        used += extent.num_blocks;
        outcome.copy_ops.push(AnnotatedOperation::new(
            IDENTICAL_BLOCKS_NAME,
            Operation::new(OperationKind::SourceCopy, vec![extent]).with_src_extents(src),
        ));
    }

    Ok(outcome)
}

/// Cuts every extent into pieces of at most one chunk window.
fn chunk_extents(extents: &[Extent], chunk: ChunkSize) -> DeltaResult<Vec<Extent>> {
    let mut pieces = Vec::with_capacity(extents.len());
    for extent in extents {
        let window = chunk.window(extent.num_blocks);
        if window == 0 {
            return Err(StructuralError::ZeroChunk.into());
        }
        let mut start = extent.start_block;
        while start < extent.end_block() {
            let blocks = window.min(extent.end_block() - start);
            pieces.push(Extent::new(start, blocks));
            start += blocks;
        }
    }
    Ok(pieces)
}

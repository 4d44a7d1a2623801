//! Content identities for every block of the old and new partitions.
//!
//! Two blocks share an identity exactly when the mapper considers their
//! contents equal. Identity [`ZERO_BLOCK_ID`] is reserved for blocks made
//! only of zero bytes.

use rustc_hash::FxHashMap;
use xxhash_rust::xxh3::xxh3_128;

use crate::error::DeltaResult;
use crate::partition::PartitionReader;

/// Identity of an all-zero block.
pub const ZERO_BLOCK_ID: u64 = 0;

/// Blocks read per batch by [`ContentHashBlockMapper`].
pub const DEFAULT_BATCH_BLOCKS: u64 = 256;

/// One identity per block, indexed by block number.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BlockIdentities {
    /// Old partition.
    pub old: Vec<u64>,
    /// New partition.
    pub new: Vec<u64>,
}

/// Assigns content identities to partition blocks.
pub trait BlockIdentityMapper: Send + Sync {
    /// Maps every block of both partitions.
    fn map_blocks(&self, old: &PartitionReader, new: &PartitionReader) -> DeltaResult<BlockIdentities>;
}

/// Hashes block contents with xxh3-128 and interns the hashes into small
/// identities. The old partition is interned first, so equal content in old
/// and new partitions maps to the same identity.
#[derive(Clone, Copy, Debug)]
pub struct ContentHashBlockMapper {
    batch_blocks: u64,
}

impl ContentHashBlockMapper {
    /// Creates a mapper reading `batch_blocks` blocks per read.
    #[must_use]
    pub fn with_batch_blocks(batch_blocks: u64) -> Self {
        Self {
            batch_blocks: batch_blocks.max(1),
        }
    }
}

impl Default for ContentHashBlockMapper {
    fn default() -> Self {
        Self::with_batch_blocks(DEFAULT_BATCH_BLOCKS)
    }
}

#[derive(Default)]
struct Interner {
    ids: FxHashMap<u128, u64>,
}

impl Interner {
    fn identify(&mut self, block: &[u8]) -> u64 {
        if block.iter().all(|&byte| byte == 0) {
            return ZERO_BLOCK_ID;
        }
        let next = self.ids.len() as u64 + 1;
        *self.ids.entry(xxh3_128(block)).or_insert(next)
    }
}

impl ContentHashBlockMapper {
    fn map_partition(&self, reader: &PartitionReader, interner: &mut Interner) -> DeltaResult<Vec<u64>> {
        let block_size = reader.block_size() as usize;
        let total = reader.block_count();
        let mut ids = Vec::with_capacity(total as usize);
        let mut start = 0;
        while start < total {
            let count = self.batch_blocks.min(total - start);
            let data = reader.read_blocks(start, count)?;
            ids.extend(data.chunks_exact(block_size).map(|block| interner.identify(block)));
            start += count;
        }
        Ok(ids)
    }
}

impl BlockIdentityMapper for ContentHashBlockMapper {
    fn map_blocks(&self, old: &PartitionReader, new: &PartitionReader) -> DeltaResult<BlockIdentities> {
        let mut interner = Interner::default();
        let old = self.map_partition(old, &mut interner)?;
        let new = self.map_partition(new, &mut interner)?;
        Ok(BlockIdentities { old, new })
    }
}

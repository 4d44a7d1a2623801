//! Splitting multi-extent operations.

use extents::extents_sublist;

use crate::operation::{AnnotatedOperation, Operation, OperationKind};

/// Rewrites an operation into one or more operations with the same effect.
pub trait OperationFragmenter: Send + Sync {
    /// Fragments `op`, whose blocks are `block_size` bytes.
    fn fragment(&self, op: AnnotatedOperation, block_size: u64) -> Vec<AnnotatedOperation>;
}

/// Leaves every operation untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoFragmentation;

impl OperationFragmenter for NoFragmentation {
    fn fragment(&self, op: AnnotatedOperation, _block_size: u64) -> Vec<AnnotatedOperation> {
        vec![op]
    }
}

/// Splits ZERO, DISCARD, SOURCE_COPY and uncompressed REPLACE operations
/// into one operation per destination extent. Compressed and diff payloads
/// cannot be cut and stay whole.
#[derive(Clone, Copy, Debug, Default)]
pub struct SplitByExtent;

impl OperationFragmenter for SplitByExtent {
    fn fragment(&self, mut op: AnnotatedOperation, block_size: u64) -> Vec<AnnotatedOperation> {
        let kind = op.operation.kind;
        let splittable = kind.is_dataless()
            || (kind == OperationKind::Replace && op.operation.data.is_none());
        if !splittable || op.operation.dst_extents.len() <= 1 {
            return vec![op];
        }

        let payload = op.take_payload();
        let mut fragments = Vec::with_capacity(op.operation.dst_extents.len());
        let mut block_offset = 0u64;
        for extent in &op.operation.dst_extents {
            let mut operation = Operation::new(kind, vec![*extent]);
            if kind == OperationKind::SourceCopy {
                operation.src_extents =
                    extents_sublist(&op.operation.src_extents, block_offset, extent.num_blocks);
            }
            let mut fragment = AnnotatedOperation::new(op.name.clone(), operation);
            if kind == OperationKind::Replace {
                let start = (block_offset * block_size) as usize;
                let end = ((block_offset + extent.num_blocks) * block_size) as usize;
                fragment = fragment.with_payload(payload.get(start..end).unwrap_or_default().to_vec());
            }
            fragments.push(fragment);
            block_offset += extent.num_blocks;
        }
        fragments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extents::Extent;

    #[test]
    fn pass_through_keeps_operation() {
        let op = AnnotatedOperation::new(
            "a",
            Operation::new(OperationKind::Zero, vec![Extent::new(0, 1), Extent::new(4, 1)]),
        );
        assert_eq!(NoFragmentation.fragment(op.clone(), 16), vec![op]);
    }

    #[test]
    fn source_copy_splits_source_alongside() {
        let op = AnnotatedOperation::new(
            "moved",
            Operation::new(
                OperationKind::SourceCopy,
                vec![Extent::new(10, 2), Extent::new(20, 3)],
            )
            .with_src_extents(vec![Extent::new(0, 4), Extent::new(8, 1)]),
        );
        let fragments = SplitByExtent.fragment(op, 16);
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].operation.dst_extents, vec![Extent::new(10, 2)]);
        assert_eq!(fragments[0].operation.src_extents, vec![Extent::new(0, 2)]);
        assert_eq!(fragments[1].operation.dst_extents, vec![Extent::new(20, 3)]);
        assert_eq!(
            fragments[1].operation.src_extents,
            vec![Extent::new(2, 2), Extent::new(8, 1)]
        );
    }

    #[test]
    fn replace_payload_is_split_by_block() {
        let payload: Vec<u8> = (0..48).collect();
        let op = AnnotatedOperation::new(
            "f",
            Operation::new(OperationKind::Replace, vec![Extent::new(5, 1), Extent::new(1, 2)]),
        )
        .with_payload(payload);
        let fragments = SplitByExtent.fragment(op, 16);
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].pending_payload(), &(0..16).collect::<Vec<u8>>()[..]);
        assert_eq!(fragments[1].pending_payload(), &(16..48).collect::<Vec<u8>>()[..]);
    }

    #[test]
    fn compressed_and_diff_operations_stay_whole() {
        for kind in [OperationKind::ReplaceXz, OperationKind::ByteDiff] {
            let op = AnnotatedOperation::new(
                "f",
                Operation::new(kind, vec![Extent::new(0, 1), Extent::new(3, 1)]),
            )
            .with_payload(vec![1, 2, 3]);
            assert_eq!(SplitByExtent.fragment(op.clone(), 16), vec![op]);
        }
    }
}

//! Structural checks on an emitted operation list.

use extents::{Extent, ExtentRanges};

use crate::error::StructuralError;
use crate::operation::{AnnotatedOperation, OperationKind};

/// Checks operations before they leave the engine.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct OperationValidator {
    increasing: bool,
    decreasing: bool,
}

impl OperationValidator {
    /// A validator without ordering requirements.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            increasing: false,
            decreasing: false,
        }
    }

    /// Requires destination extents to increase across the list.
    #[must_use]
    pub const fn require_increasing(mut self) -> Self {
        self.increasing = true;
        self
    }

    /// Requires destination extents to decrease across the list.
    #[must_use]
    pub const fn require_decreasing(mut self) -> Self {
        self.decreasing = true;
        self
    }

    /// Checks destinations, source presence and the requested order.
    pub fn validate(&self, ops: &[AnnotatedOperation]) -> Result<(), StructuralError> {
        if self.increasing && self.decreasing {
            return Err(StructuralError::ConflictingOrder);
        }

        let mut previous: Option<Extent> = None;
        for op in ops {
            let operation = &op.operation;
            if operation.dst_extents.iter().all(|extent| extent.is_empty()) {
                return Err(StructuralError::EmptyDestination {
                    name: op.name.clone(),
                });
            }
            let reads = operation.kind.reads_source();
            if reads && operation.src_extents.is_empty() {
                return Err(StructuralError::SourceExtents {
                    name: op.name.clone(),
                    kind: operation.kind,
                    detail: "has no source extents",
                });
            }
            if !reads && !operation.src_extents.is_empty() {
                return Err(StructuralError::SourceExtents {
                    name: op.name.clone(),
                    kind: operation.kind,
                    detail: "must not carry source extents",
                });
            }
            if operation.kind == OperationKind::SourceCopy
                && operation.src_block_count() != operation.dst_block_count()
            {
                return Err(StructuralError::SourceExtents {
                    name: op.name.clone(),
                    kind: operation.kind,
                    detail: "copies a different number of blocks than it writes",
                });
            }
            if operation.kind.is_dataless() && (operation.data.is_some() || op.has_pending_payload()) {
                return Err(StructuralError::UnexpectedData {
                    name: op.name.clone(),
                    kind: operation.kind,
                });
            }

            for &extent in operation.dst_extents.iter().filter(|extent| !extent.is_empty()) {
                if let Some(last) = previous {
                    if self.increasing && extent.start_block < last.end_block() {
                        return Err(StructuralError::OutOfOrder {
                            name: op.name.clone(),
                            order: "increasing",
                            extent,
                        });
                    }
                    if self.decreasing && extent.end_block() > last.start_block {
                        return Err(StructuralError::OutOfOrder {
                            name: op.name.clone(),
                            order: "decreasing",
                            extent,
                        });
                    }
                }
                previous = Some(extent);
            }
        }
        Ok(())
    }
}

/// Checks that the destinations of `ops` cover `expected` exactly once.
pub fn check_tiling(ops: &[AnnotatedOperation], expected: &ExtentRanges) -> Result<(), StructuralError> {
    let mut written = ExtentRanges::new();
    for op in ops {
        for &extent in &op.operation.dst_extents {
            if written.overlaps_extent(extent) {
                return Err(StructuralError::Overlap { extent });
            }
            if !expected.contains_extent(extent) {
                return Err(StructuralError::Unexpected { extent });
            }
            written.add_extent(extent);
        }
    }

    let mut missing = expected.clone();
    missing.subtract_ranges(&written);
    match missing.extents().first() {
        Some(&extent) => Err(StructuralError::Gap { extent }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{DataLocator, Operation};

    fn op(kind: OperationKind, dst: &[Extent], src: &[Extent]) -> AnnotatedOperation {
        AnnotatedOperation::new(
            "f",
            Operation::new(kind, dst.to_vec()).with_src_extents(src.to_vec()),
        )
    }

    fn range(start: u64, blocks: u64) -> ExtentRanges {
        ExtentRanges::from_extents(&[Extent::new(start, blocks)])
    }

    #[test]
    fn empty_destination_is_rejected() {
        let ops = [op(OperationKind::Replace, &[], &[])];
        assert!(matches!(
            OperationValidator::new().validate(&ops),
            Err(StructuralError::EmptyDestination { .. })
        ));
    }

    #[test]
    fn source_presence_follows_kind() {
        let copy = [op(OperationKind::SourceCopy, &[Extent::new(0, 1)], &[])];
        assert!(OperationValidator::new().validate(&copy).is_err());
        let zero = [op(OperationKind::Zero, &[Extent::new(0, 1)], &[Extent::new(0, 1)])];
        assert!(OperationValidator::new().validate(&zero).is_err());
        let ok = [op(OperationKind::ByteDiff, &[Extent::new(0, 1)], &[Extent::new(3, 1)])];
        assert!(OperationValidator::new().validate(&ok).is_ok());
    }

    #[test]
    fn source_copy_must_read_as_many_blocks_as_it_writes() {
        let short = [op(
            OperationKind::SourceCopy,
            &[Extent::new(0, 3)],
            &[Extent::new(5, 2)],
        )];
        assert!(matches!(
            OperationValidator::new().validate(&short),
            Err(StructuralError::SourceExtents { .. })
        ));
        let split = [op(
            OperationKind::SourceCopy,
            &[Extent::new(0, 3)],
            &[Extent::new(5, 2), Extent::new(9, 1)],
        )];
        assert!(OperationValidator::new().validate(&split).is_ok());
    }

    #[test]
    fn dataless_kinds_carry_no_data() {
        let mut zero = op(OperationKind::Zero, &[Extent::new(0, 1)], &[]);
        zero.operation.data = Some(DataLocator {
            offset: 0,
            length: 4,
        });
        assert!(matches!(
            OperationValidator::new().validate(&[zero]),
            Err(StructuralError::UnexpectedData { .. })
        ));
        let pending = op(OperationKind::SourceCopy, &[Extent::new(0, 1)], &[Extent::new(1, 1)])
            .with_payload(vec![1]);
        assert!(OperationValidator::new().validate(&[pending]).is_err());
    }

    #[test]
    fn order_requirements() {
        let ascending = [
            op(OperationKind::Zero, &[Extent::new(0, 2)], &[]),
            op(OperationKind::Zero, &[Extent::new(2, 1)], &[]),
        ];
        let descending = [
            op(OperationKind::Zero, &[Extent::new(2, 1)], &[]),
            op(OperationKind::Zero, &[Extent::new(0, 2)], &[]),
        ];
        let increasing = OperationValidator::new().require_increasing();
        let decreasing = OperationValidator::new().require_decreasing();
        assert!(increasing.validate(&ascending).is_ok());
        assert!(increasing.validate(&descending).is_err());
        assert!(decreasing.validate(&descending).is_ok());
        assert!(decreasing.validate(&ascending).is_err());
        assert_eq!(
            increasing.require_decreasing().validate(&ascending),
            Err(StructuralError::ConflictingOrder)
        );
    }

    #[test]
    fn tiling_detects_gap_overlap_and_strays() {
        let ops = [
            op(OperationKind::Zero, &[Extent::new(0, 2)], &[]),
            op(OperationKind::Zero, &[Extent::new(3, 1)], &[]),
        ];
        assert_eq!(
            check_tiling(&ops, &range(0, 4)),
            Err(StructuralError::Gap {
                extent: Extent::new(2, 1)
            })
        );

        let overlapping = [
            op(OperationKind::Zero, &[Extent::new(0, 2)], &[]),
            op(OperationKind::Zero, &[Extent::new(1, 2)], &[]),
        ];
        assert_eq!(
            check_tiling(&overlapping, &range(0, 3)),
            Err(StructuralError::Overlap {
                extent: Extent::new(1, 2)
            })
        );

        let stray = [op(OperationKind::Zero, &[Extent::new(0, 5)], &[])];
        assert!(matches!(
            check_tiling(&stray, &range(0, 4)),
            Err(StructuralError::Unexpected { .. })
        ));
    }

    #[test]
    fn exact_tiling_passes() {
        let ops = [
            op(OperationKind::Zero, &[Extent::new(2, 2)], &[]),
            op(OperationKind::Replace, &[Extent::new(0, 2)], &[]),
        ];
        assert_eq!(check_tiling(&ops, &range(0, 4)), Ok(()));
    }
}

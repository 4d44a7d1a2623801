//! Per-run counters and the statistics returned with a partition delta.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::operation::{AnnotatedOperation, OperationKind};

/// Counters shared by every worker of one run.
#[derive(Debug, Default)]
pub struct RunCounters {
    candidates_evaluated: AtomicU64,
    diffs_accepted: AtomicU64,
    codec_failures: AtomicU64,
    bytes_read: AtomicU64,
}

impl RunCounters {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one diff candidate that produced a patch.
    pub fn record_candidate(&self) {
        self.candidates_evaluated.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a window whose chosen operation reads source blocks.
    pub fn record_diff_accepted(&self) {
        self.diffs_accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a backend failure that disqualified a candidate.
    pub fn record_codec_failure(&self) {
        self.codec_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records bytes read from partition images.
    pub fn record_bytes_read(&self, bytes: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Diff candidates evaluated so far.
    #[must_use]
    pub fn candidates_evaluated(&self) -> u64 {
        self.candidates_evaluated.load(Ordering::Relaxed)
    }

    /// Windows that ended up reading source blocks.
    #[must_use]
    pub fn diffs_accepted(&self) -> u64 {
        self.diffs_accepted.load(Ordering::Relaxed)
    }

    /// Backend failures so far.
    #[must_use]
    pub fn codec_failures(&self) -> u64 {
        self.codec_failures.load(Ordering::Relaxed)
    }

    /// Bytes read so far.
    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }
}

/// Summary of a finished partition run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunStats {
    /// Blocks in the old partition.
    pub old_blocks: u64,
    /// Blocks in the new partition.
    pub new_blocks: u64,
    /// New blocks emitted as ZERO by the zero/moved pass.
    pub zero_blocks: u64,
    /// New blocks matched to old blocks by the zero/moved pass.
    pub moved_blocks: u64,
    /// File jobs dispatched, including the non-file-data job.
    pub jobs: usize,
    /// Operations emitted.
    pub operations: usize,
    /// Operations per kind.
    pub operations_by_kind: BTreeMap<OperationKind, usize>,
    /// Inline bytes written to the blob by this run.
    pub blob_bytes: u64,
    /// Diff candidates evaluated.
    pub candidates_evaluated: u64,
    /// Windows whose operation reads source blocks.
    pub diffs_accepted: u64,
    /// Backend failures that disqualified a candidate.
    pub codec_failures: u64,
    /// Bytes read from both images.
    pub bytes_read: u64,
}

impl RunStats {
    /// Fills the per-operation fields from the final operation list.
    pub fn record_operations(&mut self, ops: &[AnnotatedOperation]) {
        self.operations = ops.len();
        self.operations_by_kind.clear();
        for op in ops {
            *self.operations_by_kind.entry(op.operation.kind).or_default() += 1;
        }
        self.blob_bytes = ops
            .iter()
            .filter_map(|op| op.operation.data)
            .map(|locator| locator.length)
            .sum();
    }

    /// Copies the shared counters.
    pub fn record_counters(&mut self, counters: &RunCounters) {
        self.candidates_evaluated = counters.candidates_evaluated();
        self.diffs_accepted = counters.diffs_accepted();
        self.codec_failures = counters.codec_failures();
        self.bytes_read = counters.bytes_read();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{DataLocator, Operation};
    use extents::Extent;

    #[test]
    fn counters_accumulate() {
        let counters = RunCounters::new();
        counters.record_candidate();
        counters.record_candidate();
        counters.record_codec_failure();
        counters.record_bytes_read(4096);
        let mut stats = RunStats::default();
        stats.record_counters(&counters);
        assert_eq!(stats.candidates_evaluated, 2);
        assert_eq!(stats.codec_failures, 1);
        assert_eq!(stats.bytes_read, 4096);
        assert_eq!(stats.diffs_accepted, 0);
    }

    #[test]
    fn operations_are_tallied_by_kind() {
        let mut replace = Operation::new(OperationKind::Replace, vec![Extent::new(0, 1)]);
        replace.data = Some(DataLocator { offset: 0, length: 10 });
        let ops = vec![
            AnnotatedOperation::new("a", replace),
            AnnotatedOperation::new("b", Operation::new(OperationKind::Zero, vec![Extent::new(1, 1)])),
            AnnotatedOperation::new("c", Operation::new(OperationKind::Zero, vec![Extent::new(2, 1)])),
        ];
        let mut stats = RunStats::default();
        stats.record_operations(&ops);
        assert_eq!(stats.operations, 3);
        assert_eq!(stats.operations_by_kind[&OperationKind::Zero], 2);
        assert_eq!(stats.blob_bytes, 10);
    }
}

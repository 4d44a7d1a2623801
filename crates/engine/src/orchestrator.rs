//! Top-level partition delta generation.
//!
//! # Overview
//!
//! [`PartitionDeltaOrchestrator::delta_partition`] turns an old and a new
//! partition image into the ordered operation list that rebuilds the new
//! image from the old one.
//!
//! # Design
//!
//! A run goes through these stages:
//!
//! 1. Verity hash-tree and FEC blocks are claimed without operations.
//! 2. The zero/moved pass claims zero and relocated blocks, unless the
//!    container-aware diff is active and a new file carries a container.
//! 3. Every new file with unclaimed blocks becomes a [`FileJob`] diffed
//!    against its baseline; blocks owned by no file form one
//!    `<non-file-data>` job.
//! 4. Jobs run on the [`JobScheduler`]; results are merged in enumeration
//!    order and pending payloads are written to the blob in that order.
//! 5. The merged list is validated to tile the new partition exactly once.
//!
//! # Invariants
//!
//! - Every new block outside the verity extents is written by exactly one
//!   operation.
//! - Any job failure fails the whole run; no partial list is returned.
//! - With [`BlobWriteMode::InOrder`] the operation list and blob contents
//!   depend only on the inputs.

use std::time::Instant;

use codecs::CodecSet;
use extents::{Extent, ExtentRanges, filter_extent_ranges};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::blob::{BlobSink, commit_payloads};
use crate::block_identity::{BlockIdentityMapper, ContentHashBlockMapper};
use crate::config::{BlobWriteMode, PayloadGenerationConfig};
use crate::debug_delta::{
    trace_job_complete, trace_job_dispatch, trace_job_failed, trace_partition_complete,
    trace_partition_start, trace_similar_match, trace_zero_moved,
};
use crate::error::{DeltaError, DeltaResult};
use crate::file_delta::{FileJob, FileSide, JobContext, process_file};
use crate::fragment::{OperationFragmenter, SplitByExtent};
use crate::operation::{AnnotatedOperation, OperationKind};
use crate::partition::{NON_FILE_DATA_NAME, PartitionConfig, PartitionReader};
use crate::pipeline::JobScheduler;
use crate::similar::{BaselineMatch, SimilarFileMatcher};
use crate::stats::{RunCounters, RunStats};
use crate::validate::{OperationValidator, check_tiling};
use crate::zero_moved::{ZeroMovedOutcome, zero_moved_pass};

/// Result of one partition run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PartitionDelta {
    /// Operations in apply order; every payload has been written.
    pub operations: Vec<AnnotatedOperation>,
    /// Run statistics.
    pub stats: RunStats,
}

/// Generates partition deltas with one configuration and set of backends.
pub struct PartitionDeltaOrchestrator {
    config: PayloadGenerationConfig,
    codecs: CodecSet,
    mapper: Box<dyn BlockIdentityMapper>,
    fragmenter: Box<dyn OperationFragmenter>,
}

impl PartitionDeltaOrchestrator {
    /// Creates an orchestrator with the default backends, content-hash block
    /// mapping and per-extent fragmentation.
    #[must_use]
    pub fn new(config: PayloadGenerationConfig) -> Self {
        Self {
            config,
            codecs: CodecSet::default(),
            mapper: Box::new(ContentHashBlockMapper::default()),
            fragmenter: Box::new(SplitByExtent),
        }
    }

    /// Replaces the diff backends.
    #[must_use]
    pub fn with_codecs(mut self, codecs: CodecSet) -> Self {
        self.codecs = codecs;
        self
    }

    /// Replaces the block identity mapper.
    #[must_use]
    pub fn with_block_mapper<M: BlockIdentityMapper + 'static>(mut self, mapper: M) -> Self {
        self.mapper = Box::new(mapper);
        self
    }

    /// Replaces the fragmentation collaborator.
    #[must_use]
    pub fn with_fragmenter<F: OperationFragmenter + 'static>(mut self, fragmenter: F) -> Self {
        self.fragmenter = Box::new(fragmenter);
        self
    }

    /// Run configuration.
    #[must_use]
    pub const fn config(&self) -> &PayloadGenerationConfig {
        &self.config
    }

    /// Diff backends.
    #[must_use]
    pub const fn codecs(&self) -> &CodecSet {
        &self.codecs
    }

    /// Computes the operations rebuilding `new` from `old`.
    ///
    /// Inline data is appended to `sink`; the returned operations locate it
    /// through their data locators.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration, unreadable or inconsistent images,
    /// the first failing job in enumeration order, blob write failures and
    /// structurally invalid output.
    #[cfg_attr(
        feature = "tracing",
        instrument(skip_all, fields(partition = %new.name), name = "delta_partition")
    )]
    pub fn delta_partition(
        &self,
        old: &PartitionConfig,
        new: &PartitionConfig,
        sink: &dyn BlobSink,
    ) -> DeltaResult<PartitionDelta> {
        let started = Instant::now();
        let config = &self.config;
        let block_size = config.block_size;
        config.validate()?;
        old.validate(block_size)?;
        new.validate(block_size)?;
        old.check_extents(block_size)?;
        new.check_extents(block_size)?;

        let old_reader = PartitionReader::open(old, block_size)?;
        let new_reader = PartitionReader::open(new, block_size)?;
        let old_blocks = old_reader.block_count();
        let new_blocks = new_reader.block_count();
        trace_partition_start(&new.name, old_blocks, new_blocks, new.files.len());

        let counters = RunCounters::new();
        let ctx = JobContext {
            config,
            codecs: &self.codecs,
            old: &old_reader,
            new: &new_reader,
            counters: &counters,
            fragmenter: self.fragmenter.as_ref(),
            streaming_sink: match config.blob_write_mode {
                BlobWriteMode::InOrder => None,
                BlobWriteMode::Streaming => Some(sink),
            },
        };

        let mut old_visited = ExtentRanges::new();
        let mut new_visited = ExtentRanges::new();
        let mut expected = ExtentRanges::new();
        expected.add_range(0, new_blocks);
        if let Some(verity) = &new.verity {
            let skipped = verity.extents();
            new_visited.add_extents(&skipped);
            expected.subtract_extents(&skipped);
        }

        let zero_moved = if self.skips_zero_moved_pass(new) {
            ZeroMovedOutcome::default()
        } else {
            let identities = self.mapper.map_blocks(&old_reader, &new_reader)?;
            if identities.old.len() as u64 != old_blocks || identities.new.len() as u64 != new_blocks {
                return Err(DeltaError::mismatch(
                    &new.name,
                    format!(
                        "block mapper returned {}/{} identities for {old_blocks}/{new_blocks} blocks",
                        identities.old.len(),
                        identities.new.len()
                    ),
                ));
            }
            let outcome = zero_moved_pass(&identities, &mut old_visited, &mut new_visited, &ctx)?;
            trace_zero_moved(outcome.zero_blocks, outcome.moved_blocks, outcome.operation_count());
            outcome
        };

        let jobs = self.plan_jobs(old, new, &mut old_visited, &mut new_visited, old_blocks, new_blocks);

        let scheduler = JobScheduler::new(config.effective_worker_threads());
        let results = scheduler.run(&jobs, FileJob::weight, |index, job| {
            trace_job_dispatch(&job.name, index, job.weight());
            let job_started = Instant::now();
            let result = process_file(job, &ctx);
            match &result {
                Ok(ops) => trace_job_complete(&job.name, ops.len(), job_started.elapsed()),
                Err(error) => trace_job_failed(&job.name, error),
            }
            result
        })?;

        let ZeroMovedOutcome {
            zero_ops,
            copy_ops,
            zero_blocks,
            moved_blocks,
        } = zero_moved;
        let mut operations: Vec<AnnotatedOperation> = zero_ops;
        operations.extend(copy_ops);
        for (job, result) in jobs.iter().zip(results) {
            let ops = result.map_err(|error| DeltaError::job(&job.name, error))?;
            operations.extend(ops);
        }

        commit_payloads(&mut operations, sink)?;
        OperationValidator::new().validate(&operations)?;
        check_tiling(&operations, &expected)?;

        let mut stats = RunStats {
            old_blocks,
            new_blocks,
            zero_blocks,
            moved_blocks,
            jobs: jobs.len(),
            ..RunStats::default()
        };
        stats.record_operations(&operations);
        stats.record_counters(&counters);
        trace_partition_complete(&new.name, stats.operations, stats.blob_bytes, started.elapsed());

        Ok(PartitionDelta { operations, stats })
    }

    fn skips_zero_moved_pass(&self, new: &PartitionConfig) -> bool {
        self.config
            .enabled_operations
            .allows(OperationKind::ContainerAwareDiff)
            && self.codecs.container_differ().is_some()
            && new.files.iter().any(|file| file.container.is_some())
    }

    /// Builds the file jobs in enumeration order, then the non-file-data job.
    fn plan_jobs(
        &self,
        old: &PartitionConfig,
        new: &PartitionConfig,
        old_visited: &mut ExtentRanges,
        new_visited: &mut ExtentRanges,
        old_blocks: u64,
        new_blocks: u64,
    ) -> Vec<FileJob> {
        let matcher = SimilarFileMatcher::new(&old.files);
        let mut jobs = Vec::new();

        for file in &new.files {
            let mut extents: Vec<Extent> = Vec::new();
            for &extent in &file.extents {
                for piece in filter_extent_ranges(&[extent], new_visited) {
                    new_visited.add_extent(piece);
                    extents.push(piece);
                }
            }
            if extents.is_empty() {
                continue;
            }

            let baseline = match matcher.find(&file.name) {
                Some(found) => {
                    if let BaselineMatch::Similar(old_file, distance) = found {
                        trace_similar_match(&file.name, &old_file.name, distance);
                    }
                    let old_file = found.file();
                    old_visited.add_extents(&old_file.extents);
                    FileSide::from_file(old_file, old_file.extents.clone())
                }
                None => FileSide::default(),
            };
            jobs.push(FileJob {
                name: file.name.clone(),
                old: baseline,
                new: FileSide::from_file(file, extents),
                chunk: self.config.hard_chunk,
            });
        }

        let mut unclaimed = ExtentRanges::new();
        unclaimed.add_range(0, new_blocks);
        unclaimed.subtract_ranges(new_visited);
        if !unclaimed.is_empty() {
            new_visited.add_ranges(&unclaimed);
            let mut old_unclaimed = ExtentRanges::new();
            old_unclaimed.add_range(0, old_blocks);
            old_unclaimed.subtract_ranges(old_visited);
            jobs.push(FileJob {
                name: NON_FILE_DATA_NAME.to_owned(),
                old: FileSide::blocks(old_unclaimed.extents()),
                new: FileSide::blocks(unclaimed.extents()),
                chunk: self.config.soft_chunk,
            });
        }
        jobs
    }
}

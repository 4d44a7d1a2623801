//! Per-file delta jobs.
//!
//! A [`FileJob`] names the new blocks of one file and the old blocks of its
//! baseline. [`process_file`] cuts both into aligned windows, runs the
//! [`DiffEngine`] on each window and fragments the result.

use codecs::CodecSet;
use codecs::hints::{CompressedContainer, StreamRange, clip_streams};
use extents::{Extent, blocks_in_extents, extents_sublist};

use crate::best_diff::{DiffEngine, DiffInput, WindowHints};
use crate::blob::{BlobSink, commit_payloads};
use crate::config::{ChunkSize, PayloadGenerationConfig};
use crate::error::{DeltaResult, StructuralError};
use crate::fragment::OperationFragmenter;
use crate::operation::AnnotatedOperation;
use crate::partition::{PartitionFile, PartitionReader};
use crate::stats::RunCounters;

/// Blocks and format hints of one side of a job.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FileSide {
    /// Blocks in file order.
    pub extents: Vec<Extent>,
    /// Compressible sub-streams, relative to the first block.
    pub streams: Vec<StreamRange>,
    /// Container layout of the whole file.
    pub container: Option<CompressedContainer>,
}

impl FileSide {
    /// Side made of `extents` without hints.
    #[must_use]
    pub fn blocks(extents: Vec<Extent>) -> Self {
        Self {
            extents,
            ..Self::default()
        }
    }

    /// Side for `file` restricted to `extents`.
    ///
    /// Hints describe byte offsets of the complete file, so they are only
    /// kept when `extents` is the file's full block list.
    #[must_use]
    pub fn from_file(file: &PartitionFile, extents: Vec<Extent>) -> Self {
        let complete = extents == file.extents;
        Self {
            streams: if complete { file.streams.clone() } else { Vec::new() },
            container: if complete { file.container.clone() } else { None },
            extents,
        }
    }

    /// Number of blocks.
    #[must_use]
    pub fn block_count(&self) -> u64 {
        blocks_in_extents(&self.extents)
    }
}

/// Immutable description of the work for one new file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileJob {
    /// File name, used for operation names and suffix matching.
    pub name: String,
    /// Baseline blocks; empty when the file has no baseline.
    pub old: FileSide,
    /// Blocks to produce.
    pub new: FileSide,
    /// Window size.
    pub chunk: ChunkSize,
}

impl FileJob {
    /// Scheduling weight: number of new blocks.
    #[must_use]
    pub fn weight(&self) -> u64 {
        self.new.block_count()
    }
}

/// Shared, read-only state of a partition run.
#[derive(Clone, Copy)]
pub struct JobContext<'a> {
    /// Run configuration.
    pub config: &'a PayloadGenerationConfig,
    /// Diff backends.
    pub codecs: &'a CodecSet,
    /// Old partition image.
    pub old: &'a PartitionReader,
    /// New partition image.
    pub new: &'a PartitionReader,
    /// Shared counters.
    pub counters: &'a RunCounters,
    /// Fragmentation collaborator.
    pub fragmenter: &'a dyn OperationFragmenter,
    /// Sink for jobs that write their payloads themselves.
    pub streaming_sink: Option<&'a dyn BlobSink>,
}

/// Produces the operations of `job`.
///
/// With a streaming sink the payloads are written before returning;
/// otherwise they stay pending on the returned operations.
pub fn process_file(job: &FileJob, ctx: &JobContext<'_>) -> DeltaResult<Vec<AnnotatedOperation>> {
    let block_size = ctx.config.block_size;
    let total = job.new.block_count();
    let window = job.chunk.window(total);
    if window == 0 && total > 0 {
        return Err(StructuralError::ZeroChunk.into());
    }
    let window = window.min(total).max(1);
    let chunked = total > window;
    let engine = DiffEngine::new(ctx.config, ctx.codecs, ctx.counters);
    let whole_old = job.old.block_count();

    let mut ops = Vec::new();
    let mut offset = 0u64;
    while offset < total {
        let (byte_start, byte_len) = offset
            .checked_mul(block_size)
            .zip(window.checked_mul(block_size))
            .ok_or_else(|| StructuralError::WindowOverflow {
                name: job.name.clone(),
                offset,
                blocks: window,
            })?;
        let new_extents = extents_sublist(&job.new.extents, offset, window);
        let old_extents = extents_sublist(&job.old.extents, offset, window);
        let new_data = ctx.new.read_extents(&new_extents)?;
        let old_data = ctx.old.read_extents(&old_extents)?;
        ctx.counters
            .record_bytes_read((new_data.len() + old_data.len()) as u64);

        let old_streams = clip_streams(&job.old.streams, byte_start, byte_len);
        let new_streams = clip_streams(&job.new.streams, byte_start, byte_len);
        let whole_file = offset == 0 && window >= total && window >= whole_old;

        let name = if chunked {
            format!("{}:{offset}", job.name)
        } else {
            job.name.clone()
        };
        let input = DiffInput {
            name: &name,
            file_name: &job.name,
            old_data: &old_data,
            new_data: &new_data,
            old_extents: &old_extents,
            new_extents: &new_extents,
            old_hints: WindowHints {
                streams: &old_streams,
                container: job.old.container.as_ref().filter(|_| whole_file),
            },
            new_hints: WindowHints {
                streams: &new_streams,
                container: job.new.container.as_ref().filter(|_| whole_file),
            },
        };
        let outcome = engine.generate(&input);
        let op = AnnotatedOperation::new(name, outcome.operation)
            .with_payload(outcome.payload)
            .with_xor_hints(outcome.xor_hints);
        ops.extend(ctx.fragmenter.fragment(op, block_size));
        offset += window;
    }

    if let Some(sink) = ctx.streaming_sink {
        commit_payloads(&mut ops, sink)?;
    }
    Ok(ops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobSink;
    use crate::config::OperationKindSet;
    use crate::fragment::NoFragmentation;
    use crate::operation::OperationKind;
    use crate::partition::PartitionConfig;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BS: u64 = 16;

    struct Images {
        _old: NamedTempFile,
        _new: NamedTempFile,
        old: PartitionReader,
        new: PartitionReader,
    }

    fn image(bytes: &[u8]) -> (NamedTempFile, PartitionReader) {
        let mut file = NamedTempFile::new().expect("temp image");
        file.write_all(bytes).expect("write");
        file.flush().expect("flush");
        let config = PartitionConfig::new("vendor").with_image(file.path(), bytes.len() as u64);
        let reader = PartitionReader::open(&config, BS).expect("open");
        (file, reader)
    }

    fn images(old: &[u8], new: &[u8]) -> Images {
        let (old_file, old) = image(old);
        let (new_file, new) = image(new);
        Images {
            _old: old_file,
            _new: new_file,
            old,
            new,
        }
    }

    fn replace_only() -> PayloadGenerationConfig {
        PayloadGenerationConfig::default()
            .with_block_size(BS)
            .with_enabled_operations(OperationKindSet::REPLACE | OperationKindSet::SOURCE_COPY)
            .with_compressors(Vec::new())
    }

    fn job(old: Vec<Extent>, new: Vec<Extent>, chunk: ChunkSize) -> FileJob {
        FileJob {
            name: "bin/tool".to_owned(),
            old: FileSide::blocks(old),
            new: FileSide::blocks(new),
            chunk,
        }
    }

    fn patterned(blocks: u8) -> Vec<u8> {
        (0..blocks)
            .flat_map(|block| (0..BS as u8).map(move |i| block.wrapping_mul(31) ^ i ^ 0x5a))
            .collect()
    }

    #[test]
    fn chunks_are_named_by_block_offset() {
        let data = patterned(5);
        let images = images(&data, &data);
        let config = replace_only();
        let codecs = CodecSet::none();
        let counters = RunCounters::new();
        let ctx = JobContext {
            config: &config,
            codecs: &codecs,
            old: &images.old,
            new: &images.new,
            counters: &counters,
            fragmenter: &NoFragmentation,
            streaming_sink: None,
        };
        let job = job(
            vec![Extent::new(0, 5)],
            vec![Extent::new(0, 5)],
            ChunkSize::Blocks(2),
        );
        let ops = process_file(&job, &ctx).expect("process");
        let names: Vec<_> = ops.iter().map(|op| op.name.as_str()).collect();
        assert_eq!(names, ["bin/tool:0", "bin/tool:2", "bin/tool:4"]);
        assert!(ops
            .iter()
            .all(|op| op.operation.kind == OperationKind::SourceCopy));
        assert_eq!(ops[2].operation.src_extents, vec![Extent::new(4, 1)]);
        assert_eq!(counters.bytes_read(), 2 * 5 * BS);
    }

    #[test]
    fn short_baseline_leaves_later_windows_without_source() {
        let data = patterned(4);
        let images = images(&data[..2 * BS as usize], &data);
        let config = replace_only();
        let codecs = CodecSet::none();
        let counters = RunCounters::new();
        let ctx = JobContext {
            config: &config,
            codecs: &codecs,
            old: &images.old,
            new: &images.new,
            counters: &counters,
            fragmenter: &NoFragmentation,
            streaming_sink: None,
        };
        let job = job(
            vec![Extent::new(0, 2)],
            vec![Extent::new(0, 4)],
            ChunkSize::Blocks(2),
        );
        let ops = process_file(&job, &ctx).expect("process");
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].operation.kind, OperationKind::SourceCopy);
        assert_eq!(ops[1].operation.kind, OperationKind::Replace);
        assert!(ops[1].operation.src_extents.is_empty());
        assert_eq!(ops[1].pending_payload(), &data[2 * BS as usize..]);
    }

    #[test]
    fn streaming_sink_receives_payloads_in_the_worker() {
        let new = patterned(2);
        let images = images(&[], &new);
        let config = replace_only();
        let codecs = CodecSet::none();
        let counters = RunCounters::new();
        let sink = MemoryBlobSink::new();
        let ctx = JobContext {
            config: &config,
            codecs: &codecs,
            old: &images.old,
            new: &images.new,
            counters: &counters,
            fragmenter: &NoFragmentation,
            streaming_sink: Some(&sink),
        };
        let ops = process_file(&job(Vec::new(), vec![Extent::new(0, 2)], ChunkSize::WholeFile), &ctx)
            .expect("process");
        assert_eq!(ops.len(), 1);
        assert!(!ops[0].has_pending_payload());
        let data = ops[0].operation.data.expect("locator");
        assert_eq!((data.offset, data.length), (0, new.len() as u64));
        assert_eq!(sink.contents(), new);
    }

    #[test]
    fn oversized_chunk_covers_the_file_in_one_window() {
        let data = patterned(2);
        let images = images(&data, &data);
        let config = replace_only();
        let codecs = CodecSet::none();
        let counters = RunCounters::new();
        let ctx = JobContext {
            config: &config,
            codecs: &codecs,
            old: &images.old,
            new: &images.new,
            counters: &counters,
            fragmenter: &NoFragmentation,
            streaming_sink: None,
        };
        let job = job(
            vec![Extent::new(0, 2)],
            vec![Extent::new(0, 2)],
            ChunkSize::Blocks(u64::MAX),
        );
        let ops = process_file(&job, &ctx).expect("process");
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].name, "bin/tool");
        assert_eq!(ops[0].operation.dst_extents, vec![Extent::new(0, 2)]);
    }

    #[test]
    fn unaddressable_window_is_a_structural_error() {
        let images = images(&[], &[]);
        let config = replace_only();
        let codecs = CodecSet::none();
        let counters = RunCounters::new();
        let ctx = JobContext {
            config: &config,
            codecs: &codecs,
            old: &images.old,
            new: &images.new,
            counters: &counters,
            fragmenter: &NoFragmentation,
            streaming_sink: None,
        };
        let job = job(Vec::new(), vec![Extent::new(0, u64::MAX / 4)], ChunkSize::WholeFile);
        let error = process_file(&job, &ctx).expect_err("overflow");
        assert!(matches!(
            error,
            crate::error::DeltaError::Structural(StructuralError::WindowOverflow { .. })
        ));
    }

    #[test]
    fn hints_are_dropped_for_partial_files() {
        let file = PartitionFile::new("a.apk", vec![Extent::new(0, 4)]).with_streams(vec![
            codecs::hints::StreamRange::new(codecs::hints::StreamKind::Deflate, 0, 8),
        ]);
        assert_eq!(FileSide::from_file(&file, file.extents.clone()).streams.len(), 1);
        assert!(FileSide::from_file(&file, vec![Extent::new(1, 3)]).streams.is_empty());
    }
}

//! Structured tracing for partition delta generation.
//!
//! Every event the engine emits goes through one function of this module.
//! With the `tracing` feature disabled each function is an inline no-op, so
//! call sites never need their own `cfg` guards.

use std::time::Duration;

use codecs::CodecError;

use crate::operation::OperationKind;

/// Target name for tracing events.
#[cfg_attr(not(feature = "tracing"), allow(dead_code))]
pub const DELTA_TARGET: &str = "payload_delta::delta";

/// Traces the start of a partition run.
#[cfg(feature = "tracing")]
#[inline]
pub fn trace_partition_start(partition: &str, old_blocks: u64, new_blocks: u64, files: usize) {
    tracing::info!(
        target: DELTA_TARGET,
        partition = %partition,
        old_blocks,
        new_blocks,
        files,
        "partition: starting"
    );
}

/// No-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub fn trace_partition_start(_partition: &str, _old_blocks: u64, _new_blocks: u64, _files: usize) {}

/// Traces the end of a partition run.
#[cfg(feature = "tracing")]
#[inline]
pub fn trace_partition_complete(partition: &str, operations: usize, blob_bytes: u64, elapsed: Duration) {
    tracing::info!(
        target: DELTA_TARGET,
        partition = %partition,
        operations,
        blob_bytes,
        elapsed_ms = elapsed.as_millis(),
        "partition: complete"
    );
}

/// No-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub fn trace_partition_complete(
    _partition: &str,
    _operations: usize,
    _blob_bytes: u64,
    _elapsed: Duration,
) {
}

/// Traces the outcome of the zero/moved-block pass.
#[cfg(feature = "tracing")]
#[inline]
pub fn trace_zero_moved(zero_blocks: u64, moved_blocks: u64, operations: usize) {
    tracing::debug!(
        target: DELTA_TARGET,
        zero_blocks,
        moved_blocks,
        operations,
        "zero/moved: complete"
    );
}

/// No-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub fn trace_zero_moved(_zero_blocks: u64, _moved_blocks: u64, _operations: usize) {}

/// Traces the baseline chosen for a new file without a same-named old file.
#[cfg(feature = "tracing")]
#[inline]
pub fn trace_similar_match(new_name: &str, old_name: &str, distance: usize) {
    tracing::debug!(
        target: DELTA_TARGET,
        new_name = %new_name,
        old_name = %old_name,
        distance,
        "baseline: similar name"
    );
}

/// No-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub fn trace_similar_match(_new_name: &str, _old_name: &str, _distance: usize) {}

/// Traces a job handed to the worker pool.
#[cfg(feature = "tracing")]
#[inline]
pub fn trace_job_dispatch(name: &str, index: usize, blocks: u64) {
    tracing::debug!(
        target: DELTA_TARGET,
        name = %name,
        index,
        blocks,
        "job: dispatched"
    );
}

/// No-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub fn trace_job_dispatch(_name: &str, _index: usize, _blocks: u64) {}

/// Traces a finished job.
#[cfg(feature = "tracing")]
#[inline]
pub fn trace_job_complete(name: &str, operations: usize, elapsed: Duration) {
    tracing::debug!(
        target: DELTA_TARGET,
        name = %name,
        operations,
        elapsed_ms = elapsed.as_millis(),
        "job: complete"
    );
}

/// No-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub fn trace_job_complete(_name: &str, _operations: usize, _elapsed: Duration) {}

/// Traces a job that failed.
#[cfg(feature = "tracing")]
#[inline]
pub fn trace_job_failed(name: &str, error: &dyn std::error::Error) {
    tracing::warn!(
        target: DELTA_TARGET,
        name = %name,
        error = %error,
        "job: failed"
    );
}

/// No-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub fn trace_job_failed(_name: &str, _error: &dyn std::error::Error) {}

/// Traces one evaluated candidate.
#[cfg(feature = "tracing")]
#[inline]
pub fn trace_candidate(name: &str, kind: OperationKind, size: usize, accepted: bool) {
    tracing::trace!(
        target: DELTA_TARGET,
        name = %name,
        kind = %kind,
        size,
        accepted,
        "candidate: evaluated"
    );
}

/// No-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub fn trace_candidate(_name: &str, _kind: OperationKind, _size: usize, _accepted: bool) {}

/// Traces a backend failure that disqualified a candidate.
#[cfg(feature = "tracing")]
#[inline]
pub fn trace_codec_failure(name: &str, kind: OperationKind, error: &CodecError) {
    tracing::warn!(
        target: DELTA_TARGET,
        name = %name,
        kind = %kind,
        error = %error,
        "candidate: backend failed"
    );
}

/// No-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub fn trace_codec_failure(_name: &str, _kind: OperationKind, _error: &CodecError) {}

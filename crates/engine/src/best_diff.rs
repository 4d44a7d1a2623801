//! Operation selection for one window of a file.
//!
//! # Design
//!
//! Every window starts from a full operation (the smallest of the enabled
//! compressors, or verbatim data) and then lets the enabled diff backends
//! compete against it in a fixed order. [`beats`] decides each round and
//! [`select_best`] is the same fold over a whole list: source-reading
//! candidates are charged a fixed overhead plus a per-source-extent overhead,
//! so a diff has to be strictly cheaper than the current choice once that
//! overhead is paid.
//!
//! Backend failures never abort the window: the failing candidate is dropped
//! and counted in [`RunCounters`].

use codecs::hints::{CompressedContainer, StreamRange, share_stream_kind};
use codecs::{CodecError, CodecSet, ControlEntry};
use extents::{Extent, blocks_in_extents};

use crate::config::{DiffOverhead, PayloadGenerationConfig};
use crate::debug_delta::{trace_candidate, trace_codec_failure};
use crate::operation::{Operation, OperationKind, XorHint};
use crate::stats::RunCounters;
use crate::xor::populate_xor_hints;

/// Format hints for one side of a window.
#[derive(Clone, Copy, Debug, Default)]
pub struct WindowHints<'a> {
    /// Compressible sub-streams, relative to the window start.
    pub streams: &'a [StreamRange],
    /// Container layout; only present when the window is the whole file.
    pub container: Option<&'a CompressedContainer>,
}

/// Old and new data of one window.
#[derive(Clone, Copy, Debug)]
pub struct DiffInput<'a> {
    /// Window label used in diagnostics.
    pub name: &'a str,
    /// Name of the new file, used for suffix allow-lists.
    pub file_name: &'a str,
    /// Old bytes; empty when the window has no baseline.
    pub old_data: &'a [u8],
    /// New bytes.
    pub new_data: &'a [u8],
    /// Old blocks the data was read from.
    pub old_extents: &'a [Extent],
    /// New blocks the data will be written to.
    pub new_extents: &'a [Extent],
    /// Old-side hints.
    pub old_hints: WindowHints<'a>,
    /// New-side hints.
    pub new_hints: WindowHints<'a>,
}

/// A candidate encoding of a window.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Candidate {
    /// Operation kind.
    pub kind: OperationKind,
    /// Inline data.
    pub payload: Vec<u8>,
    /// Number of source extents the operation reads.
    pub source_extents: u64,
    /// Control stream, for byte diffs.
    pub controls: Vec<ControlEntry>,
}

impl Candidate {
    /// A candidate that reads no source.
    #[must_use]
    pub fn full(kind: OperationKind, payload: Vec<u8>) -> Self {
        Self {
            kind,
            payload,
            source_extents: 0,
            controls: Vec::new(),
        }
    }

    /// A candidate reading `source_extents` source extents.
    #[must_use]
    pub fn diff(kind: OperationKind, payload: Vec<u8>, source_extents: u64) -> Self {
        Self {
            kind,
            payload,
            source_extents,
            controls: Vec::new(),
        }
    }

    /// Attaches a byte-diff control stream.
    #[must_use]
    pub fn with_controls(mut self, controls: Vec<ControlEntry>) -> Self {
        self.controls = controls;
        self
    }

    /// Inline data size.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }
}

/// Returns `true` when `candidate` replaces `current`.
///
/// A candidate that reads no source must be strictly smaller. A
/// source-reading candidate must be strictly smaller once `overhead` is
/// added to its size. Ties keep `current`.
#[must_use]
pub fn beats(candidate: &Candidate, current: &Candidate, overhead: &DiffOverhead) -> bool {
    let cost = if candidate.kind.reads_source() {
        overhead.charge(candidate.size(), candidate.source_extents)
    } else {
        candidate.size()
    };
    cost < current.size()
}

/// Folds `candidates` in order, keeping the earliest candidate nothing beats.
#[must_use]
pub fn select_best<I>(candidates: I, overhead: &DiffOverhead) -> Option<Candidate>
where
    I: IntoIterator<Item = Candidate>,
{
    let mut candidates = candidates.into_iter();
    let first = candidates.next()?;
    Some(candidates.fold(first, |current, candidate| {
        if beats(&candidate, &current, overhead) {
            candidate
        } else {
            current
        }
    }))
}

/// The chosen operation of a window, before its payload reaches the blob.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiffOutcome {
    /// Operation with extents and legacy lengths filled in.
    pub operation: Operation,
    /// Inline data.
    pub payload: Vec<u8>,
    /// XOR merge hints, when enabled and the operation is a byte diff.
    pub xor_hints: Vec<XorHint>,
}

/// Picks the cheapest operation for single windows.
#[derive(Clone, Copy, Debug)]
pub struct DiffEngine<'a> {
    config: &'a PayloadGenerationConfig,
    codecs: &'a CodecSet,
    counters: &'a RunCounters,
}

impl<'a> DiffEngine<'a> {
    /// Creates an engine over a run's configuration, backends and counters.
    #[must_use]
    pub const fn new(config: &'a PayloadGenerationConfig, codecs: &'a CodecSet, counters: &'a RunCounters) -> Self {
        Self {
            config,
            codecs,
            counters,
        }
    }

    /// Chooses the operation for `input`.
    pub fn generate(&self, input: &DiffInput<'_>) -> DiffOutcome {
        let enabled = self.config.enabled_operations;

        if enabled.allows(OperationKind::Zero) && is_all_zero(input.new_data) {
            return self.finalize(input, Candidate::full(OperationKind::Zero, Vec::new()));
        }

        let baseline = self.full_operation(input.name, input.new_data);
        if input.old_data.is_empty() {
            return self.finalize(input, baseline);
        }

        let source_extents = input.old_extents.len() as u64;
        if input.old_data == input.new_data && enabled.allows(OperationKind::SourceCopy) {
            return self.finalize(
                input,
                Candidate::diff(OperationKind::SourceCopy, Vec::new(), source_extents),
            );
        }

        if let Some(candidate) = self.container_diff(input) {
            trace_candidate(input.name, candidate.kind, candidate.payload.len(), true);
            return self.finalize(input, candidate);
        }

        let mut evaluated = vec![(baseline.kind, baseline.payload.len())];
        let mut best = baseline;
        let challengers = [
            self.byte_diff(input),
            self.stream_diff(input),
            self.executable_diff(input),
        ];
        for candidate in challengers.into_iter().flatten() {
            evaluated.push((candidate.kind, candidate.payload.len()));
            if beats(&candidate, &best, &self.config.diff_overhead) {
                best = candidate;
            }
        }
        for (kind, size) in evaluated {
            trace_candidate(input.name, kind, size, kind == best.kind);
        }
        self.finalize(input, best)
    }

    /// Smallest whole-data encoding of `data`: the first compressor result
    /// that beats everything before it, else verbatim data.
    #[must_use]
    pub fn full_operation(&self, name: &str, data: &[u8]) -> Candidate {
        let enabled = self.config.enabled_operations;
        let mut best = Candidate::full(OperationKind::Replace, data.to_vec());
        for &algorithm in &self.config.compressors {
            let kind = OperationKind::for_compression(algorithm);
            if !enabled.allows(kind) {
                continue;
            }
            match algorithm.compress(data) {
                Ok(packed) if packed.len() < best.payload.len() => {
                    best = Candidate::full(kind, packed);
                }
                Ok(_) => {}
                Err(error) => self.codec_failed(name, kind, &error),
            }
        }
        best
    }

    fn container_diff(&self, input: &DiffInput<'_>) -> Option<Candidate> {
        let kind = OperationKind::ContainerAwareDiff;
        let old_layout = input.old_hints.container?;
        let new_layout = input.new_hints.container?;
        let differ = self.codecs.container_differ()?;
        if !self.attemptable(kind, input) {
            return None;
        }
        self.collect(
            input,
            kind,
            differ.diff(input.old_data, input.new_data, old_layout, new_layout),
        )
    }

    fn byte_diff(&self, input: &DiffInput<'_>) -> Option<Candidate> {
        let enabled = self.config.enabled_operations;
        let (kind, differ) = match (
            self.codecs.compressed_byte_differ(),
            self.codecs.byte_differ(),
        ) {
            (Some(differ), _) if enabled.allows(OperationKind::ByteDiffCompressed) => {
                (OperationKind::ByteDiffCompressed, differ)
            }
            (_, Some(differ)) if enabled.allows(OperationKind::ByteDiff) => {
                (OperationKind::ByteDiff, differ)
            }
            _ => return None,
        };
        if !self.attemptable(kind, input) {
            return None;
        }
        match differ.diff(input.old_data, input.new_data) {
            Ok(patch) => {
                self.counters.record_candidate();
                Some(
                    Candidate::diff(kind, patch.data, input.old_extents.len() as u64)
                        .with_controls(patch.controls),
                )
            }
            Err(error) => {
                self.codec_failed(input.name, kind, &error);
                None
            }
        }
    }

    fn stream_diff(&self, input: &DiffInput<'_>) -> Option<Candidate> {
        let kind = OperationKind::StreamDiff;
        let differ = self.codecs.stream_differ()?;
        if !share_stream_kind(input.old_hints.streams, input.new_hints.streams)
            || !self.attemptable(kind, input)
        {
            return None;
        }
        self.collect(
            input,
            kind,
            differ.diff(
                input.old_data,
                input.new_data,
                input.old_hints.streams,
                input.new_hints.streams,
            ),
        )
    }

    fn executable_diff(&self, input: &DiffInput<'_>) -> Option<Candidate> {
        let kind = OperationKind::BinaryPatchDiff;
        let differ = self.codecs.executable_differ()?;
        if !self.config.executable_suffixes.matches_name(input.file_name)
            || !self.attemptable(kind, input)
        {
            return None;
        }
        self.collect(input, kind, differ.diff(input.old_data, input.new_data))
    }

    fn collect(
        &self,
        input: &DiffInput<'_>,
        kind: OperationKind,
        result: Result<Vec<u8>, CodecError>,
    ) -> Option<Candidate> {
        match result {
            Ok(payload) => {
                self.counters.record_candidate();
                Some(Candidate::diff(kind, payload, input.old_extents.len() as u64))
            }
            Err(error) => {
                self.codec_failed(input.name, kind, &error);
                None
            }
        }
    }

    /// Kind enabled and both windows within its ceiling.
    fn attemptable(&self, kind: OperationKind, input: &DiffInput<'_>) -> bool {
        let blocks = blocks_in_extents(input.old_extents).max(blocks_in_extents(input.new_extents));
        self.config.enabled_operations.allows(kind)
            && blocks.saturating_mul(self.config.block_size) <= self.config.size_limits.limit_for(kind)
    }

    fn codec_failed(&self, name: &str, kind: OperationKind, error: &CodecError) {
        self.counters.record_codec_failure();
        trace_codec_failure(name, kind, error);
    }

    fn finalize(&self, input: &DiffInput<'_>, candidate: Candidate) -> DiffOutcome {
        let kind = candidate.kind;
        let mut operation = Operation::new(kind, input.new_extents.to_vec());
        if kind.reads_source() {
            operation.src_extents = input.old_extents.to_vec();
            self.counters.record_diff_accepted();
        }
        if kind.is_byte_diff() && self.config.byte_diff_needs_lengths() {
            operation.src_length = Some(input.old_data.len() as u64);
            operation.dst_length = Some(input.new_data.len() as u64);
        }
        let xor_hints = if kind.is_byte_diff() && self.config.enable_vabc_xor {
            populate_xor_hints(
                &candidate.controls,
                input.old_extents,
                input.new_extents,
                self.config.block_size,
            )
        } else {
            Vec::new()
        };
        DiffOutcome {
            operation,
            payload: candidate.payload,
            xor_hints,
        }
    }
}

fn is_all_zero(data: &[u8]) -> bool {
    data.iter().all(|&byte| byte == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperationKindSet;
    use codecs::hints::StreamKind;
    use codecs::{ExecutableDiffer, StreamDiffer};

    const BS: u64 = 64;

    struct FixedStream(usize);

    impl StreamDiffer for FixedStream {
        fn name(&self) -> &'static str {
            "fixed-stream"
        }

        fn diff(
            &self,
            _old: &[u8],
            _new: &[u8],
            _old_streams: &[StreamRange],
            _new_streams: &[StreamRange],
        ) -> Result<Vec<u8>, CodecError> {
            Ok(vec![0xEE; self.0])
        }
    }

    struct Failing;

    impl ExecutableDiffer for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn diff(&self, _old: &[u8], _new: &[u8]) -> Result<Vec<u8>, CodecError> {
            Err(CodecError::unsupported("failing", "always"))
        }
    }

    fn config() -> PayloadGenerationConfig {
        PayloadGenerationConfig::default().with_block_size(BS)
    }

    fn noise(len: usize, seed: u32) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (state >> 16) as u8
            })
            .collect()
    }

    fn input<'a>(old: &'a [u8], new: &'a [u8], old_extents: &'a [Extent], new_extents: &'a [Extent]) -> DiffInput<'a> {
        DiffInput {
            name: "file",
            file_name: "file",
            old_data: old,
            new_data: new,
            old_extents,
            new_extents,
            old_hints: WindowHints::default(),
            new_hints: WindowHints::default(),
        }
    }

    #[test]
    fn ties_keep_the_earlier_candidate() {
        let overhead = DiffOverhead::default();
        let replace = Candidate::full(OperationKind::Replace, vec![0; 100]);
        // 56 + 38 + 6 * 1 == 100: not strictly smaller.
        let diff = Candidate::diff(OperationKind::ByteDiff, vec![0; 56], 1);
        let best = select_best([replace.clone(), diff], &overhead).expect("best");
        assert_eq!(best, replace);

        let cheaper = Candidate::diff(OperationKind::ByteDiff, vec![0; 55], 1);
        let best = select_best([replace, cheaper.clone()], &overhead).expect("best");
        assert_eq!(best, cheaper);
    }

    #[test]
    fn non_source_candidates_need_strictly_smaller_size() {
        let overhead = DiffOverhead::default();
        let first = Candidate::full(OperationKind::ReplaceXz, vec![0; 10]);
        let second = Candidate::full(OperationKind::ReplaceBzip2, vec![0; 10]);
        assert_eq!(select_best([first.clone(), second], &overhead), Some(first));
        assert_eq!(select_best(Vec::new(), &overhead), None);
    }

    #[test]
    fn all_zero_window_becomes_zero() {
        let config = config();
        let codecs = CodecSet::default();
        let counters = RunCounters::new();
        let engine = DiffEngine::new(&config, &codecs, &counters);
        let new = vec![0u8; 2 * BS as usize];
        let extents = [Extent::new(4, 2)];
        let outcome = engine.generate(&input(&[], &new, &[], &extents));
        assert_eq!(outcome.operation.kind, OperationKind::Zero);
        assert!(outcome.payload.is_empty());
        assert!(outcome.operation.src_extents.is_empty());
    }

    #[test]
    fn identical_window_becomes_source_copy() {
        let config = config();
        let codecs = CodecSet::default();
        let counters = RunCounters::new();
        let engine = DiffEngine::new(&config, &codecs, &counters);
        let data = noise(2 * BS as usize, 7);
        let old_extents = [Extent::new(0, 2)];
        let new_extents = [Extent::new(8, 2)];
        let outcome = engine.generate(&input(&data, &data, &old_extents, &new_extents));
        assert_eq!(outcome.operation.kind, OperationKind::SourceCopy);
        assert_eq!(outcome.operation.src_extents, old_extents);
        assert!(outcome.payload.is_empty());
        assert_eq!(counters.diffs_accepted(), 1);
    }

    #[test]
    fn compressible_data_without_baseline_is_compressed() {
        let config = config();
        let codecs = CodecSet::default();
        let counters = RunCounters::new();
        let engine = DiffEngine::new(&config, &codecs, &counters);
        let new: Vec<u8> = (0..8 * BS).map(|i| (i % 5 + 1) as u8).collect();
        let extents = [Extent::new(0, 8)];
        let outcome = engine.generate(&input(&[], &new, &[], &extents));
        assert!(matches!(
            outcome.operation.kind,
            OperationKind::ReplaceXz | OperationKind::ReplaceBzip2
        ));
        assert!(outcome.payload.len() < new.len());
    }

    #[test]
    fn incompressible_data_stays_replace() {
        let config = config();
        let codecs = CodecSet::none();
        let counters = RunCounters::new();
        let engine = DiffEngine::new(&config, &codecs, &counters);
        let new = noise(BS as usize, 3);
        let outcome = engine.full_operation("noise", &new);
        assert_eq!(outcome.kind, OperationKind::Replace);
        assert_eq!(outcome.payload, new);
    }

    #[test]
    fn small_edit_prefers_byte_diff_with_legacy_lengths() {
        let config = config().with_minor_version(2);
        let codecs = CodecSet::default();
        let counters = RunCounters::new();
        let engine = DiffEngine::new(&config, &codecs, &counters);
        let old = noise(16 * BS as usize, 11);
        let mut new = old.clone();
        new[100] ^= 0xFF;
        let old_extents = [Extent::new(0, 16)];
        let new_extents = [Extent::new(0, 16)];
        let outcome = engine.generate(&input(&old, &new, &old_extents, &new_extents));
        assert_eq!(outcome.operation.kind, OperationKind::ByteDiffCompressed);
        assert_eq!(outcome.operation.src_extents, old_extents);
        assert_eq!(outcome.operation.src_length, Some(old.len() as u64));
        assert_eq!(outcome.operation.dst_length, Some(new.len() as u64));
        assert!(counters.candidates_evaluated() >= 1);
    }

    #[test]
    fn xor_hints_follow_accepted_byte_diff() {
        let config = config()
            .with_vabc_xor(true)
            .with_enabled_operations(OperationKindSet::default() - OperationKindSet::BYTE_DIFF_COMPRESSED);
        let codecs = CodecSet::default();
        let counters = RunCounters::new();
        let engine = DiffEngine::new(&config, &codecs, &counters);
        let old = noise(16 * BS as usize, 5);
        let mut new = old.clone();
        new[3] ^= 0x01;
        let old_extents = [Extent::new(0, 16)];
        let new_extents = [Extent::new(32, 16)];
        let outcome = engine.generate(&input(&old, &new, &old_extents, &new_extents));
        assert_eq!(outcome.operation.kind, OperationKind::ByteDiff);
        assert!(outcome.operation.src_length.is_none());
        assert!(!outcome.xor_hints.is_empty());
        for hint in &outcome.xor_hints {
            assert!(hint.dst_extent.start_block >= 32);
            assert!(hint.dst_extent.end_block() <= 48);
        }
    }

    #[test]
    fn stream_diff_needs_a_shared_stream_kind() {
        let config = config();
        let codecs = CodecSet::none().with_stream_differ(FixedStream(1));
        let counters = RunCounters::new();
        let engine = DiffEngine::new(&config, &codecs, &counters);
        let old = noise(4 * BS as usize, 1);
        let new = noise(4 * BS as usize, 2);
        let extents = [Extent::new(0, 4)];
        let deflate = [StreamRange::new(StreamKind::Deflate, 0, 64)];
        let gzip = [StreamRange::new(StreamKind::Gzip, 0, 64)];

        let mut window = input(&old, &new, &extents, &extents);
        window.old_hints.streams = &deflate;
        window.new_hints.streams = &gzip;
        assert_eq!(engine.generate(&window).operation.kind, OperationKind::Replace);

        window.new_hints.streams = &deflate;
        let outcome = engine.generate(&window);
        assert_eq!(outcome.operation.kind, OperationKind::StreamDiff);
        assert_eq!(outcome.payload, vec![0xEE]);
    }

    #[test]
    fn size_ceiling_skips_candidate() {
        let mut config = config();
        config.size_limits.stream_diff = 3 * BS;
        let codecs = CodecSet::none().with_stream_differ(FixedStream(1));
        let counters = RunCounters::new();
        let engine = DiffEngine::new(&config, &codecs, &counters);
        let old = noise(4 * BS as usize, 1);
        let new = noise(4 * BS as usize, 2);
        let extents = [Extent::new(0, 4)];
        let deflate = [StreamRange::new(StreamKind::Deflate, 0, 64)];
        let mut window = input(&old, &new, &extents, &extents);
        window.old_hints.streams = &deflate;
        window.new_hints.streams = &deflate;
        assert_eq!(engine.generate(&window).operation.kind, OperationKind::Replace);
    }

    #[test]
    fn backend_failure_is_counted_not_fatal() {
        let config = config();
        let codecs = CodecSet::none().with_executable_differ(Failing);
        let counters = RunCounters::new();
        let engine = DiffEngine::new(&config, &codecs, &counters);
        let old = noise(BS as usize, 1);
        let new = noise(BS as usize, 2);
        let extents = [Extent::new(0, 1)];
        let mut window = input(&old, &new, &extents, &extents);
        window.file_name = "lib/libfoo.so";
        let outcome = engine.generate(&window);
        assert_eq!(outcome.operation.kind, OperationKind::Replace);
        assert_eq!(counters.codec_failures(), 1);

        window.file_name = "etc/readme";
        let _ = engine.generate(&window);
        assert_eq!(counters.codec_failures(), 1);
    }
}

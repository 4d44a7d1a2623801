//! Generated operations rebuild the new image from the old one.

use engine::{
    BlobWriteMode, ChunkSize, MemoryBlobSink, OperationKind, OperationKindSet,
    PartitionDeltaOrchestrator, PayloadGenerationConfig,
};
use extents::Extent;
use test_support::{SyntheticImage, SyntheticPartition, apply_operations};

const BS: usize = 512;

fn config() -> PayloadGenerationConfig {
    PayloadGenerationConfig::default().with_block_size(BS as u64)
}

/// Old image: a file at blocks 0..6, scratch data after it.
fn old_image() -> SyntheticImage {
    SyntheticPartition::new("system", BS)
        .patterns(0..6)
        .patterns(100..104)
        .zeros(2)
        .file("lib/libc.so", &[Extent::new(0, 6)])
        .build()
        .expect("old image")
}

/// New image: the file grew and moved, one block changed, scratch data was
/// rewritten and a zero region appeared.
fn new_image() -> SyntheticImage {
    let mut edited = test_support::pattern_block(3, BS);
    edited[17] ^= 0xff;
    edited[300] = 0;
    SyntheticPartition::new("system", BS)
        .zeros(1)
        .patterns(0..3)
        .bytes(&edited)
        .patterns(4..6)
        .patterns([42])
        .patterns(200..203)
        .zeros(3)
        .file("lib/libc.so", &[Extent::new(1, 7)])
        .build()
        .expect("new image")
}

fn round_trip(config: PayloadGenerationConfig) -> Vec<engine::AnnotatedOperation> {
    let old = old_image();
    let new = new_image();
    let sink = MemoryBlobSink::new();
    let delta = PartitionDeltaOrchestrator::new(config)
        .delta_partition(old.config(), new.config(), &sink)
        .expect("delta");
    let rebuilt = apply_operations(
        old.data(),
        &delta.operations,
        &sink.contents(),
        BS as u64,
        new.data().len() as u64,
    )
    .expect("apply");
    assert!(rebuilt == new.data(), "rebuilt image differs");
    delta.operations
}

#[test]
fn replace_only_round_trip() {
    let ops = round_trip(
        config()
            .with_enabled_operations(OperationKindSet::REPLACE)
            .with_compressors(Vec::new()),
    );
    assert!(ops.iter().all(|op| op.operation.kind == OperationKind::Replace));
    assert!(ops.iter().all(|op| op.operation.src_extents.is_empty()));
}

#[test]
fn default_round_trip_uses_source() {
    let ops = round_trip(config());
    assert!(ops.iter().any(|op| op.operation.kind == OperationKind::SourceCopy));
    assert!(ops.iter().any(|op| op.operation.kind == OperationKind::Zero));
}

#[test]
fn plain_byte_diff_round_trip_with_legacy_lengths() {
    let enabled = OperationKindSet::FULL | OperationKindSet::ZERO | OperationKindSet::BYTE_DIFF;
    let ops = round_trip(config().with_enabled_operations(enabled).with_minor_version(2));
    for op in ops.iter().filter(|op| op.operation.kind == OperationKind::ByteDiff) {
        assert!(op.operation.src_length.is_some());
        assert!(op.operation.dst_length.is_some());
    }
}

#[test]
fn chunked_round_trip() {
    let ops = round_trip(
        config()
            .with_hard_chunk(ChunkSize::Blocks(2))
            .with_soft_chunk(ChunkSize::Blocks(3)),
    );
    assert!(ops
        .iter()
        .all(|op| op.operation.dst_extents.iter().map(|e| e.num_blocks).sum::<u64>() <= 3));
}

#[test]
fn streaming_round_trip() {
    round_trip(config().with_blob_write_mode(BlobWriteMode::Streaming));
}

#[test]
fn xz_round_trip() {
    let enabled = OperationKindSet::REPLACE | OperationKindSet::REPLACE_XZ;
    let old = old_image();
    let new = SyntheticPartition::new("system", BS)
        .fill(b'a')
        .fill(b'b')
        .bytes(&vec![b'c'; 3 * BS])
        .build()
        .expect("new image");
    let sink = MemoryBlobSink::new();
    let delta = PartitionDeltaOrchestrator::new(config().with_enabled_operations(enabled))
        .delta_partition(old.config(), new.config(), &sink)
        .expect("delta");
    assert!(delta
        .operations
        .iter()
        .all(|op| op.operation.kind == OperationKind::ReplaceXz));
    let rebuilt = apply_operations(
        old.data(),
        &delta.operations,
        &sink.contents(),
        BS as u64,
        new.data().len() as u64,
    )
    .expect("apply");
    assert_eq!(rebuilt, new.data());
}

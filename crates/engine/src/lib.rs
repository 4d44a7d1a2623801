#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `engine` computes the operations that rebuild a new partition image from
//! an old one. For every region of the new image it evaluates the available
//! whole-data encodings and diff backends and keeps the cheapest, while
//! tracking block ownership across the partition so no block is produced
//! twice.
//!
//! # Design
//!
//! - [`orchestrator`] drives one partition run: verity skipping, the
//!   [`zero_moved`] pass, per-file job planning, scheduling, ordered merge
//!   and validation.
//! - [`file_delta`] cuts one file into windows and runs the
//!   [`best_diff::DiffEngine`] on each of them.
//! - [`best_diff`] holds the candidate evaluation and the pure acceptance
//!   rule ([`best_diff::select_best`]).
//! - [`xor`] derives block-level XOR merge hints from an accepted byte diff.
//! - [`similar`] finds a baseline for files without a same-named old file.
//! - [`block_identity`] assigns content identities to blocks.
//! - [`pipeline`] runs jobs on a fixed-size rayon pool and restores
//!   enumeration order.
//! - [`blob`], [`fragment`] and [`validate`] are the blob sink, the
//!   fragmentation collaborator and the structural checks.
//!
//! # Invariants
//!
//! - The destinations of a run's operations tile the new partition, minus
//!   its verity extents, exactly once.
//! - Source extents are present exactly on kinds that read the old image.
//! - Returned operations carry no pending payload.
//!
//! # Errors
//!
//! Fatal problems surface as [`DeltaError`]. Backend failures never do:
//! they disqualify one candidate and are counted in [`RunCounters`].
//!
//! # Examples
//!
//! ```no_run
//! use engine::{
//!     BlobSink, MemoryBlobSink, PartitionConfig, PartitionDeltaOrchestrator, PayloadGenerationConfig,
//! };
//!
//! # fn main() -> Result<(), engine::DeltaError> {
//! let old = PartitionConfig::new("system").with_image("old/system.img", 64 << 20);
//! let new = PartitionConfig::new("system").with_image("new/system.img", 64 << 20);
//! let sink = MemoryBlobSink::new();
//! let delta = PartitionDeltaOrchestrator::new(PayloadGenerationConfig::default())
//!     .delta_partition(&old, &new, &sink)?;
//! println!("{} operations, {} blob bytes", delta.operations.len(), sink.len());
//! # Ok(())
//! # }
//! ```

pub mod best_diff;
pub mod blob;
pub mod block_identity;
pub mod config;
pub mod debug_delta;
mod error;
pub mod file_delta;
pub mod fragment;
pub mod operation;
pub mod orchestrator;
pub mod partition;
pub mod pipeline;
pub mod similar;
pub mod stats;
pub mod validate;
pub mod xor;
pub mod zero_moved;

pub use blob::{BlobSink, FileBlobSink, MemoryBlobSink};
pub use block_identity::{BlockIdentities, BlockIdentityMapper, ContentHashBlockMapper};
pub use config::{
    BlobWriteMode, ChunkSize, ConfigError, DiffOverhead, DiffSizeLimits, OperationKindSet,
    PayloadGenerationConfig,
};
pub use error::{DeltaError, DeltaResult, StructuralError};
pub use fragment::{NoFragmentation, OperationFragmenter, SplitByExtent};
pub use operation::{AnnotatedOperation, DataLocator, MergeKind, Operation, OperationKind, XorHint};
pub use orchestrator::{PartitionDelta, PartitionDeltaOrchestrator};
pub use partition::{PartitionConfig, PartitionFile, PartitionReader, VerityExtents};
pub use stats::{RunCounters, RunStats};

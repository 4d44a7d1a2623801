//! Error types for partition delta generation.

use std::io;
use std::path::PathBuf;

use extents::Extent;
use thiserror::Error;

use crate::config::ConfigError;
use crate::operation::OperationKind;

/// Result type for engine operations.
pub type DeltaResult<T> = Result<T, DeltaError>;

/// Errors that abort a partition run.
///
/// Codec failures are not represented here: they only disqualify a single
/// candidate and are counted in [`crate::RunCounters`].
#[derive(Debug, Error)]
pub enum DeltaError {
    /// Reading a partition image failed.
    #[error("failed to {action} '{}': {source}", path.display())]
    Io {
        /// What the engine was doing.
        action: &'static str,
        /// Partition image involved.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// The emitted operations violate a structural rule.
    #[error(transparent)]
    Structural(#[from] StructuralError),
    /// Declared extents disagree with the partition image.
    #[error("partition {name}: {detail}")]
    ConfigMismatch {
        /// Partition name.
        name: String,
        /// Description of the disagreement.
        detail: String,
    },
    /// The run configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A file job failed; wraps the job's own error.
    #[error("delta job {name} failed: {source}")]
    Job {
        /// Name of the job's file.
        name: String,
        /// Error raised by the job.
        #[source]
        source: Box<DeltaError>,
    },
    /// The worker pool could not be built or lost a job.
    #[error("worker pool failure: {0}")]
    WorkerPool(String),
    /// Appending inline data to the blob sink failed.
    #[error("failed to append {len} bytes to the data blob: {source}")]
    Blob {
        /// Payload size.
        len: usize,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
}

impl DeltaError {
    /// Constructs an I/O error with action context.
    #[must_use]
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Constructs a mismatch between a partition and its declared layout.
    #[must_use]
    pub fn mismatch(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ConfigMismatch {
            name: name.into(),
            detail: detail.into(),
        }
    }

    /// Wraps the error of the job named `name`.
    #[must_use]
    pub fn job(name: impl Into<String>, source: Self) -> Self {
        Self::Job {
            name: name.into(),
            source: Box::new(source),
        }
    }
}

/// Structural defects in an operation list.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum StructuralError {
    /// An operation does not write anything.
    #[error("operation {name} has no destination extents")]
    EmptyDestination {
        /// Operation name.
        name: String,
    },
    /// Source extents are present on a kind that never reads source, or
    /// missing on one that does.
    #[error("operation {name} ({kind}) {detail}")]
    SourceExtents {
        /// Operation name.
        name: String,
        /// Operation kind.
        kind: OperationKind,
        /// What is wrong.
        detail: &'static str,
    },
    /// A kind without inline data references the blob or holds a payload.
    #[error("operation {name} ({kind}) must not carry inline data")]
    UnexpectedData {
        /// Operation name.
        name: String,
        /// Operation kind.
        kind: OperationKind,
    },
    /// Increasing and decreasing destination order were both requested.
    #[error("destination order cannot be both increasing and decreasing")]
    ConflictingOrder,
    /// Destination extents break the requested order.
    #[error("operation {name} breaks {order} destination order at {extent}")]
    OutOfOrder {
        /// Operation name.
        name: String,
        /// Requested order.
        order: &'static str,
        /// First extent out of order.
        extent: Extent,
    },
    /// Two operations write the same blocks.
    #[error("blocks {extent} are written more than once")]
    Overlap {
        /// Offending range.
        extent: Extent,
    },
    /// Blocks outside the expected range are written.
    #[error("blocks {extent} are outside the expected destination range")]
    Unexpected {
        /// Offending range.
        extent: Extent,
    },
    /// Blocks of the expected range are never written.
    #[error("blocks {extent} are not written by any operation")]
    Gap {
        /// First uncovered range.
        extent: Extent,
    },
    /// A chunk size of zero blocks was requested.
    #[error("chunk size must be at least one block")]
    ZeroChunk,
    /// A window's byte range does not fit in 64 bits.
    #[error("window of {blocks} blocks at block {offset} of {name} exceeds the addressable byte range")]
    WindowOverflow {
        /// Job name.
        name: String,
        /// Window offset in blocks.
        offset: u64,
        /// Window length in blocks.
        blocks: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_action_and_path() {
        let error = DeltaError::io(
            "read partition",
            "/images/system.img",
            io::Error::new(io::ErrorKind::UnexpectedEof, "short read"),
        );
        assert_eq!(
            error.to_string(),
            "failed to read partition '/images/system.img': short read"
        );
    }

    #[test]
    fn job_error_keeps_source_chain() {
        let inner = DeltaError::mismatch("system", "extent [10..12) exceeds 8 blocks");
        let error = DeltaError::job("bin/sh", inner);
        assert_eq!(
            error.to_string(),
            "delta job bin/sh failed: partition system: extent [10..12) exceeds 8 blocks"
        );
        let source = std::error::Error::source(&error).expect("source");
        assert!(source.to_string().starts_with("partition system"));
    }

    #[test]
    fn structural_errors_render_extents() {
        let error = StructuralError::Gap {
            extent: Extent::new(3, 2),
        };
        assert_eq!(error.to_string(), "blocks [3..5) are not written by any operation");
    }
}

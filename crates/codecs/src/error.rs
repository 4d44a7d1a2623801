use std::io;

use thiserror::Error;

/// Errors reported by compression and diff backends.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The backend failed while reading or writing its buffers.
    #[error("{codec} failed: {source}")]
    Io {
        /// Backend that failed.
        codec: &'static str,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// A patch or compressed stream did not follow the expected format.
    #[error("malformed {codec} data: {reason}")]
    Malformed {
        /// Format being decoded.
        codec: &'static str,
        /// Description of the defect.
        reason: String,
    },
    /// The backend declined the input, e.g. because a required hint is missing.
    #[error("{codec} cannot handle this input: {reason}")]
    Unsupported {
        /// Backend that declined.
        codec: &'static str,
        /// Why the input was declined.
        reason: String,
    },
}

impl CodecError {
    /// Wraps an I/O failure raised by `codec`.
    #[must_use]
    pub fn io(codec: &'static str, source: io::Error) -> Self {
        Self::Io { codec, source }
    }

    /// Reports malformed `codec` data.
    #[must_use]
    pub fn malformed(codec: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            codec,
            reason: reason.into(),
        }
    }

    /// Reports an input the backend does not handle.
    #[must_use]
    pub fn unsupported(codec: &'static str, reason: impl Into<String>) -> Self {
        Self::Unsupported {
            codec,
            reason: reason.into(),
        }
    }
}

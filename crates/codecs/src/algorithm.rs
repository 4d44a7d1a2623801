//! Compression algorithms available for whole-chunk replace operations.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::{bz2, xz};

/// Compressors the engine may try when building a replace operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CompressionAlgorithm {
    /// LZMA2 in an xz container.
    Xz,
    /// bzip2.
    Bzip2,
}

impl CompressionAlgorithm {
    /// Returns the canonical display name used for diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Xz => "xz",
            Self::Bzip2 => "bzip2",
        }
    }

    /// Returns the default try-order: xz first, then bzip2.
    #[must_use]
    pub fn default_order() -> Vec<Self> {
        vec![Self::Xz, Self::Bzip2]
    }

    /// Compresses `data` into a freshly allocated buffer.
    pub fn compress(self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Xz => xz::compress_to_vec(data),
            Self::Bzip2 => bz2::compress_to_vec(data),
        }
    }

    /// Decompresses a buffer produced by [`Self::compress`].
    pub fn decompress(self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Xz => xz::decompress_to_vec(data),
            Self::Bzip2 => bz2::decompress_to_vec(data),
        }
    }
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when attempting to parse an unsupported compression algorithm.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CompressionAlgorithmParseError {
    input: String,
}

impl CompressionAlgorithmParseError {
    /// Creates a parse error capturing the original input.
    #[must_use]
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }

    /// Returns the invalid input.
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl fmt::Display for CompressionAlgorithmParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported compression algorithm: {}", self.input)
    }
}

impl std::error::Error for CompressionAlgorithmParseError {}

impl FromStr for CompressionAlgorithm {
    type Err = CompressionAlgorithmParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xz" | "lzma" => Ok(Self::Xz),
            "bz2" | "bzip2" => Ok(Self::Bzip2),
            other => Err(CompressionAlgorithmParseError::new(other.to_string())),
        }
    }
}

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `codecs` exposes the compression and binary-diff backends used by the
//! delta engine. The engine never looks inside a patch format except for one
//! place: the byte-wise diff backends also hand back their control stream so
//! the engine can derive XOR merge hints from it.
//!
//! # Design
//!
//! - [`algorithm`] enumerates the whole-block compressors (xz through
//!   [`xz2`](https://docs.rs/xz2), bzip2 through
//!   [`bzip2`](https://docs.rs/bzip2)) with buffer-to-buffer helpers.
//! - [`bsdiff`] wraps [`qbsdiff`](https://docs.rs/qbsdiff) for the plain
//!   `BSDIFF40` format and repacks the same control/diff/extra streams with
//!   zstd for the compressed variant.
//! - [`backend`] holds the pluggable backend traits and the [`CodecSet`]
//!   registry handed to the engine.
//! - [`hints`] carries per-file format hints (compressible sub-streams and
//!   compressed-container layouts).
//! - [`suffix`] parses file-name suffix allow-lists.
//!
//! # Errors
//!
//! Every backend returns [`CodecError`]. The engine treats these as local
//! failures that only disqualify one candidate.
//!
//! # Examples
//!
//! ```
//! use codecs::algorithm::CompressionAlgorithm;
//!
//! # fn main() -> Result<(), codecs::CodecError> {
//! let data = vec![7u8; 8192];
//! let packed = CompressionAlgorithm::Xz.compress(&data)?;
//! assert!(packed.len() < data.len());
//! assert_eq!(CompressionAlgorithm::Xz.decompress(&packed)?, data);
//! # Ok(())
//! # }
//! ```

pub mod algorithm;
pub mod backend;
pub mod bsdiff;
mod bz2;
mod error;
pub mod hints;
pub mod suffix;
mod xz;

pub use backend::{ByteDiffer, CodecSet, ContainerDiffer, ExecutableDiffer, StreamDiffer};
pub use bsdiff::{BytePatch, ControlEntry};
pub use error::CodecError;

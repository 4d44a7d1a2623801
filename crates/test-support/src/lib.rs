#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Shared test utilities for the payload-delta workspace.
//!
//! - [`image`] builds partition images on disk block by block.
//! - [`apply`] is a reference applier that rebuilds a new image from an old
//!   image, an operation list and the data blob.
//! - [`stubs`] holds backends with fixed behavior for selection tests.

pub mod apply;
pub mod image;
pub mod stubs;

pub use apply::{ApplyError, apply_operations};
pub use image::{SyntheticImage, SyntheticPartition, pattern_block};
pub use stubs::{FailingBackend, SizedPatchBackend};

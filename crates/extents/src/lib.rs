#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! Block extents and the extent range tracker shared by the delta engine.
//!
//! - [`Extent`] names a contiguous run of blocks on a partition.
//! - [`ExtentRanges`] is an ordered set of blocks stored as merged ranges. The
//!   engine keeps one instance per side (old/new) while it walks a partition to
//!   remember which blocks already have an owner.
//! - The free functions in [`extent`] operate on ordered extent lists, which is
//!   how files and operations describe their blocks.
//!
//! # Invariants
//!
//! - [`ExtentRanges`] never stores empty, overlapping or adjacent ranges;
//!   inserting is an idempotent union.
//! - [`filter_extent_ranges`] preserves the order of its input list. Only the
//!   parts of each extent that the tracker does not contain survive.
//! - [`extents_sublist`] returns a window of an extent list measured in blocks
//!   and silently truncates when the list is shorter than requested.
//!
//! # Examples
//!
//! ```
//! use extents::{Extent, ExtentRanges, filter_extent_ranges};
//!
//! let mut visited = ExtentRanges::new();
//! visited.add_extent(Extent::new(4, 4));
//!
//! let file = [Extent::new(0, 10)];
//! let remaining = filter_extent_ranges(&file, &visited);
//! assert_eq!(remaining, vec![Extent::new(0, 4), Extent::new(8, 2)]);
//! ```

pub mod extent;
mod ranges;

pub use extent::{
    Extent, append_block, append_extent, block_at, blocks_in_extents, extents_sublist,
    normalize_extents,
};
pub use ranges::{ExtentRanges, filter_extent_ranges};

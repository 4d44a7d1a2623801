//! Partition descriptions and block-level image reads.

use std::fs::File;
use std::io;
use std::path::PathBuf;

use codecs::hints::{CompressedContainer, StreamRange};
use extents::{Extent, blocks_in_extents};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::error::{DeltaError, DeltaResult};

/// Name of the pseudo-file holding zero-filled blocks.
pub const ZEROS_NAME: &str = "<zeros>";
/// Name of the pseudo-file holding blocks claimed by no file.
pub const NON_FILE_DATA_NAME: &str = "<non-file-data>";
/// Name of the pseudo-file holding blocks found unchanged elsewhere.
pub const IDENTICAL_BLOCKS_NAME: &str = "<identical-blocks>";

/// A file of a partition and the blocks that hold its data.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PartitionFile {
    /// Path of the file inside the partition.
    pub name: String,
    /// Blocks in file order.
    pub extents: Vec<Extent>,
    /// Compressible sub-streams, byte offsets relative to the file start.
    pub streams: Vec<StreamRange>,
    /// Block-compressed container layout.
    pub container: Option<CompressedContainer>,
}

impl PartitionFile {
    /// A regular file occupying `extents`.
    #[must_use]
    pub fn new(name: impl Into<String>, extents: Vec<Extent>) -> Self {
        Self {
            name: name.into(),
            extents,
            ..Self::default()
        }
    }

    /// Attaches sub-stream hints.
    #[must_use]
    pub fn with_streams(mut self, streams: Vec<StreamRange>) -> Self {
        self.streams = streams;
        self
    }

    /// Attaches a container layout.
    #[must_use]
    pub fn with_container(mut self, container: CompressedContainer) -> Self {
        self.container = Some(container);
        self
    }

    /// Number of blocks the file occupies.
    #[must_use]
    pub fn block_count(&self) -> u64 {
        blocks_in_extents(&self.extents)
    }
}

/// Hash-tree and error-correction extents of a verity-protected partition.
///
/// The engine emits no operation for them; the applier regenerates both.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VerityExtents {
    /// Hash-tree blocks.
    pub hash_tree: Extent,
    /// Forward-error-correction blocks.
    pub fec: Extent,
}

impl VerityExtents {
    /// Non-empty extents to skip.
    #[must_use]
    pub fn extents(&self) -> Vec<Extent> {
        [self.hash_tree, self.fec]
            .into_iter()
            .filter(|extent| !extent.is_empty())
            .collect()
    }
}

/// One side (old or new) of a partition update.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PartitionConfig {
    /// Partition name, e.g. `system`.
    pub name: String,
    /// Image path. May be empty when `size` is zero.
    pub path: PathBuf,
    /// Image size in bytes.
    pub size: u64,
    /// Files in enumeration order.
    pub files: Vec<PartitionFile>,
    /// Verity layout of the new partition.
    pub verity: Option<VerityExtents>,
}

impl PartitionConfig {
    /// An empty partition.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Points the partition at an image of `size` bytes.
    #[must_use]
    pub fn with_image(mut self, path: impl Into<PathBuf>, size: u64) -> Self {
        self.path = path.into();
        self.size = size;
        self
    }

    /// Replaces the file list.
    #[must_use]
    pub fn with_files(mut self, files: Vec<PartitionFile>) -> Self {
        self.files = files;
        self
    }

    /// Declares verity extents.
    #[must_use]
    pub fn with_verity(mut self, verity: VerityExtents) -> Self {
        self.verity = Some(verity);
        self
    }

    /// Number of whole blocks in the image.
    #[must_use]
    pub const fn block_count(&self, block_size: u64) -> u64 {
        self.size / block_size
    }

    /// Checks the declared size and path.
    pub fn validate(&self, block_size: u64) -> Result<(), ConfigError> {
        if self.size > 0 && self.path.as_os_str().is_empty() {
            return Err(ConfigError::MissingPath {
                name: self.name.clone(),
                size: self.size,
            });
        }
        if self.size % block_size != 0 {
            return Err(ConfigError::UnalignedPartition {
                name: self.name.clone(),
                size: self.size,
                block_size,
            });
        }
        Ok(())
    }

    /// Checks that every declared extent lies inside the image.
    pub fn check_extents(&self, block_size: u64) -> DeltaResult<()> {
        let blocks = self.block_count(block_size);
        let declared = self
            .files
            .iter()
            .flat_map(|file| file.extents.iter().map(move |extent| (file.name.as_str(), *extent)))
            .chain(
                self.verity
                    .iter()
                    .flat_map(|verity| verity.extents().into_iter().map(|extent| ("verity", extent))),
            );
        for (owner, extent) in declared {
            if extent.end_block() > blocks {
                return Err(DeltaError::mismatch(
                    &self.name,
                    format!("{owner} declares extent {extent} beyond {blocks} blocks"),
                ));
            }
        }
        Ok(())
    }
}

/// Reads blocks of one partition image.
///
/// Reads are positional, so a single reader is shared by every worker.
#[derive(Debug)]
pub struct PartitionReader {
    name: String,
    path: PathBuf,
    file: Option<File>,
    block_size: u64,
    block_count: u64,
}

impl PartitionReader {
    /// Opens the image of `partition`. A zero-sized partition opens nothing.
    pub fn open(partition: &PartitionConfig, block_size: u64) -> DeltaResult<Self> {
        let file = if partition.size == 0 {
            None
        } else {
            let file = File::open(&partition.path)
                .map_err(|error| DeltaError::io("open partition", &partition.path, error))?;
            let actual = file
                .metadata()
                .map_err(|error| DeltaError::io("inspect partition", &partition.path, error))?
                .len();
            if actual < partition.size {
                return Err(DeltaError::mismatch(
                    &partition.name,
                    format!("image holds {actual} bytes, {} declared", partition.size),
                ));
            }
            Some(file)
        };
        Ok(Self {
            name: partition.name.clone(),
            path: partition.path.clone(),
            file,
            block_size,
            block_count: partition.block_count(block_size),
        })
    }

    /// Partition name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of blocks.
    #[must_use]
    pub const fn block_count(&self) -> u64 {
        self.block_count
    }

    /// Block size in bytes.
    #[must_use]
    pub const fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Reads the concatenated contents of `extents`.
    pub fn read_extents(&self, extents: &[Extent]) -> DeltaResult<Vec<u8>> {
        let total = blocks_in_extents(extents) * self.block_size;
        let mut data = vec![0u8; total as usize];
        let mut cursor = 0usize;
        for extent in extents {
            let len = (extent.num_blocks * self.block_size) as usize;
            self.read_into(*extent, &mut data[cursor..cursor + len])?;
            cursor += len;
        }
        Ok(data)
    }

    /// Reads `count` blocks starting at `start`.
    pub fn read_blocks(&self, start: u64, count: u64) -> DeltaResult<Vec<u8>> {
        self.read_extents(&[Extent::new(start, count)])
    }

    fn read_into(&self, extent: Extent, buf: &mut [u8]) -> DeltaResult<()> {
        if extent.is_empty() {
            return Ok(());
        }
        if extent.end_block() > self.block_count {
            return Err(DeltaError::mismatch(
                &self.name,
                format!("extent {extent} exceeds {} blocks", self.block_count),
            ));
        }
        let Some(file) = &self.file else {
            return Err(DeltaError::mismatch(&self.name, "partition has no image"));
        };
        read_exact_at(file, buf, extent.start_block * self.block_size)
            .map_err(|error| DeltaError::io("read partition", &self.path, error))
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(read) => {
                buf = &mut buf[read..];
                offset += read as u64;
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(error),
        }
    }
    Ok(())
}

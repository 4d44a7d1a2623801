//! Synthetic partition images.

use std::io::{self, Write};

use engine::{PartitionConfig, PartitionFile, VerityExtents};
use extents::Extent;
use tempfile::NamedTempFile;

/// Deterministic non-zero block content derived from `seed`.
#[must_use]
pub fn pattern_block(seed: u64, block_size: usize) -> Vec<u8> {
    let mut state = seed.wrapping_mul(0x9e37_79b9_7f4a_7c15) | 1;
    (0..block_size)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state as u8) | 1
        })
        .collect()
}

/// Builder for a partition image and its file table.
#[derive(Clone, Debug)]
pub struct SyntheticPartition {
    name: String,
    block_size: usize,
    data: Vec<u8>,
    files: Vec<PartitionFile>,
    verity: Option<VerityExtents>,
}

impl SyntheticPartition {
    /// Empty partition with blocks of `block_size` bytes.
    #[must_use]
    pub fn new(name: impl Into<String>, block_size: usize) -> Self {
        Self {
            name: name.into(),
            block_size,
            data: Vec::new(),
            files: Vec::new(),
            verity: None,
        }
    }

    /// Number of blocks so far.
    #[must_use]
    pub fn block_count(&self) -> u64 {
        (self.data.len() / self.block_size) as u64
    }

    /// Appends one block filled with `byte`.
    #[must_use]
    pub fn fill(mut self, byte: u8) -> Self {
        self.data.resize(self.data.len() + self.block_size, byte);
        self
    }

    /// Appends `count` zero blocks.
    #[must_use]
    pub fn zeros(mut self, count: usize) -> Self {
        self.data.resize(self.data.len() + count * self.block_size, 0);
        self
    }

    /// Appends one [`pattern_block`] per seed.
    #[must_use]
    pub fn patterns(mut self, seeds: impl IntoIterator<Item = u64>) -> Self {
        for seed in seeds {
            self.data.extend(pattern_block(seed, self.block_size));
        }
        self
    }

    /// Appends `bytes`, zero-padded to a block boundary.
    #[must_use]
    pub fn bytes(mut self, bytes: &[u8]) -> Self {
        self.data.extend_from_slice(bytes);
        let rem = self.data.len() % self.block_size;
        if rem != 0 {
            self.data.resize(self.data.len() + self.block_size - rem, 0);
        }
        self
    }

    /// Declares a file made of `extents`.
    #[must_use]
    pub fn file(mut self, name: impl Into<String>, extents: &[Extent]) -> Self {
        self.files.push(PartitionFile::new(name, extents.to_vec()));
        self
    }

    /// Declares a prepared file record.
    #[must_use]
    pub fn file_record(mut self, file: PartitionFile) -> Self {
        self.files.push(file);
        self
    }

    /// Declares verity extents.
    #[must_use]
    pub fn verity(mut self, hash_tree: Extent, fec: Extent) -> Self {
        self.verity = Some(VerityExtents { hash_tree, fec });
        self
    }

    /// Writes the image to a temporary file.
    pub fn build(self) -> io::Result<SyntheticImage> {
        let mut file = NamedTempFile::new()?;
        file.write_all(&self.data)?;
        file.flush()?;
        let mut config = PartitionConfig::new(self.name)
            .with_image(file.path(), self.data.len() as u64)
            .with_files(self.files);
        if let Some(verity) = self.verity {
            config = config.with_verity(verity);
        }
        Ok(SyntheticImage {
            file,
            config,
            data: self.data,
        })
    }
}

/// A partition image on disk together with its configuration.
#[derive(Debug)]
pub struct SyntheticImage {
    file: NamedTempFile,
    config: PartitionConfig,
    data: Vec<u8>,
}

impl SyntheticImage {
    /// Partition configuration pointing at the image.
    #[must_use]
    pub const fn config(&self) -> &PartitionConfig {
        &self.config
    }

    /// Image contents.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Path of the image file.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        self.file.path()
    }
}

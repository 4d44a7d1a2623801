//! Reference operation applier.

use codecs::CodecError;
use codecs::bsdiff::apply_patch;
use engine::{AnnotatedOperation, OperationKind};
use extents::Extent;
use thiserror::Error;

/// Reasons an operation list cannot be applied.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// An operation has a payload still pending.
    #[error("operation {name} still holds its payload")]
    PendingPayload {
        /// Operation name.
        name: String,
    },
    /// A data locator or extent points outside its buffer.
    #[error("operation {name}: {what} out of bounds")]
    OutOfBounds {
        /// Operation name.
        name: String,
        /// Which reference was out of bounds.
        what: &'static str,
    },
    /// Produced data does not fill the destination exactly.
    #[error("operation {name} produced {produced} bytes for {expected}")]
    Length {
        /// Operation name.
        name: String,
        /// Bytes produced.
        produced: usize,
        /// Bytes the destination holds.
        expected: usize,
    },
    /// The kind has no reference implementation.
    #[error("operation {name}: {kind} cannot be applied")]
    Unsupported {
        /// Operation name.
        name: String,
        /// Operation kind.
        kind: OperationKind,
    },
    /// Decoding the payload failed.
    #[error("operation {name}: {source}")]
    Codec {
        /// Operation name.
        name: String,
        /// Decoder failure.
        #[source]
        source: CodecError,
    },
}

/// Rebuilds a `new_size`-byte image from `old_image`, `ops` and `blob`.
///
/// Blocks no operation writes stay zero.
pub fn apply_operations(
    old_image: &[u8],
    ops: &[AnnotatedOperation],
    blob: &[u8],
    block_size: u64,
    new_size: u64,
) -> Result<Vec<u8>, ApplyError> {
    let mut image = vec![0u8; new_size as usize];
    for op in ops {
        let name = &op.name;
        if op.has_pending_payload() {
            return Err(ApplyError::PendingPayload { name: name.clone() });
        }
        let operation = &op.operation;
        let data = match operation.data {
            Some(locator) => {
                let start = locator.offset as usize;
                let end = start + locator.length as usize;
                blob.get(start..end).ok_or_else(|| ApplyError::OutOfBounds {
                    name: name.clone(),
                    what: "data locator",
                })?
            }
            None => &[][..],
        };
        let source = gather(old_image, &operation.src_extents, block_size).ok_or_else(|| {
            ApplyError::OutOfBounds {
                name: name.clone(),
                what: "source extents",
            }
        })?;
        let codec = |source: CodecError| ApplyError::Codec {
            name: name.clone(),
            source,
        };

        let expected = (operation.dst_block_count() * block_size) as usize;
        let produced = match operation.kind {
            OperationKind::Replace => data.to_vec(),
            OperationKind::ReplaceXz | OperationKind::ReplaceBzip2 => match operation.kind.compression() {
                Some(algorithm) => algorithm.decompress(data).map_err(codec)?,
                None => unsupported(name, operation.kind)?,
            },
            OperationKind::Zero | OperationKind::Discard => vec![0u8; expected],
            OperationKind::SourceCopy => source,
            OperationKind::ByteDiff | OperationKind::ByteDiffCompressed => {
                apply_patch(&source, data).map_err(codec)?
            }
            kind => unsupported(name, kind)?,
        };
        if produced.len() != expected {
            return Err(ApplyError::Length {
                name: name.clone(),
                produced: produced.len(),
                expected,
            });
        }
        scatter(&mut image, &operation.dst_extents, block_size, &produced).ok_or_else(|| {
            ApplyError::OutOfBounds {
                name: name.clone(),
                what: "destination extents",
            }
        })?;
    }
    Ok(image)
}

fn unsupported(name: &str, kind: OperationKind) -> Result<Vec<u8>, ApplyError> {
    Err(ApplyError::Unsupported {
        name: name.to_owned(),
        kind,
    })
}

fn gather(image: &[u8], extents: &[Extent], block_size: u64) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    for extent in extents {
        let start = (extent.start_block * block_size) as usize;
        let end = (extent.end_block() * block_size) as usize;
        out.extend_from_slice(image.get(start..end)?);
    }
    Some(out)
}

fn scatter(image: &mut [u8], extents: &[Extent], block_size: u64, mut data: &[u8]) -> Option<()> {
    for extent in extents {
        let start = (extent.start_block * block_size) as usize;
        let len = (extent.num_blocks * block_size) as usize;
        let (head, rest) = data.split_at(len);
        image.get_mut(start..start + len)?.copy_from_slice(head);
        data = rest;
    }
    Some(())
}

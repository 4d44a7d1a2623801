//! xz helpers backed by liblzma.

use std::io::{Read, Write};

use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use crate::error::CodecError;

const CODEC: &str = "xz";

/// Preset handed to liblzma. Level 6 is the xz command-line default and keeps
/// the encoder dictionary at 8 MiB.
const XZ_PRESET: u32 = 6;

pub(crate) fn compress_to_vec(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = XzEncoder::new(Vec::with_capacity(data.len() / 2), XZ_PRESET);
    encoder
        .write_all(data)
        .map_err(|error| CodecError::io(CODEC, error))?;
    encoder.finish().map_err(|error| CodecError::io(CODEC, error))
}

pub(crate) fn decompress_to_vec(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = XzDecoder::new(data);
    let mut output = Vec::with_capacity(data.len() * 2);
    decoder
        .read_to_end(&mut output)
        .map_err(|error| CodecError::io(CODEC, error))?;
    Ok(output)
}

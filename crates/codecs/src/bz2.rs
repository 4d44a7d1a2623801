//! bzip2 helpers backed by libbz2.

use std::io::{Read, Write};

use bzip2::Compression;
use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;

use crate::error::CodecError;

const CODEC: &str = "bzip2";

pub(crate) fn compress_to_vec(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = BzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::best());
    encoder
        .write_all(data)
        .map_err(|error| CodecError::io(CODEC, error))?;
    encoder.finish().map_err(|error| CodecError::io(CODEC, error))
}

pub(crate) fn decompress_to_vec(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = BzDecoder::new(data);
    let mut output = Vec::with_capacity(data.len() * 2);
    decoder
        .read_to_end(&mut output)
        .map_err(|error| CodecError::io(CODEC, error))?;
    Ok(output)
}

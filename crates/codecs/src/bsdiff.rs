//! Byte-wise binary diff backends built on the bsdiff 4.x patch layout.
//!
//! A `BSDIFF40` patch is a 32-byte header followed by three bzip2 blocks:
//! the control stream, the diff bytes and the extra bytes. The control stream
//! is a list of `(diff_len, extra_len, seek)` triples. The engine needs that
//! stream to derive XOR merge hints, so both backends return it next to the
//! encoded patch.
//!
//! [`ZstdBsdiff`] produces the compressed variant: the same three streams,
//! each packed into a zstd frame behind a `ZSDIFF40` header.

use std::io::{Cursor, Read};

use bzip2::read::BzDecoder;
use qbsdiff::{Bsdiff as QBsdiff, Bspatch as QBspatch};

use crate::backend::ByteDiffer;
use crate::error::CodecError;

/// Magic prefix of bzip2-packed patches.
pub const BSDIFF_MAGIC: &[u8; 8] = b"BSDIFF40";
/// Magic prefix of zstd-packed patches.
pub const ZSTD_BSDIFF_MAGIC: &[u8; 8] = b"ZSDIFF40";

const HEADER_LEN: usize = 32;
const CONTROL_ENTRY_LEN: usize = 24;
const CODEC: &str = "bsdiff";

/// Default zstd level for the compressed variant.
pub const DEFAULT_ZSTD_LEVEL: i32 = 19;

/// One instruction of a bsdiff control stream.
///
/// Applying an entry adds `diff_len` diff bytes to the old data at the current
/// old offset, copies `extra_len` bytes verbatim, then moves the old offset by
/// `seek`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ControlEntry {
    /// Bytes produced by adding diff bytes to old bytes.
    pub diff_len: u64,
    /// Bytes copied verbatim from the extra block.
    pub extra_len: u64,
    /// Signed adjustment of the old offset after the entry.
    pub seek: i64,
}

impl ControlEntry {
    /// Creates a control entry.
    #[must_use]
    pub const fn new(diff_len: u64, extra_len: u64, seek: i64) -> Self {
        Self {
            diff_len,
            extra_len,
            seek,
        }
    }
}

/// Encoded patch plus the control stream it was built from.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BytePatch {
    /// Encoded patch bytes.
    pub data: Vec<u8>,
    /// Control stream of the patch.
    pub controls: Vec<ControlEntry>,
}

/// Container format of an encoded byte patch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PatchFormat {
    /// bzip2-packed `BSDIFF40`.
    Bsdiff40,
    /// zstd-packed `ZSDIFF40`.
    ZstdBsdiff,
}

/// A patch with its three streams unpacked.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecodedPatch {
    /// Format the patch was stored in.
    pub format: PatchFormat,
    /// Control stream.
    pub controls: Vec<ControlEntry>,
    /// Diff bytes.
    pub diff: Vec<u8>,
    /// Extra bytes.
    pub extra: Vec<u8>,
    /// Size of the data the patch reconstructs.
    pub new_size: u64,
}

impl DecodedPatch {
    /// Reconstructs the new data from `old`.
    ///
    /// Diff runs must read inside `old`.
    pub fn apply(&self, old: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut new = Vec::with_capacity(self.new_size as usize);
        let mut diff_pos = 0usize;
        let mut extra_pos = 0usize;
        let mut old_pos = 0i64;

        for entry in &self.controls {
            let diff_len = entry.diff_len as usize;
            let diff = self
                .diff
                .get(diff_pos..diff_pos + diff_len)
                .ok_or_else(|| CodecError::malformed(CODEC, "diff block shorter than control stream"))?;
            let source = if diff_len == 0 {
                &[][..]
            } else {
                usize::try_from(old_pos)
                    .ok()
                    .and_then(|start| old.get(start..start.checked_add(diff_len)?))
                    .ok_or_else(|| CodecError::malformed(CODEC, "diff run reads outside the source"))?
            };
            new.extend(
                diff.iter()
                    .zip(source)
                    .map(|(&delta, &old_byte)| delta.wrapping_add(old_byte)),
            );
            diff_pos += diff_len;
            old_pos += entry.diff_len as i64;

            let extra_len = entry.extra_len as usize;
            let extra = self
                .extra
                .get(extra_pos..extra_pos + extra_len)
                .ok_or_else(|| CodecError::malformed(CODEC, "extra block shorter than control stream"))?;
            new.extend_from_slice(extra);
            extra_pos += extra_len;
            old_pos += entry.seek;
        }

        if new.len() as u64 != self.new_size {
            return Err(CodecError::malformed(
                CODEC,
                format!("patch produced {} bytes, header declares {}", new.len(), self.new_size),
            ));
        }
        Ok(new)
    }
}

/// Plain bsdiff backend producing `BSDIFF40` patches.
#[derive(Clone, Copy, Debug, Default)]
pub struct Bsdiff;

impl ByteDiffer for Bsdiff {
    fn name(&self) -> &'static str {
        "bsdiff"
    }

    fn diff(&self, old: &[u8], new: &[u8]) -> Result<BytePatch, CodecError> {
        let data = bsdiff40(old, new)?;
        let decoded = decode_patch(&data)?;
        Ok(BytePatch {
            data,
            controls: decoded.controls,
        })
    }
}

/// bsdiff backend that stores the patch streams as zstd frames.
#[derive(Clone, Copy, Debug)]
pub struct ZstdBsdiff {
    level: i32,
}

impl ZstdBsdiff {
    /// Creates the backend with an explicit zstd level.
    #[must_use]
    pub const fn with_level(level: i32) -> Self {
        Self { level }
    }
}

impl Default for ZstdBsdiff {
    fn default() -> Self {
        Self::with_level(DEFAULT_ZSTD_LEVEL)
    }
}

impl ByteDiffer for ZstdBsdiff {
    fn name(&self) -> &'static str {
        "zstd-bsdiff"
    }

    fn diff(&self, old: &[u8], new: &[u8]) -> Result<BytePatch, CodecError> {
        let decoded = decode_patch(&bsdiff40(old, new)?)?;
        let data = encode_zstd_patch(&decoded, self.level)?;
        Ok(BytePatch {
            data,
            controls: decoded.controls,
        })
    }
}

fn bsdiff40(old: &[u8], new: &[u8]) -> Result<Vec<u8>, CodecError> {
    if old.is_empty() {
        return Err(CodecError::unsupported(CODEC, "no source data"));
    }
    let mut patch = Vec::new();
    QBsdiff::new(old, new)
        .compare(Cursor::new(&mut patch))
        .map_err(|error| CodecError::io(CODEC, error))?;
    Ok(patch)
}

/// Unpacks a `BSDIFF40` or `ZSDIFF40` patch.
pub fn decode_patch(patch: &[u8]) -> Result<DecodedPatch, CodecError> {
    if patch.len() < HEADER_LEN {
        return Err(CodecError::malformed(CODEC, "patch shorter than header"));
    }
    let format = match &patch[..8] {
        magic if magic == BSDIFF_MAGIC => PatchFormat::Bsdiff40,
        magic if magic == ZSTD_BSDIFF_MAGIC => PatchFormat::ZstdBsdiff,
        _ => return Err(CodecError::malformed(CODEC, "unknown patch magic")),
    };
    let control_len = header_length(patch, 8)?;
    let diff_len = header_length(patch, 16)?;
    let new_size = header_length(patch, 24)?;

    let control_end = HEADER_LEN
        .checked_add(control_len)
        .filter(|&end| end <= patch.len())
        .ok_or_else(|| CodecError::malformed(CODEC, "control block exceeds patch"))?;
    let diff_end = control_end
        .checked_add(diff_len)
        .filter(|&end| end <= patch.len())
        .ok_or_else(|| CodecError::malformed(CODEC, "diff block exceeds patch"))?;

    let blocks = [
        &patch[HEADER_LEN..control_end],
        &patch[control_end..diff_end],
        &patch[diff_end..],
    ];
    let [control, diff, extra] = blocks.map(|block| unpack_block(format, block));

    Ok(DecodedPatch {
        format,
        controls: parse_controls(&control?)?,
        diff: diff?,
        extra: extra?,
        new_size: new_size as u64,
    })
}

/// Applies an encoded patch to `old`.
///
/// `BSDIFF40` patches go through qbsdiff's patcher; `ZSDIFF40` patches are
/// unpacked and applied by [`DecodedPatch::apply`].
pub fn apply_patch(old: &[u8], patch: &[u8]) -> Result<Vec<u8>, CodecError> {
    if patch.starts_with(BSDIFF_MAGIC) {
        let patcher =
            QBspatch::new(patch).map_err(|error| CodecError::malformed(CODEC, error.to_string()))?;
        let mut new = Vec::new();
        patcher
            .apply(old, &mut new)
            .map_err(|error| CodecError::malformed(CODEC, error.to_string()))?;
        return Ok(new);
    }
    decode_patch(patch)?.apply(old)
}

fn encode_zstd_patch(decoded: &DecodedPatch, level: i32) -> Result<Vec<u8>, CodecError> {
    let mut control = Vec::with_capacity(decoded.controls.len() * CONTROL_ENTRY_LEN);
    for entry in &decoded.controls {
        control.extend_from_slice(&encode_offset(entry.diff_len as i64));
        control.extend_from_slice(&encode_offset(entry.extra_len as i64));
        control.extend_from_slice(&encode_offset(entry.seek));
    }
    let pack = |bytes: &[u8]| {
        zstd::stream::encode_all(bytes, level).map_err(|error| CodecError::io("zstd", error))
    };
    let control = pack(&control)?;
    let diff = pack(&decoded.diff)?;
    let extra = pack(&decoded.extra)?;

    let mut patch = Vec::with_capacity(HEADER_LEN + control.len() + diff.len() + extra.len());
    patch.extend_from_slice(ZSTD_BSDIFF_MAGIC);
    patch.extend_from_slice(&encode_offset(control.len() as i64));
    patch.extend_from_slice(&encode_offset(diff.len() as i64));
    patch.extend_from_slice(&encode_offset(decoded.new_size as i64));
    patch.extend_from_slice(&control);
    patch.extend_from_slice(&diff);
    patch.extend_from_slice(&extra);
    Ok(patch)
}

fn unpack_block(format: PatchFormat, block: &[u8]) -> Result<Vec<u8>, CodecError> {
    if block.is_empty() {
        return Ok(Vec::new());
    }
    match format {
        PatchFormat::Bsdiff40 => {
            let mut output = Vec::new();
            BzDecoder::new(block)
                .read_to_end(&mut output)
                .map_err(|error| CodecError::io("bzip2", error))?;
            Ok(output)
        }
        PatchFormat::ZstdBsdiff => {
            zstd::stream::decode_all(block).map_err(|error| CodecError::io("zstd", error))
        }
    }
}

fn parse_controls(block: &[u8]) -> Result<Vec<ControlEntry>, CodecError> {
    if block.len() % CONTROL_ENTRY_LEN != 0 {
        return Err(CodecError::malformed(CODEC, "truncated control entry"));
    }
    block
        .chunks_exact(CONTROL_ENTRY_LEN)
        .map(|chunk| {
            let diff_len = read_offset(&chunk[0..8]);
            let extra_len = read_offset(&chunk[8..16]);
            let seek = read_offset(&chunk[16..24]);
            if diff_len < 0 || extra_len < 0 {
                return Err(CodecError::malformed(CODEC, "negative control length"));
            }
            Ok(ControlEntry::new(diff_len as u64, extra_len as u64, seek))
        })
        .collect()
}

fn header_length(patch: &[u8], at: usize) -> Result<usize, CodecError> {
    let value = read_offset(&patch[at..at + 8]);
    usize::try_from(value).map_err(|_| CodecError::malformed(CODEC, "negative header length"))
}

/// Decodes bsdiff's sign-magnitude little-endian 64-bit integer.
fn read_offset(bytes: &[u8]) -> i64 {
    let mut magnitude = i64::from(bytes[7] & 0x7f);
    for &byte in bytes[..7].iter().rev() {
        magnitude = (magnitude << 8) | i64::from(byte);
    }
    if bytes[7] & 0x80 == 0 { magnitude } else { -magnitude }
}

fn encode_offset(value: i64) -> [u8; 8] {
    let mut magnitude = value.unsigned_abs();
    let mut bytes = [0u8; 8];
    for byte in &mut bytes {
        *byte = (magnitude & 0xff) as u8;
        magnitude >>= 8;
    }
    if value < 0 {
        bytes[7] |= 0x80;
    }
    bytes
}

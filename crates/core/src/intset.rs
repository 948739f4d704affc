//! Integer set codec
//!
//! Compact encoding for hit sets:
//!
//! ```text
//! |S| <= literal_max:   "<b36>\t<b36>\t..."           (plain base-36 literals)
//! |S| >  literal_max:   FF FF FF FF <raw DEFLATE>     (bitmask, bit i <=> i in S)
//! ```
//!
//! The bitmask stores value `i` in bit `i % 8` (LSB first) of byte `i / 8`.
//!
//! Container lines are text, so a packed blob travels as standard base64.
//! The base64 rendering of the marker always starts with `/////`, and `/`
//! is never a base-36 digit, which keeps the two value forms unambiguous.

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{Error, Result};
use crate::hitset::{HitSet, MsgIdx};

/// Reserved prefix of a compressed bitmask blob
pub const COMPRESSED_MARKER: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];

/// First character of a base64-rendered blob value
const BLOB_TEXT_PREFIX: char = '/';

/// Largest bitmask an inflated blob may produce (covers every `u32`)
const MAX_BITMASK_BYTES: u64 = (MsgIdx::MAX as u64) / 8 + 1;

/// Bitmask bytes handled at a time by [`pack`] and [`unpack`]
const BITMASK_CHUNK: usize = 64 * 1024;

// ============================================================================
// Base-36
// ============================================================================

/// Render a message position in base 36 (lowercase).
pub fn to_base36(mut value: MsgIdx) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::with_capacity(7);
    while value > 0 {
        buf.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    buf.reverse();
    // Only ASCII digits were pushed
    buf.into_iter().map(char::from).collect()
}

/// Parse a base-36 message position. Accepts either case.
pub fn from_base36(text: &str) -> Option<MsgIdx> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }
    MsgIdx::from_str_radix(text, 36).ok()
}

// ============================================================================
// Pack / Unpack
// ============================================================================

/// True when `data` is a compressed bitmask blob.
pub fn is_compressed(data: &[u8]) -> bool {
    data.starts_with(&COMPRESSED_MARKER)
}

/// Encode a hit set.
///
/// Sets with at most `literal_max` members become tab-separated base-36
/// literals; larger sets become a marker-prefixed DEFLATE bitmask.
///
/// The bitmask spans `max / 8 + 1` bytes. It is fed to the compressor in
/// fixed-size chunks, so memory stays bounded even for a sparse set near
/// `MsgIdx::MAX`; the work still grows with the largest id.
pub fn pack(set: &HitSet, literal_max: usize) -> Result<Vec<u8>> {
    if set.len() <= literal_max {
        let literals: Vec<String> = set.iter().map(to_base36).collect();
        return Ok(literals.join("\t").into_bytes());
    }

    let mut out = Vec::with_capacity(COMPRESSED_MARKER.len() + set.len() / 4);
    out.extend_from_slice(&COMPRESSED_MARKER);
    let mut encoder = DeflateEncoder::new(out, Compression::default());

    let mut chunk = vec![0u8; BITMASK_CHUNK];
    let mut chunk_start = 0usize;
    let mut used = 0usize;
    for id in set.iter() {
        let byte = id as usize / 8;
        while byte >= chunk_start + BITMASK_CHUNK {
            encoder.write_all(&chunk)?;
            chunk.fill(0);
            chunk_start += BITMASK_CHUNK;
        }
        chunk[byte - chunk_start] |= 1 << (id % 8);
        used = byte - chunk_start + 1;
    }
    encoder.write_all(&chunk[..used])?;
    Ok(encoder.finish()?)
}

/// Decode bytes produced by [`pack`].
pub fn unpack(data: &[u8]) -> Result<HitSet> {
    if is_compressed(data) {
        let mut decoder =
            DeflateDecoder::new(&data[COMPRESSED_MARKER.len()..]).take(MAX_BITMASK_BYTES + 1);
        let mut chunk = vec![0u8; BITMASK_CHUNK];
        let mut offset = 0u64;
        let mut set = HitSet::new();
        loop {
            let n = match decoder.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::corruption(format!("bad compressed hit set: {}", e))),
            };
            if offset + n as u64 > MAX_BITMASK_BYTES {
                return Err(Error::corruption("compressed hit set exceeds id range"));
            }
            for (i, byte) in chunk[..n].iter().enumerate() {
                if *byte == 0 {
                    continue;
                }
                let base = (offset + i as u64) * 8;
                for bit in 0..8 {
                    if byte & (1 << bit) != 0 {
                        set.insert((base + bit) as MsgIdx);
                    }
                }
            }
            offset += n as u64;
        }
        return Ok(set);
    }

    let text = std::str::from_utf8(data)
        .map_err(|_| Error::corruption("literal hit set is not UTF-8"))?;
    decode_literals(text.split('\t'))
}

fn decode_literals<'a>(values: impl Iterator<Item = &'a str>) -> Result<HitSet> {
    let mut set = HitSet::new();
    for value in values.filter(|v| !v.is_empty()) {
        let id = from_base36(value)
            .ok_or_else(|| Error::corruption(format!("bad base-36 value {:?}", value)))?;
        set.insert(id);
    }
    Ok(set)
}

// ============================================================================
// Text values (container line form)
// ============================================================================

/// Render a hit set as the tab-separated value part of a container line.
pub fn encode_values(set: &HitSet, literal_max: usize) -> Result<String> {
    let packed = pack(set, literal_max)?;
    if is_compressed(&packed) {
        Ok(STANDARD.encode(&packed))
    } else {
        String::from_utf8(packed).map_err(|_| Error::corruption("non-ASCII literal output"))
    }
}

/// Parse the value fields of a container line.
///
/// If the first value is a blob, the whole set is taken from it and any
/// further fields are ignored; otherwise every field is a base-36 literal.
pub fn decode_values<'a, I>(values: I) -> Result<HitSet>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut values = values.into_iter().peekable();
    match values.peek() {
        Some(first) if first.starts_with(BLOB_TEXT_PREFIX) => {
            let packed = STANDARD
                .decode(first.as_bytes())
                .map_err(|e| Error::corruption(format!("bad blob encoding: {}", e)))?;
            if !is_compressed(&packed) {
                return Err(Error::corruption("blob value without marker"));
            }
            unpack(&packed)
        }
        _ => decode_literals(values),
    }
}

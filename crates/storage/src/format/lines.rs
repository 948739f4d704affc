//! Line format shared by containers and the journal
//!
//! ```text
//! <signature>\t<value>[\t<value>...]\n     entry (values unioned on load)
//! -<signature>\t<value>[\t<value>...]\n    removal tombstone (journal only)
//! @<base64>\n                              encoded chunk (journal, non-identity codec)
//! ```
//!
//! `<value>` is a base-36 literal or a base64 compressed blob, see
//! `kwstore_core::intset`. Parsing never fails as a whole: a corrupt line
//! is logged and skipped so a damaged shard only loses recall for the
//! signatures on that line. A final line without its newline is a torn
//! append and is dropped the same way.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use kwstore_core::{intset, Error, HitSet, Result};
use tracing::warn;

use crate::codec::StorageCodec;

const TOMBSTONE_MARKER: char = '-';
const CHUNK_MARKER: char = '@';

/// One parsed line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Signature (or the reserved journal key)
    pub sig: String,
    /// Positions on the line
    pub set: HitSet,
    /// True for a removal tombstone
    pub removal: bool,
}

/// Render one line, including the trailing newline.
pub fn render_record(sig: &str, set: &HitSet, literal_max: usize, removal: bool) -> Result<String> {
    let values = intset::encode_values(set, literal_max)?;
    let mut line = String::with_capacity(sig.len() + values.len() + 3);
    if removal {
        line.push(TOMBSTONE_MARKER);
    }
    line.push_str(sig);
    line.push('\t');
    line.push_str(&values);
    line.push('\n');
    Ok(line)
}

/// Render an encoded journal chunk as one line.
pub fn render_chunk(encoded: &[u8]) -> String {
    format!("{}{}\n", CHUNK_MARKER, STANDARD.encode(encoded))
}

/// Parse container (or plain journal) text, skipping damaged lines.
pub fn parse_records(text: &str, source: &Path) -> Vec<Record> {
    let mut records = Vec::new();
    for (lineno, line) in complete_lines(text, source) {
        match parse_line(line) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(e) => warn!(
                path = %source.display(),
                line = lineno,
                error = %e,
                "Skipping corrupt posting list line"
            ),
        }
    }
    records
}

/// Parse journal bytes, unwrapping encoded chunks through `codec`.
///
/// A chunk that fails to decode is a hard error: treating it as empty would
/// silently drop index data.
pub fn parse_journal(data: &[u8], codec: &dyn StorageCodec, source: &Path) -> Result<Vec<Record>> {
    let text = String::from_utf8_lossy(data);
    let mut records = Vec::new();
    for (lineno, line) in complete_lines(&text, source) {
        if let Some(chunk) = line.strip_prefix(CHUNK_MARKER) {
            let encoded = match STANDARD.decode(chunk.as_bytes()) {
                Ok(encoded) => encoded,
                Err(e) => {
                    warn!(path = %source.display(), line = lineno, error = %e, "Skipping damaged journal chunk");
                    continue;
                }
            };
            let plain = codec.decode(&encoded).map_err(|e| Error::Decode {
                path: source.to_path_buf(),
                detail: e.to_string(),
            })?;
            records.extend(parse_records(&String::from_utf8_lossy(&plain), source));
            continue;
        }
        match parse_line(line) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(e) => warn!(
                path = %source.display(),
                line = lineno,
                error = %e,
                "Skipping corrupt journal line"
            ),
        }
    }
    Ok(records)
}

/// Non-empty, newline-terminated lines with their 1-based numbers.
fn complete_lines<'a>(text: &'a str, source: &Path) -> impl Iterator<Item = (usize, &'a str)> {
    let torn = !text.is_empty() && !text.ends_with('\n');
    let count = text.lines().count();
    if torn {
        warn!(path = %source.display(), line = count, "Dropping torn final line");
    }
    let keep = if torn { count - 1 } else { count };
    text.lines()
        .take(keep)
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim_end_matches('\r')))
        .filter(|(_, line)| !line.is_empty())
}

fn parse_line(line: &str) -> Result<Option<Record>> {
    let mut fields = line.split('\t');
    let head = fields.next().unwrap_or_default();
    let (sig, removal) = match head.strip_prefix(TOMBSTONE_MARKER) {
        Some(sig) => (sig, true),
        None => (head, false),
    };
    if sig.is_empty() || sig.contains(char::is_whitespace) {
        return Err(Error::corruption("missing signature"));
    }
    let set = intset::decode_values(fields)?;
    if set.is_empty() {
        return Ok(None);
    }
    Ok(Some(Record {
        sig: sig.to_string(),
        set,
        removal,
    }))
}

//! On-disk layout of the posting list store
//!
//! ```text
//! <index dir>/
//!   kw-journal.dat            write journal (append log)
//!   postings/
//!     pl-root.dat             container for the empty prefix
//!     pl-<prefix>.dat         container for every other prefix
//!     pl-<prefix>.dat.tmp     in-flight write, ignored when scanning
//! ```
//!
//! Container and journal contents use the line format in [`lines`].
//! Whole files are written via temp + fsync + rename so a crash never
//! leaves a half-written container behind.

pub mod lines;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub use lines::{parse_records, render_record, Record};

/// Sub-directory holding container files
pub const POSTINGS_DIR: &str = "postings";

/// File name of the write journal
pub const JOURNAL_FILE_NAME: &str = "kw-journal.dat";

const CONTAINER_FILE_PREFIX: &str = "pl-";
const CONTAINER_FILE_SUFFIX: &str = ".dat";
const ROOT_CONTAINER_NAME: &str = "root";
const TMP_SUFFIX: &str = "tmp";

/// File name for the container owning `prefix`.
pub fn container_file_name(prefix: &str) -> String {
    let stem = if prefix.is_empty() {
        ROOT_CONTAINER_NAME
    } else {
        prefix
    };
    format!("{}{}{}", CONTAINER_FILE_PREFIX, stem, CONTAINER_FILE_SUFFIX)
}

/// Recover the prefix from a container file name.
///
/// Returns `None` for temp files, the journal and anything else that is not
/// a container.
pub fn parse_container_file_name(name: &str) -> Option<String> {
    let stem = name
        .strip_prefix(CONTAINER_FILE_PREFIX)?
        .strip_suffix(CONTAINER_FILE_SUFFIX)?;
    if stem == ROOT_CONTAINER_NAME {
        return Some(String::new());
    }
    if stem.is_empty() || !stem.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return None;
    }
    Some(stem.to_string())
}

/// Temp path used while writing `path`.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(TMP_SUFFIX);
    PathBuf::from(name)
}

/// Write `data` to `path` atomically (temp + optional fsync + rename).
///
/// On failure the previous contents of `path` are untouched.
pub fn write_atomic(path: &Path, data: &[u8], fsync: bool) -> io::Result<()> {
    let tmp = write_tmp(path, data, fsync)?;
    std::fs::rename(&tmp, path)
}

/// First half of [`write_atomic`]: write the temp file for `path` and
/// return its location. The caller renames it into place.
pub fn write_tmp(path: &Path, data: &[u8], fsync: bool) -> io::Result<PathBuf> {
    let dir = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;

    let tmp = tmp_path(path);
    let mut file = File::create(&tmp)?;
    file.write_all(data)?;
    if fsync {
        file.sync_all()?;
    }
    Ok(tmp)
}

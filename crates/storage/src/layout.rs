//! Container layout: which prefixes currently have a file on disk
//!
//! A signature is owned by the container whose prefix is the longest one
//! present in the layout. The empty prefix (root container) always owns
//! whatever nothing longer claims, whether or not its file exists.
//!
//! The layout is scanned once when the store opens and then kept in step
//! with every container write and delete, so resolving a signature never
//! touches the filesystem.

use std::collections::BTreeSet;
use std::io;
use std::path::Path;

use parking_lot::RwLock;

use crate::format::parse_container_file_name;

/// Set of prefixes that have a container file
#[derive(Debug, Default)]
pub struct Layout {
    prefixes: RwLock<BTreeSet<String>>,
}

impl Layout {
    /// Create an empty layout (nothing on disk)
    pub fn new() -> Self {
        Layout {
            prefixes: RwLock::new(BTreeSet::new()),
        }
    }

    /// Build the layout from the container files in `dir`.
    ///
    /// A missing directory is an empty layout.
    pub fn scan(dir: &Path) -> io::Result<Self> {
        let mut prefixes = BTreeSet::new();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Layout::new()),
            Err(e) => return Err(e),
        };
        for entry in entries {
            let entry = entry?;
            if let Some(prefix) = entry.file_name().to_str().and_then(parse_container_file_name) {
                prefixes.insert(prefix);
            }
        }
        Ok(Layout {
            prefixes: RwLock::new(prefixes),
        })
    }

    /// Prefix of the container owning `sig`.
    ///
    /// Any text is accepted; cut points that are not char boundaries are
    /// skipped (published prefixes are hex, so they never match there).
    pub fn resolve(&self, sig: &str) -> String {
        let prefixes = self.prefixes.read();
        (1..=sig.len())
            .rev()
            .filter_map(|len| sig.get(..len))
            .find(|prefix| prefixes.contains(*prefix))
            .unwrap_or("")
            .to_string()
    }

    /// True when `sig` belongs in the container with `prefix`.
    ///
    /// That is: `sig` falls under `prefix` and no longer published prefix
    /// claims it. A prefix that is not published yet (a split child being
    /// written) still owns its signatures.
    pub fn owns(&self, prefix: &str, sig: &str) -> bool {
        sig.starts_with(prefix) && self.resolve(sig).len() <= prefix.len()
    }

    /// True when `prefix` has a file on disk
    pub fn contains(&self, prefix: &str) -> bool {
        self.prefixes.read().contains(prefix)
    }

    /// Record that `prefix` now has a file
    pub fn insert(&self, prefix: &str) {
        self.prefixes.write().insert(prefix.to_string());
    }

    /// Record that the file for `prefix` is gone
    pub fn remove(&self, prefix: &str) {
        self.prefixes.write().remove(prefix);
    }

    /// All prefixes with a file, in sorted order
    pub fn prefixes(&self) -> Vec<String> {
        self.prefixes.read().iter().cloned().collect()
    }

    /// Number of container files
    pub fn len(&self) -> usize {
        self.prefixes.read().len()
    }

    /// True when no container file exists
    pub fn is_empty(&self) -> bool {
        self.prefixes.read().is_empty()
    }
}

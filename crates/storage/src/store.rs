//! Container store: the postings directory, its codec and its layout
//!
//! All container file I/O goes through here so that every write updates
//! the layout and every byte passes through the codec.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kwstore_core::{Error, Limits, Result};
use tracing::debug;

use crate::codec::StorageCodec;
use crate::format::{container_file_name, write_atomic, POSTINGS_DIR};
use crate::layout::Layout;

/// Directory of container files plus the state needed to read and write them
pub struct ContainerStore {
    dir: PathBuf,
    codec: Arc<dyn StorageCodec>,
    layout: Layout,
    limits: Limits,
    fsync: bool,
}

impl ContainerStore {
    /// Open (creating if needed) the postings directory under `root`.
    pub fn open(
        root: &Path,
        codec: Arc<dyn StorageCodec>,
        limits: Limits,
        fsync: bool,
    ) -> Result<Self> {
        limits.validate()?;
        let dir = root.join(POSTINGS_DIR);
        std::fs::create_dir_all(&dir)?;
        let layout = Layout::scan(&dir)?;
        debug!(dir = %dir.display(), containers = layout.len(), "Opened container store");
        Ok(ContainerStore {
            dir,
            codec,
            layout,
            limits,
            fsync,
        })
    }

    /// Postings directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the container file for `prefix`
    pub fn path_for(&self, prefix: &str) -> PathBuf {
        self.dir.join(container_file_name(prefix))
    }

    /// Prefixes that currently have a file
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Size limits
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Codec applied to every file
    pub fn codec(&self) -> &Arc<dyn StorageCodec> {
        &self.codec
    }

    /// Whether writes are fsynced before the rename
    pub fn fsync(&self) -> bool {
        self.fsync
    }

    /// Read and decode the file for `prefix`.
    ///
    /// `Ok(None)` when the file does not exist; decode failures are errors.
    pub fn read_file(&self, prefix: &str) -> Result<Option<String>> {
        let path = self.path_for(prefix);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let plain = self.codec.decode(&raw).map_err(|e| Error::Decode {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        Ok(Some(String::from_utf8_lossy(&plain).into_owned()))
    }

    /// Encode and atomically write the file for `prefix`, then publish it.
    pub fn write_file(&self, prefix: &str, text: &str) -> Result<usize> {
        let encoded = self.codec.encode(text.as_bytes());
        write_atomic(&self.path_for(prefix), &encoded, self.fsync)?;
        self.layout.insert(prefix);
        Ok(encoded.len())
    }

    /// Delete the file for `prefix`, returning true if one existed.
    ///
    /// The layout forgets the prefix first so that no reader is routed to a
    /// file that is about to disappear.
    pub fn delete_file(&self, prefix: &str) -> Result<bool> {
        self.layout.remove(prefix);
        match std::fs::remove_file(self.path_for(prefix)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => {
                self.layout.insert(prefix);
                Err(e.into())
            }
        }
    }
}

//! The posting list engine
//!
//! `Engine` owns everything that would otherwise be process-wide state: the
//! term hasher, the container cache, the write journal, the structure lock
//! and the shutdown flag. Independent engines can coexist in one process.
//!
//! # Lock order
//!
//! structure → journal → container → (cache | layout)
//!
//! Ordinary operations take the structure lock shared, exactly once per
//! public call (the lock is fair, so a nested shared acquisition could
//! block behind a waiting writer); merging containers takes it exclusively.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kwstore_core::{Error, HitSet, MsgIdx, Result, Signature, SignatureHasher};
use kwstore_storage::{ContainerStore, IdentityCodec, StorageCodec};
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::cache::{ContainerCache, FlushReport};
use crate::config::{EngineConfig, CONFIG_FILE_NAME};
use crate::journal::Journal;
use crate::optimizer::{self, OptimizeOptions, OptimizeReport};
use crate::posting_list::PostingList;

/// Point-in-time engine counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Signatures with pending journal changes
    pub journal_signatures: usize,
    /// Pending journal positions (additions and removals)
    pub journal_items: usize,
    /// Journal file size in bytes
    pub journal_bytes: u64,
    /// Containers currently cached
    pub cached_containers: usize,
    /// Cached containers with unsaved changes
    pub dirty_containers: usize,
    /// Container files on disk
    pub container_files: usize,
    /// Highest message position ever appended
    pub max_msg_id: Option<MsgIdx>,
}

/// Posting list engine over one data directory
pub struct Engine {
    dir: PathBuf,
    config: EngineConfig,
    hasher: SignatureHasher,
    cache: ContainerCache,
    journal: Journal,
    structure: RwLock<()>,
    shutdown: AtomicBool,
    closed: AtomicBool,
}

impl Engine {
    /// Open the engine in `dir` with an explicit configuration.
    ///
    /// `key` is required when `config.obfuscate_index` is set and ignored
    /// otherwise.
    pub fn open<P: AsRef<Path>>(
        dir: P,
        config: EngineConfig,
        codec: Arc<dyn StorageCodec>,
        key: Option<&[u8]>,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        config.validate()?;
        std::fs::create_dir_all(&dir)?;

        let hasher = match (config.obfuscate_index, key) {
            (true, Some(key)) => SignatureHasher::with_key(config.signature_len, key)?,
            (true, None) => {
                return Err(Error::InvalidConfig(
                    "obfuscate_index is set but no key was supplied".to_string(),
                ))
            }
            (false, _) => SignatureHasher::new(config.signature_len)?,
        };

        let store = ContainerStore::open(&dir, Arc::clone(&codec), config.limits(), config.fsync)?;
        let cache = ContainerCache::new(store, config.dirty_grace(), config.expire_after());
        let journal = Journal::open(&dir, codec, config.literal_max, config.fsync)?;

        info!(
            dir = %dir.display(),
            containers = cache.store().layout().len(),
            journal_signatures = journal.len(),
            keyed = hasher.is_keyed(),
            "Opened posting list engine"
        );
        Ok(Engine {
            dir,
            config,
            hasher,
            cache,
            journal,
            structure: RwLock::new(()),
            shutdown: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// Open `dir` using its `kwstore.toml` (written with defaults when
    /// missing), the identity codec and no hashing key.
    pub fn open_default<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let config_path = dir.join(CONFIG_FILE_NAME);
        EngineConfig::write_default_if_missing(&config_path)?;
        let config = EngineConfig::from_file(&config_path)?;
        Self::open(dir, config, Arc::new(IdentityCodec), None)
    }

    /// Data directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Signature of `term`
    pub fn signature(&self, term: &str) -> Signature {
        self.hasher.hash(term)
    }

    /// Handle for one term
    pub fn posting_list(&self, term: &str) -> PostingList<'_> {
        PostingList::new(self, self.signature(term))
    }

    /// Handle for an already computed signature
    pub fn posting_list_for(&self, sig: Signature) -> PostingList<'_> {
        PostingList::new(self, sig)
    }

    /// Associate `ids` with `term` (journal fast path).
    pub fn append<I: IntoIterator<Item = MsgIdx>>(&self, term: &str, ids: I) -> Result<usize> {
        self.append_signature(&self.signature(term), ids)
    }

    /// Associate `ids` with a signature (journal fast path).
    pub fn append_signature<I: IntoIterator<Item = MsgIdx>>(
        &self,
        sig: &Signature,
        ids: I,
    ) -> Result<usize> {
        let ids: HitSet = ids.into_iter().collect();
        let _structure = self.structure.read();
        self.journal.append(sig, &ids)
    }

    /// Move the journal entry for `sig` into its container now.
    pub fn migrate(&self, sig: &Signature) -> Result<bool> {
        let _structure = self.structure.read();
        self.journal.migrate(sig, &self.cache)
    }

    /// Run an optimize pass.
    pub fn optimize(&self, options: OptimizeOptions) -> Result<OptimizeReport> {
        optimizer::run(self, options)
    }

    /// Flush every dirty container, keeping the `keep` most recent cached.
    pub fn flush_all(&self, keep: usize) -> Result<FlushReport> {
        let _structure = self.structure.read();
        self.cache.flush_all(keep)
    }

    /// Ask running optimizer passes to stop at their next iteration.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// True once shutdown was requested
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Highest message position ever appended
    pub fn max_msg_id(&self) -> Option<MsgIdx> {
        self.journal.max_msg_id()
    }

    /// Current counters
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            journal_signatures: self.journal.len(),
            journal_items: self.journal.pending_items(),
            journal_bytes: self.journal.file_size(),
            cached_containers: self.cache.len(),
            dirty_containers: self.cache.dirty_count(),
            container_files: self.cache.store().layout().len(),
            max_msg_id: self.journal.max_msg_id(),
        }
    }

    /// Stop maintenance and write every dirty container.
    ///
    /// The journal needs no flush: every append is already on disk.
    pub fn close(&self) -> Result<()> {
        self.request_shutdown();
        let report = self.flush_all(0)?;
        self.closed.store(true, Ordering::SeqCst);
        info!(dir = %self.dir.display(), flushed = report.flushed, "Closed posting list engine");
        Ok(())
    }

    pub(crate) fn structure(&self) -> &RwLock<()> {
        &self.structure
    }

    pub(crate) fn cache(&self) -> &ContainerCache {
        &self.cache
    }

    pub(crate) fn journal(&self) -> &Journal {
        &self.journal
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.close() {
            warn!(dir = %self.dir.display(), error = %e, "Failed to flush containers on drop");
        }
    }
}

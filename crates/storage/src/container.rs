//! Posting list containers
//!
//! A container is one shard file: every signature it owns mapped to that
//! signature's hit set. It is the unit of on-disk storage, locking and
//! compaction.
//!
//! # Locking
//!
//! Each container has its own reentrant lock. Callers that need several
//! operations to be atomic (for example "check I still own this signature,
//! then add") hold [`PostingContainer::lock`] and call the ordinary methods
//! underneath it; those re-acquire the same lock on the same thread.
//!
//! # Dirty tracking
//!
//! Dirty state is a changes counter (IDs added or removed since the last
//! save) plus the instant the container first became dirty. The cache uses
//! both to decide what to flush.
//!
//! # Retirement
//!
//! A container evicted from the cache, or whose file was deleted, is
//! *retired*. Holders of a stale `Arc` see the flag after locking and go
//! back through the cache, so there is never more than one live in-memory
//! copy per file.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use kwstore_core::{HitSet, MsgIdx, Result, Signature};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::format::{parse_records, render_record};
use crate::splitter;
use crate::store::ContainerStore;

/// Signature → hit set mapping held by a container
pub type Entries = FxHashMap<String, HitSet>;

pub(crate) struct ContainerState {
    pub(crate) entries: Entries,
    changes: usize,
    dirty_since: Option<Instant>,
}

impl ContainerState {
    fn new(entries: Entries) -> Self {
        ContainerState {
            entries,
            changes: 0,
            dirty_since: None,
        }
    }

    fn touch(&mut self, affected: usize) {
        if affected > 0 {
            self.changes += affected;
            self.dirty_since.get_or_insert_with(Instant::now);
        }
    }
}

/// Held lock on a container (reentrant on the owning thread)
pub struct ContainerLock<'a> {
    _guard: ReentrantMutexGuard<'a, RefCell<ContainerState>>,
}

/// Result of [`PostingContainer::save`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOutcome {
    /// The container file was (re)written
    pub written: bool,
    /// The container file was deleted because nothing was left in it
    pub deleted: bool,
    /// Prefixes of child containers created by splitting
    pub children: Vec<String>,
    /// Entries left in this container after the save
    pub items: usize,
}

/// One shard of the posting list index
pub struct PostingContainer {
    prefix: String,
    state: ReentrantMutex<RefCell<ContainerState>>,
    retired: AtomicBool,
}

impl PostingContainer {
    /// An empty container for `prefix` (nothing loaded, nothing dirty).
    pub fn empty(prefix: &str) -> Self {
        Self::from_entries(prefix, Entries::default())
    }

    pub(crate) fn from_entries(prefix: &str, entries: Entries) -> Self {
        PostingContainer {
            prefix: prefix.to_string(),
            state: ReentrantMutex::new(RefCell::new(ContainerState::new(entries))),
            retired: AtomicBool::new(false),
        }
    }

    /// Load the container for `prefix`.
    ///
    /// A missing file gives an empty container. Lines for signatures the
    /// layout routes elsewhere (left behind by an interrupted split) are
    /// dropped and the container is marked dirty so the next save cleans
    /// the file. Decode failures propagate.
    pub fn load(store: &ContainerStore, prefix: &str) -> Result<Self> {
        let text = match store.read_file(prefix)? {
            Some(text) => text,
            None => return Ok(Self::empty(prefix)),
        };

        let path = store.path_for(prefix);
        let layout = store.layout();
        let mut entries = Entries::default();
        let mut stale = 0;
        for record in parse_records(&text, &path) {
            if record.removal
                || Signature::parse(&record.sig).is_err()
                || !layout.owns(prefix, &record.sig)
            {
                stale += record.set.len();
                continue;
            }
            entries.entry(record.sig).or_default().union_with(&record.set);
        }

        debug!(prefix = %prefix, signatures = entries.len(), stale, "Loaded container");
        let container = Self::from_entries(prefix, entries);
        if stale > 0 {
            container.state.lock().borrow_mut().touch(stale);
        }
        Ok(container)
    }

    /// Prefix this container is responsible for
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Hold this container's lock until the returned guard drops.
    pub fn lock(&self) -> ContainerLock<'_> {
        ContainerLock {
            _guard: self.state.lock(),
        }
    }

    /// Hit set stored for `sig` (empty if absent)
    pub fn get(&self, sig: &Signature) -> HitSet {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.entries.get(sig.as_str()).cloned().unwrap_or_default()
    }

    /// Add positions for `sig`, returning how many were new.
    pub fn add<I: IntoIterator<Item = MsgIdx>>(&self, sig: &Signature, ids: I) -> usize {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        let added = state
            .entries
            .entry(sig.as_str().to_string())
            .or_default()
            .extend_from(ids);
        state.touch(added);
        added
    }

    /// Remove positions for `sig`, returning how many were present.
    ///
    /// An emptied entry is dropped immediately; the file follows on save.
    pub fn remove<I: IntoIterator<Item = MsgIdx>>(&self, sig: &Signature, ids: I) -> usize {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        let (removed, now_empty) = match state.entries.get_mut(sig.as_str()) {
            Some(set) => (set.remove_all(ids), set.is_empty()),
            None => return 0,
        };
        if now_empty {
            state.entries.remove(sig.as_str());
        }
        state.touch(removed);
        removed
    }

    /// Copy of every entry (signature, set)
    pub fn snapshot(&self) -> Vec<(String, HitSet)> {
        let guard = self.state.lock();
        let state = guard.borrow();
        state
            .entries
            .iter()
            .map(|(sig, set)| (sig.clone(), set.clone()))
            .collect()
    }

    /// Add a batch of entries taken from another container.
    pub fn absorb(&self, entries: Vec<(String, HitSet)>) -> usize {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        let mut added = 0;
        for (sig, set) in entries {
            added += state.entries.entry(sig).or_default().union_with(&set);
        }
        state.touch(added);
        added
    }

    /// IDs changed since the last save
    pub fn changes(&self) -> usize {
        self.state.lock().borrow().changes
    }

    /// When the container first became dirty, if it is dirty
    pub fn dirty_since(&self) -> Option<Instant> {
        self.state.lock().borrow().dirty_since
    }

    /// True when there are unsaved changes
    pub fn is_dirty(&self) -> bool {
        self.changes() > 0
    }

    /// Sum of all hit-set sizes
    pub fn total_items(&self) -> usize {
        let guard = self.state.lock();
        let state = guard.borrow();
        total_items(&state.entries)
    }

    /// Number of distinct signatures held
    pub fn signature_count(&self) -> usize {
        self.state.lock().borrow().entries.len()
    }

    /// True once evicted or deleted; holders must go back to the cache.
    ///
    /// Readable without taking the container lock.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Mark as retired
    pub fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    /// True when this live container is where `sig` is routed right now.
    pub fn owns(&self, store: &ContainerStore, sig: &Signature) -> bool {
        !self.is_retired() && store.layout().resolve(sig.as_str()) == self.prefix
    }

    /// Write this container to disk.
    ///
    /// Oversized containers are split first: each peeled-off child is written
    /// (and published in the layout) before the remainder, so every entry is
    /// on disk somewhere at every instant. An empty remainder deletes the
    /// file instead and retires this instance. Retired containers are never
    /// written.
    pub fn save(&self, store: &ContainerStore) -> Result<SaveOutcome> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        if self.is_retired() {
            return Ok(SaveOutcome::default());
        }

        let layout = store.layout();
        let before = state.entries.len();
        state
            .entries
            .retain(|sig, set| !set.is_empty() && layout.owns(&self.prefix, sig));
        if state.entries.len() != before {
            debug!(prefix = %self.prefix, dropped = before - state.entries.len(), "Dropped entries owned elsewhere");
        }

        let mut outcome = SaveOutcome::default();
        if total_items(&state.entries) > store.limits().max_items {
            outcome.children = splitter::split_oversized(store, &self.prefix, &mut state.entries)?;
        }

        if state.entries.is_empty() {
            outcome.deleted = store.delete_file(&self.prefix)?;
            if outcome.deleted {
                // No file backs this instance any more
                self.retire();
                debug!(prefix = %self.prefix, "Deleted empty container");
            }
        } else {
            let text = render_entries(&state.entries, store.limits().literal_max)?;
            let bytes = store.write_file(&self.prefix, &text)?;
            outcome.written = true;
            debug!(prefix = %self.prefix, signatures = state.entries.len(), bytes, "Saved container");
        }

        outcome.items = total_items(&state.entries);
        state.changes = 0;
        state.dirty_since = None;
        Ok(outcome)
    }
}

/// Sum of hit-set sizes
pub(crate) fn total_items(entries: &Entries) -> usize {
    entries.values().map(HitSet::len).sum()
}

/// Render entries in signature order.
pub(crate) fn render_entries(entries: &Entries, literal_max: usize) -> Result<String> {
    let mut sigs: Vec<&String> = entries.keys().collect();
    sigs.sort();
    let mut text = String::new();
    for sig in sigs {
        text.push_str(&render_record(sig, &entries[sig], literal_max, false)?);
    }
    Ok(text)
}

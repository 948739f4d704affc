//! Write journal
//!
//! Every new association lands here first: one append-only file
//! (`kw-journal.dat`) plus an always-resident in-memory map. The optimizer
//! later migrates each signature into the container that owns it.
//!
//! The journal keeps two maps per signature: pending additions and pending
//! removals (written to the file as `-sig` tombstones). They are kept
//! disjoint, so a reader computes
//!
//! ```text
//! hits = (additions ∪ container) − removals
//! ```
//!
//! Replaying the file in order on open rebuilds both maps. The reserved
//! `_MAX_MSGID_` entry records the highest position ever appended and is
//! never migrated.
//!
//! # Locking
//!
//! The journal owns exactly one reentrant lock. It guards both maps and the
//! append handle, so a line is on disk before any reader can observe it in
//! memory. Migration holds it while adding to the container and only drops
//! the journal entry afterwards.

use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kwstore_core::{HitSet, MsgIdx, Result, Signature, MAX_MSGID_SIGNATURE};
use kwstore_storage::format::{lines, write_tmp, JOURNAL_FILE_NAME};
use kwstore_storage::StorageCodec;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::cache::ContainerCache;

struct JournalState {
    additions: FxHashMap<String, HitSet>,
    removals: FxHashMap<String, HitSet>,
    max_msg_id: Option<MsgIdx>,
    file: File,
    bytes: u64,
}

impl JournalState {
    fn add(&mut self, sig: &str, ids: &HitSet) -> usize {
        subtract_entry(&mut self.removals, sig, ids);
        self.additions.entry(sig.to_string()).or_default().union_with(ids)
    }

    fn remove(&mut self, sig: &str, ids: &HitSet) -> usize {
        let removed = subtract_entry(&mut self.additions, sig, ids);
        self.removals.entry(sig.to_string()).or_default().union_with(ids);
        removed
    }

    fn note_max(&mut self, ids: &HitSet) {
        if let Some(max) = ids.max() {
            self.max_msg_id = Some(self.max_msg_id.map_or(max, |cur| cur.max(max)));
        }
    }
}

fn subtract_entry(map: &mut FxHashMap<String, HitSet>, sig: &str, ids: &HitSet) -> usize {
    let (removed, now_empty) = match map.get_mut(sig) {
        Some(set) => (set.subtract(ids), set.is_empty()),
        None => return 0,
    };
    if now_empty {
        map.remove(sig);
    }
    removed
}

/// Held journal lock (reentrant on the owning thread)
pub struct JournalLock<'a> {
    _guard: ReentrantMutexGuard<'a, RefCell<JournalState>>,
}

/// Pending, not yet migrated, changes for one signature
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pending {
    /// Positions appended since the last migration
    pub additions: HitSet,
    /// Positions removed since the last migration
    pub removals: HitSet,
}

impl Pending {
    /// True when nothing is pending
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }
}

/// The write journal
pub struct Journal {
    path: PathBuf,
    codec: Arc<dyn StorageCodec>,
    literal_max: usize,
    fsync: bool,
    state: ReentrantMutex<RefCell<JournalState>>,
}

impl Journal {
    /// Open the journal in `root`, replaying whatever the file holds.
    pub fn open(
        root: &Path,
        codec: Arc<dyn StorageCodec>,
        literal_max: usize,
        fsync: bool,
    ) -> Result<Self> {
        let path = root.join(JOURNAL_FILE_NAME);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let records = lines::parse_journal(&data, codec.as_ref(), &path)?;
        let replayed = records.len();

        let mut bytes = data.len() as u64;
        if !data.is_empty() && !data.ends_with(b"\n") {
            // Cut a torn tail so the next append starts on a clean line
            let keep = data.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1) as u64;
            OpenOptions::new().write(true).open(&path)?.set_len(keep)?;
            warn!(path = %path.display(), dropped = bytes - keep, "Truncated torn journal tail");
            bytes = keep;
        }

        let mut state = JournalState {
            additions: FxHashMap::default(),
            removals: FxHashMap::default(),
            max_msg_id: None,
            file: open_append(&path)?,
            bytes,
        };
        for record in records {
            if record.sig == MAX_MSGID_SIGNATURE {
                state.note_max(&record.set);
                continue;
            }
            if Signature::parse(&record.sig).is_err() {
                warn!(path = %path.display(), sig = %record.sig, "Skipping journal line with invalid signature");
                continue;
            }
            if record.removal {
                state.remove(&record.sig, &record.set);
            } else {
                state.add(&record.sig, &record.set);
            }
        }

        info!(
            path = %path.display(),
            lines = replayed,
            signatures = state.additions.len() + state.removals.len(),
            "Replayed journal"
        );
        Ok(Journal {
            path,
            codec,
            literal_max,
            fsync,
            state: ReentrantMutex::new(RefCell::new(state)),
        })
    }

    /// Journal file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hold the journal lock until the returned guard drops.
    pub fn lock(&self) -> JournalLock<'_> {
        JournalLock {
            _guard: self.state.lock(),
        }
    }

    /// Record `ids` for `sig`: append to the file, then publish in memory.
    ///
    /// Returns how many positions were not already pending.
    pub fn append(&self, sig: &Signature, ids: &HitSet) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();

        let mut text = lines::render_record(sig.as_str(), ids, self.literal_max, false)?;
        if let Some(max) = ids.max().filter(|max| state.max_msg_id.map_or(true, |cur| *max > cur)) {
            text.push_str(&max_line(max, self.literal_max)?);
        }
        self.write(&mut state, &text)?;

        state.note_max(ids);
        Ok(state.add(sig.as_str(), ids))
    }

    /// Record a removal tombstone for `ids` under `sig`.
    ///
    /// Returns how many positions were dropped from the pending additions.
    pub fn remove(&self, sig: &Signature, ids: &HitSet) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        let text = lines::render_record(sig.as_str(), ids, self.literal_max, true)?;
        self.write(&mut state, &text)?;
        Ok(state.remove(sig.as_str(), ids))
    }

    /// Pending changes for `sig`
    pub fn get(&self, sig: &Signature) -> Pending {
        let guard = self.state.lock();
        let state = guard.borrow();
        Pending {
            additions: state.additions.get(sig.as_str()).cloned().unwrap_or_default(),
            removals: state.removals.get(sig.as_str()).cloned().unwrap_or_default(),
        }
    }

    /// Move the pending changes for `sig` into the container owning it.
    ///
    /// The container is updated before the journal entry is dropped, and
    /// both happen under the journal lock, so a reader never sees the
    /// positions in neither place. Returns false when nothing was pending.
    pub fn migrate(&self, sig: &Signature, cache: &ContainerCache) -> Result<bool> {
        let guard = self.state.lock();
        let pending = self.get(sig);
        if pending.is_empty() {
            return Ok(false);
        }

        cache.with_container(sig, |container| {
            container.add(sig, pending.additions.iter());
            container.remove(sig, pending.removals.iter());
        })?;

        let mut state = guard.borrow_mut();
        state.additions.remove(sig.as_str());
        state.removals.remove(sig.as_str());
        debug!(
            sig = %sig,
            added = pending.additions.len(),
            removed = pending.removals.len(),
            "Migrated journal entry"
        );
        Ok(true)
    }

    /// Signatures with pending changes, sorted
    pub fn signatures(&self) -> Vec<Signature> {
        let guard = self.state.lock();
        let state = guard.borrow();
        let mut sigs: Vec<&String> = state.additions.keys().chain(state.removals.keys()).collect();
        sigs.sort();
        sigs.dedup();
        sigs.into_iter()
            .filter_map(|sig| Signature::parse(sig).ok())
            .collect()
    }

    /// Number of signatures with pending changes
    pub fn len(&self) -> usize {
        self.signatures().len()
    }

    /// True when nothing is pending
    pub fn is_empty(&self) -> bool {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.additions.is_empty() && state.removals.is_empty()
    }

    /// Pending positions across all signatures (additions and removals)
    pub fn pending_items(&self) -> usize {
        let guard = self.state.lock();
        let state = guard.borrow();
        state
            .additions
            .values()
            .chain(state.removals.values())
            .map(HitSet::len)
            .sum()
    }

    /// Highest position ever appended
    pub fn max_msg_id(&self) -> Option<MsgIdx> {
        self.state.lock().borrow().max_msg_id
    }

    /// Current size of the journal file in bytes
    pub fn file_size(&self) -> u64 {
        self.state.lock().borrow().bytes
    }

    /// Replace the file with only what is still pending in memory.
    ///
    /// Only safe once every migrated entry is durable in its container;
    /// the optimizer calls this right after flushing the cache.
    pub fn rewrite(&self) -> Result<u64> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();

        let mut text = String::new();
        let mut sigs: Vec<&String> = state.additions.keys().collect();
        sigs.sort();
        for sig in sigs {
            text.push_str(&lines::render_record(sig, &state.additions[sig], self.literal_max, false)?);
        }
        let mut sigs: Vec<&String> = state.removals.keys().collect();
        sigs.sort();
        for sig in sigs {
            text.push_str(&lines::render_record(sig, &state.removals[sig], self.literal_max, true)?);
        }
        if let Some(max) = state.max_msg_id {
            text.push_str(&max_line(max, self.literal_max)?);
        }

        let payload = self.frame(&text);
        // The new append handle is opened on the temp file, so a failure
        // before the rename leaves both the old file and its handle in use.
        let staged = write_tmp(&self.path, payload.as_bytes(), self.fsync)?;
        let file = open_append(&staged)?;
        std::fs::rename(&staged, &self.path)?;
        state.file = file;
        let before = state.bytes;
        state.bytes = payload.len() as u64;
        info!(
            path = %self.path.display(),
            before,
            after = state.bytes,
            "Rewrote journal"
        );
        Ok(state.bytes)
    }

    fn frame(&self, text: &str) -> String {
        if text.is_empty() || self.codec.is_identity() {
            text.to_string()
        } else {
            lines::render_chunk(&self.codec.encode(text.as_bytes()))
        }
    }

    /// Append `text` after the last acknowledged byte.
    ///
    /// Anything past `state.bytes` was never acknowledged (a failed earlier
    /// write), so it is cut before appending; otherwise the new line would
    /// be glued onto a torn one and lost on replay.
    fn write(&self, state: &mut JournalState, text: &str) -> Result<()> {
        let on_disk = state.file.metadata()?.len();
        if on_disk > state.bytes {
            warn!(
                path = %self.path.display(),
                dropped = on_disk - state.bytes,
                "Cutting unacknowledged bytes from journal tail"
            );
            state.file.set_len(state.bytes)?;
        }

        let payload = self.frame(text);
        let written = state.file.write_all(payload.as_bytes()).and_then(|()| {
            if self.fsync {
                state.file.sync_data()
            } else {
                Ok(())
            }
        });
        if let Err(e) = written {
            if let Err(cut) = state.file.set_len(state.bytes) {
                warn!(path = %self.path.display(), error = %cut, "Failed to cut partial journal append");
            }
            return Err(e.into());
        }
        state.bytes += payload.len() as u64;
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

fn max_line(max: MsgIdx, literal_max: usize) -> Result<String> {
    let set: HitSet = std::iter::once(max).collect();
    lines::render_record(MAX_MSGID_SIGNATURE, &set, literal_max, false)
}

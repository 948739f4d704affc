//! Container cache
//!
//! Registry of open containers keyed by prefix. There is at most one live
//! in-memory instance per container file: every caller routed to the same
//! prefix shares the same `Arc<PostingContainer>`, so a mutation is visible
//! to other holders immediately, not only after a flush.
//!
//! # Locking
//!
//! The registry lock is held only to look up, insert or remove entries. It
//! is never held across I/O and never held while a container lock is being
//! acquired. Loading happens outside the registry lock and is
//! double-checked on insert.
//!
//! # Write-back
//!
//! [`ContainerCache::flush_and_clean`] is deliberately not strict LRU: the
//! `keep` most recently touched containers stay resident and are only
//! flushed when they have accumulated enough changes or have been dirty for
//! too long; everything older is flushed and evicted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use kwstore_core::{Result, Signature};
use kwstore_storage::{ContainerStore, PostingContainer};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

struct CacheEntry {
    touched: Instant,
    container: Arc<PostingContainer>,
}

/// What a flush pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Containers written or deleted
    pub flushed: usize,
    /// Containers dropped from the cache
    pub evicted: usize,
    /// Child containers created by splits during the pass
    pub splits: usize,
    /// The runtime budget ran out before every entry was visited
    pub incomplete: bool,
}

/// Cache of open containers over one [`ContainerStore`]
pub struct ContainerCache {
    store: ContainerStore,
    entries: Mutex<FxHashMap<String, CacheEntry>>,
    evictions: AtomicU64,
    dirty_grace: Duration,
    expire_after: Duration,
}

impl ContainerCache {
    /// Create an empty cache over `store`.
    pub fn new(store: ContainerStore, dirty_grace: Duration, expire_after: Duration) -> Self {
        ContainerCache {
            store,
            entries: Mutex::new(FxHashMap::default()),
            evictions: AtomicU64::new(0),
            dirty_grace,
            expire_after,
        }
    }

    /// Underlying store
    pub fn store(&self) -> &ContainerStore {
        &self.store
    }

    /// Container currently owning `sig`, loaded on a miss.
    pub fn load_cached(&self, sig: &Signature) -> Result<Arc<PostingContainer>> {
        let prefix = self.store.layout().resolve(sig.as_str());
        self.load_prefix(&prefix)
    }

    /// Container for `prefix`, loaded on a miss.
    pub fn load_prefix(&self, prefix: &str) -> Result<Arc<PostingContainer>> {
        loop {
            let seen = self.evictions.load(Ordering::Acquire);
            {
                let mut entries = self.entries.lock();
                if let Some(entry) = entries.get_mut(prefix) {
                    if !entry.container.is_retired() {
                        entry.touched = Instant::now();
                        return Ok(Arc::clone(&entry.container));
                    }
                    // Deleted on save; a fresh (empty) instance replaces it
                    entries.remove(prefix);
                    self.evictions.fetch_add(1, Ordering::AcqRel);
                    continue;
                }
            }

            let loaded = Arc::new(PostingContainer::load(&self.store, prefix)?);

            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get_mut(prefix) {
                if entry.container.is_retired() {
                    continue;
                }
                // Another thread won the race; use its instance
                entry.touched = Instant::now();
                return Ok(Arc::clone(&entry.container));
            }
            if self.evictions.load(Ordering::Acquire) != seen {
                // An instance may have been saved and evicted while we read
                // the file, so what we loaded can be stale.
                continue;
            }
            entries.insert(
                prefix.to_string(),
                CacheEntry {
                    touched: Instant::now(),
                    container: Arc::clone(&loaded),
                },
            );
            return Ok(loaded);
        }
    }

    /// Run `f` on the live container owning `sig`, under that container's
    /// lock.
    ///
    /// A container that was retired, or that no longer owns `sig` because a
    /// split published a longer prefix in the meantime, is dropped and the
    /// lookup retried.
    pub fn with_container<R, F>(&self, sig: &Signature, f: F) -> Result<R>
    where
        F: FnOnce(&PostingContainer) -> R,
    {
        loop {
            let container = self.load_cached(sig)?;
            let _guard = container.lock();
            if container.owns(&self.store, sig) {
                return Ok(f(&container));
            }
            debug!(prefix = %container.prefix(), sig = %sig, "Container no longer owns signature, retrying");
        }
    }

    /// Flush and evict according to the write-back policy.
    ///
    /// All but the `keep` most recently touched containers are flushed (if
    /// dirty) and evicted. Retained containers are flushed when they have
    /// more than `min_changes` changes or have been dirty longer than the
    /// grace period, and evicted when untouched longer than the expiry.
    /// Stops when `deadline` passes; what was not visited stays cached.
    pub fn flush_and_clean(
        &self,
        min_changes: usize,
        keep: usize,
        deadline: Option<Instant>,
    ) -> Result<FlushReport> {
        let mut cached: Vec<(String, Instant, Arc<PostingContainer>)> = self
            .entries
            .lock()
            .iter()
            .map(|(prefix, entry)| (prefix.clone(), entry.touched, Arc::clone(&entry.container)))
            .collect();
        cached.sort_by(|a, b| b.1.cmp(&a.1));

        let mut report = FlushReport::default();
        for (rank, (prefix, touched, container)) in cached.into_iter().enumerate() {
            if deadline.map_or(false, |d| Instant::now() >= d) {
                report.incomplete = true;
                break;
            }

            if rank >= keep {
                self.evict(&prefix, &container, &mut report)?;
                continue;
            }

            let overdue = container
                .dirty_since()
                .map_or(false, |since| since.elapsed() >= self.dirty_grace);
            if container.changes() > min_changes || overdue {
                self.flush(&prefix, &container, &mut report)?;
            }
            if touched.elapsed() >= self.expire_after {
                self.evict(&prefix, &container, &mut report)?;
            }
        }

        if report.flushed > 0 || report.evicted > 0 {
            debug!(
                flushed = report.flushed,
                evicted = report.evicted,
                splits = report.splits,
                incomplete = report.incomplete,
                "Flushed container cache"
            );
        }
        Ok(report)
    }

    /// Flush every dirty container, keeping the `keep` most recent cached.
    pub fn flush_all(&self, keep: usize) -> Result<FlushReport> {
        self.flush_and_clean(0, keep, None)
    }

    /// Retire and drop a container without saving it.
    ///
    /// Used when its entries have already been written elsewhere.
    pub fn discard(&self, prefix: &str, container: &PostingContainer) {
        container.retire();
        self.forget(prefix, container);
    }

    /// Number of cached containers
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// True when `prefix` is cached
    pub fn contains(&self, prefix: &str) -> bool {
        self.entries.lock().contains_key(prefix)
    }

    /// Cached containers with unsaved changes
    pub fn dirty_count(&self) -> usize {
        let cached: Vec<Arc<PostingContainer>> = self
            .entries
            .lock()
            .values()
            .map(|entry| Arc::clone(&entry.container))
            .collect();
        cached.iter().filter(|c| c.is_dirty()).count()
    }

    fn flush(&self, prefix: &str, container: &Arc<PostingContainer>, report: &mut FlushReport) -> Result<()> {
        let _guard = container.lock();
        if container.is_retired() {
            self.forget(prefix, container);
            return Ok(());
        }
        if !container.is_dirty() {
            return Ok(());
        }
        let outcome = container.save(&self.store)?;
        report.flushed += 1;
        report.splits += outcome.children.len();
        if container.is_retired() && self.forget(prefix, container) {
            // The file was deleted; nothing left to cache
            report.evicted += 1;
        }
        Ok(())
    }

    fn evict(&self, prefix: &str, container: &Arc<PostingContainer>, report: &mut FlushReport) -> Result<()> {
        {
            let _guard = container.lock();
            if !container.is_retired() {
                if container.is_dirty() {
                    let outcome = container.save(&self.store)?;
                    report.flushed += 1;
                    report.splits += outcome.children.len();
                }
                container.retire();
            }
        }
        if self.forget(prefix, container) {
            report.evicted += 1;
        }
        Ok(())
    }

    fn forget(&self, prefix: &str, container: &PostingContainer) -> bool {
        let mut entries = self.entries.lock();
        let same = entries
            .get(prefix)
            .map_or(false, |entry| std::ptr::eq(Arc::as_ptr(&entry.container), container));
        if same {
            entries.remove(prefix);
            self.evictions.fetch_add(1, Ordering::AcqRel);
        }
        same
    }
}

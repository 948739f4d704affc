//! Optimizer: journal migration and container maintenance
//!
//! A routine (quick) pass migrates a sample of journal signatures into
//! their containers and periodically runs the cache write-back so memory
//! stays bounded. It is skipped unless forced or the journal file has grown
//! past `journal_migrate_bytes`.
//!
//! A full pass migrates every signature and merges small child containers
//! back into their parent.
//!
//! Any pass that completes and migrated something (and every completed full
//! pass) then flushes every dirty container and rewrites the journal so it
//! only holds what is still pending.
//!
//! Every loop iteration checks the shutdown flag and the runtime budget.
//! Stopping midway is always safe: whatever was not migrated stays readable
//! from the journal.

use std::time::{Duration, Instant};

use kwstore_core::Result;
use rand::Rng;
use tracing::{debug, info};

use crate::engine::Engine;

/// Options for [`Engine::optimize`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizeOptions {
    /// Routine maintenance only (no merge)
    pub quick: bool,
    /// Migrate even if the journal is still small
    pub force: bool,
    /// Fraction of journal signatures a quick pass visits (0.0..=1.0)
    pub ratio: f64,
    /// Wall-clock budget for the whole pass
    pub runtime: Option<Duration>,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        OptimizeOptions {
            quick: true,
            force: false,
            ratio: 1.0,
            runtime: None,
        }
    }
}

impl OptimizeOptions {
    /// Routine pass visiting `ratio` of the journal within `runtime`.
    pub fn quick(ratio: f64, runtime: Option<Duration>) -> Self {
        OptimizeOptions {
            quick: true,
            force: false,
            ratio,
            runtime,
        }
    }

    /// Full pass: migrate everything, merge, flush, rewrite the journal.
    pub fn full() -> Self {
        OptimizeOptions {
            quick: false,
            force: true,
            ratio: 1.0,
            runtime: None,
        }
    }
}

/// What an optimize pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizeReport {
    /// Journal signatures migrated into containers
    pub migrated: usize,
    /// Child containers merged back into their parent
    pub merged: usize,
    /// Containers written or deleted by cache flushes
    pub flushed: usize,
    /// Containers evicted by cache flushes
    pub evicted: usize,
    /// Containers created by splits
    pub splits: usize,
    /// The journal file was rewritten
    pub journal_rewritten: bool,
    /// Stopped because shutdown was requested
    pub cancelled: bool,
    /// Stopped because the runtime budget ran out
    pub out_of_time: bool,
    /// Wall-clock time spent
    pub elapsed: Duration,
}

impl OptimizeReport {
    fn stopped(&self) -> bool {
        self.cancelled || self.out_of_time
    }

    fn absorb_flush(&mut self, flush: crate::cache::FlushReport) {
        self.flushed += flush.flushed;
        self.evicted += flush.evicted;
        self.splits += flush.splits;
        self.out_of_time |= flush.incomplete;
    }
}

struct Budget {
    deadline: Option<Instant>,
}

impl Budget {
    fn exhausted(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }
}

pub(crate) fn run(engine: &Engine, options: OptimizeOptions) -> Result<OptimizeReport> {
    let started = Instant::now();
    let budget = Budget {
        deadline: options.runtime.map(|runtime| started + runtime),
    };
    let mut report = OptimizeReport::default();

    migrate_pass(engine, &options, &budget, &mut report)?;

    if !options.quick && !report.stopped() {
        merge_pass(engine, &budget, &mut report)?;
    }
    // Once migrated entries are durable in their containers the journal
    // only needs what is still pending.
    if !report.stopped() && (!options.quick || report.migrated > 0) {
        let _structure = engine.structure().read();
        // Flush under the journal lock so nothing migrates between the
        // flush and the rewrite.
        let _journal = engine.journal().lock();
        let flush = engine.cache().flush_all(engine.config().cache_keep)?;
        report.absorb_flush(flush);
        engine.journal().rewrite()?;
        report.journal_rewritten = true;
    }

    report.elapsed = started.elapsed();
    info!(
        quick = options.quick,
        migrated = report.migrated,
        merged = report.merged,
        flushed = report.flushed,
        evicted = report.evicted,
        splits = report.splits,
        rewritten = report.journal_rewritten,
        cancelled = report.cancelled,
        out_of_time = report.out_of_time,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Optimize finished"
    );
    Ok(report)
}

fn migrate_pass(
    engine: &Engine,
    options: &OptimizeOptions,
    budget: &Budget,
    report: &mut OptimizeReport,
) -> Result<()> {
    let config = engine.config();
    let journal = engine.journal();
    if options.quick && !options.force && journal.file_size() < config.journal_migrate_bytes {
        debug!(bytes = journal.file_size(), "Journal below migration threshold, skipping");
        return Ok(());
    }

    let _structure = engine.structure().read();
    let sigs = journal.signatures();
    if sigs.is_empty() {
        return Ok(());
    }
    let ratio = if options.quick { options.ratio } else { 1.0 };
    let (start, count) = sample_window(sigs.len(), ratio, &mut rand::thread_rng());

    for offset in 0..count {
        if engine.is_shutting_down() {
            report.cancelled = true;
            break;
        }
        if budget.exhausted() {
            report.out_of_time = true;
            break;
        }

        let sig = &sigs[(start + offset) % sigs.len()];
        if journal.migrate(sig, engine.cache())? {
            report.migrated += 1;
        }
        if report.migrated > 0 && report.migrated % config.flush_every == 0 {
            let flush = engine.cache().flush_and_clean(
                config.flush_min_changes,
                config.cache_keep,
                budget.deadline,
            )?;
            report.absorb_flush(flush);
        }
    }

    let flush = engine
        .cache()
        .flush_and_clean(config.flush_min_changes, config.cache_keep, budget.deadline)?;
    report.absorb_flush(flush);
    Ok(())
}

/// Start index and visit count for a pass over `len` sorted signatures.
///
/// A partial pass starts at a random rotation point so that time-boxed runs
/// do not keep starving the signatures that sort last.
fn sample_window<R: Rng>(len: usize, ratio: f64, rng: &mut R) -> (usize, usize) {
    if len == 0 {
        return (0, 0);
    }
    if ratio >= 1.0 || ratio.is_nan() {
        return (0, len);
    }
    if ratio <= 0.0 {
        return (0, 0);
    }
    let count = ((len as f64 * ratio).ceil() as usize).min(len);
    (rng.gen_range(0..len), count)
}

/// Merge child containers back into their parent while the pair stays
/// comfortably under budget.
///
/// Runs under the exclusive structure lock, so no other operation can hold
/// either container. The child prefix is unpublished before the parent is
/// written (so the parent keeps the moved entries) and its file is deleted
/// only afterwards; a crash in between leaves duplicate copies that the
/// next load of the parent discards.
fn merge_pass(engine: &Engine, budget: &Budget, report: &mut OptimizeReport) -> Result<()> {
    let _structure = engine.structure().write();
    let cache = engine.cache();
    let store = cache.store();
    let threshold = store.limits().max_items / 2;

    let mut prefixes = store.layout().prefixes();
    // Deepest first, so grandchildren fold into children before those are
    // considered themselves.
    prefixes.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    for prefix in prefixes {
        if prefix.is_empty() || !store.layout().contains(&prefix) {
            continue;
        }
        if engine.is_shutting_down() {
            report.cancelled = true;
            break;
        }
        if budget.exhausted() {
            report.out_of_time = true;
            break;
        }

        let parent_prefix = store.layout().resolve(&prefix[..prefix.len() - 1]);
        let child = cache.load_prefix(&prefix)?;
        let parent = cache.load_prefix(&parent_prefix)?;
        if child.total_items() + parent.total_items() > threshold {
            continue;
        }

        let moved = child.snapshot();
        let items = child.total_items();
        store.layout().remove(&prefix);
        parent.absorb(moved);
        if let Err(e) = parent.save(store) {
            store.layout().insert(&prefix);
            return Err(e);
        }
        cache.discard(&prefix, &child);
        store.delete_file(&prefix)?;

        debug!(child = %prefix, parent = %parent_prefix, items, "Merged container into parent");
        report.merged += 1;
    }
    Ok(())
}

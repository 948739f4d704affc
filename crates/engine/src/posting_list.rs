//! Per-term query and mutation handle

use kwstore_core::{HitSet, MsgIdx, Result, Signature};

use crate::engine::Engine;

/// Handle on the posting list of one signature.
///
/// Cheap to create; holds no lock and no container between calls.
pub struct PostingList<'e> {
    engine: &'e Engine,
    sig: Signature,
}

impl<'e> PostingList<'e> {
    pub(crate) fn new(engine: &'e Engine, sig: Signature) -> Self {
        PostingList { engine, sig }
    }

    /// Signature this handle addresses
    pub fn signature(&self) -> &Signature {
        &self.sig
    }

    /// Every position currently associated with the signature.
    ///
    /// The journal is read before the container. Migration adds to the
    /// container before it drops the journal entry, so whichever side of a
    /// concurrent migration this lands on, nothing is missed.
    pub fn hits(&self) -> Result<HitSet> {
        let _structure = self.engine.structure().read();
        let pending = self.engine.journal().get(&self.sig);
        let mut hits = self
            .engine
            .cache()
            .with_container(&self.sig, |container| container.get(&self.sig))?;
        hits.union_with(&pending.additions);
        hits.subtract(&pending.removals);
        Ok(hits)
    }

    /// Positions still waiting in the journal (not yet migrated)
    pub fn journal_hits(&self) -> HitSet {
        self.engine.journal().get(&self.sig).additions
    }

    /// Add positions (journal fast path); returns how many were new to the
    /// journal.
    pub fn append<I: IntoIterator<Item = MsgIdx>>(&self, ids: I) -> Result<usize> {
        self.engine.append_signature(&self.sig, ids)
    }

    /// Remove positions from both the journal and the owning container.
    ///
    /// A tombstone is journaled first so a restart cannot bring the
    /// positions back from older journal lines or an unflushed container.
    pub fn remove<I: IntoIterator<Item = MsgIdx>>(&self, ids: I) -> Result<()> {
        let ids: HitSet = ids.into_iter().collect();
        if ids.is_empty() {
            return Ok(());
        }
        let _structure = self.engine.structure().read();
        let journal = self.engine.journal();
        let _journal = journal.lock();
        journal.remove(&self.sig, &ids)?;
        self.engine
            .cache()
            .with_container(&self.sig, |container| container.remove(&self.sig, ids.iter()))?;
        Ok(())
    }
}

//! Hit sets: the set of message index positions matching one signature
//!
//! Positions are opaque `u32` values owned by the metadata index. Membership
//! is idempotent and callers must not depend on ordering, although iteration
//! is ascending so serialized containers are deterministic.

use std::collections::btree_set;
use std::collections::BTreeSet;

/// Message index position, as assigned by the metadata index
pub type MsgIdx = u32;

/// Set of message index positions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HitSet {
    ids: BTreeSet<MsgIdx>,
}

impl HitSet {
    /// Create an empty hit set
    pub fn new() -> Self {
        HitSet {
            ids: BTreeSet::new(),
        }
    }

    /// Number of positions in the set
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Membership test
    pub fn contains(&self, id: MsgIdx) -> bool {
        self.ids.contains(&id)
    }

    /// Insert one position, returning true if it was new
    pub fn insert(&mut self, id: MsgIdx) -> bool {
        self.ids.insert(id)
    }

    /// Remove one position, returning true if it was present
    pub fn remove(&mut self, id: MsgIdx) -> bool {
        self.ids.remove(&id)
    }

    /// Insert every position, returning how many were new
    pub fn extend_from<I: IntoIterator<Item = MsgIdx>>(&mut self, ids: I) -> usize {
        ids.into_iter().filter(|id| self.ids.insert(*id)).count()
    }

    /// Remove every position, returning how many were present
    pub fn remove_all<I: IntoIterator<Item = MsgIdx>>(&mut self, ids: I) -> usize {
        ids.into_iter().filter(|id| self.ids.remove(id)).count()
    }

    /// Union `other` into `self`, returning how many positions were new
    pub fn union_with(&mut self, other: &HitSet) -> usize {
        self.extend_from(other.iter())
    }

    /// Remove every position of `other` from `self`
    pub fn subtract(&mut self, other: &HitSet) -> usize {
        self.remove_all(other.iter())
    }

    /// Largest position, if any
    pub fn max(&self) -> Option<MsgIdx> {
        self.ids.iter().next_back().copied()
    }

    /// Iterate positions in ascending order
    pub fn iter(&self) -> impl Iterator<Item = MsgIdx> + '_ {
        self.ids.iter().copied()
    }

    /// Positions as a sorted vector
    pub fn to_vec(&self) -> Vec<MsgIdx> {
        self.ids.iter().copied().collect()
    }
}

impl FromIterator<MsgIdx> for HitSet {
    fn from_iter<I: IntoIterator<Item = MsgIdx>>(iter: I) -> Self {
        HitSet {
            ids: iter.into_iter().collect(),
        }
    }
}

impl From<&[MsgIdx]> for HitSet {
    fn from(ids: &[MsgIdx]) -> Self {
        ids.iter().copied().collect()
    }
}

impl IntoIterator for HitSet {
    type Item = MsgIdx;
    type IntoIter = btree_set::IntoIter<MsgIdx>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.into_iter()
    }
}

impl<'a> IntoIterator for &'a HitSet {
    type Item = MsgIdx;
    type IntoIter = std::iter::Copied<btree_set::Iter<'a, MsgIdx>>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter().copied()
    }
}

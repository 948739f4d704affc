//! Container splitting
//!
//! When a container's entries exceed `max_items` at save time, the largest
//! group of signatures is peeled off into a child container with a longer
//! prefix, repeatedly, until the remainder fits.
//!
//! Grouping:
//! - a single hit set at or above `max_items` is its own group, keyed by
//!   the full signature (it would otherwise drag its siblings along
//!   through every level of the recursion);
//! - everything else is grouped by the prefix one character longer than
//!   the parent's.
//!
//! The largest group goes first (ties broken by the smaller key so the
//! result is deterministic). Each child is written, recursively split if it
//! is itself oversized, and published in the layout before its entries are
//! dropped from the parent. A container at maximum prefix length, or one
//! whose only signature equals its prefix, is written as-is: the budget is
//! a target, not a hard limit.

use std::collections::BTreeMap;

use kwstore_core::Result;
use tracing::debug;

use crate::container::{total_items, Entries, PostingContainer};
use crate::store::ContainerStore;

/// Peel groups off `entries` until they fit; returns the child prefixes.
pub(crate) fn split_oversized(
    store: &ContainerStore,
    prefix: &str,
    entries: &mut Entries,
) -> Result<Vec<String>> {
    let limits = *store.limits();
    let mut children = Vec::new();

    while total_items(entries) > limits.max_items && prefix.len() < limits.signature_len {
        let key = match largest_group(prefix, entries, limits.max_items) {
            Some(key) => key,
            None => break,
        };
        debug_assert!(!store.layout().contains(&key), "split target {} already exists", key);

        let group: Entries = entries
            .iter()
            .filter(|(sig, _)| sig.starts_with(&key))
            .map(|(sig, set)| (sig.clone(), set.clone()))
            .collect();
        let moved = total_items(&group);

        // Write the child before forgetting anything in the parent
        let child = PostingContainer::from_entries(&key, group);
        let outcome = child.save(store)?;
        entries.retain(|sig, _| !sig.starts_with(&key));

        debug!(parent = %prefix, child = %key, moved, grandchildren = outcome.children.len(), "Split container");
        children.push(key);
        children.extend(outcome.children);
    }

    Ok(children)
}

/// Key of the largest splittable group, if there is one.
fn largest_group(prefix: &str, entries: &Entries, max_items: usize) -> Option<String> {
    let mut groups: BTreeMap<&str, usize> = BTreeMap::new();
    for (sig, set) in entries {
        if sig.len() <= prefix.len() {
            continue;
        }
        let key = if set.len() >= max_items {
            sig.as_str()
        } else {
            &sig[..prefix.len() + 1]
        };
        *groups.entry(key).or_default() += set.len();
    }

    // BTreeMap iterates keys in order, so max_by_key's last-wins rule would
    // prefer the larger key on ties; compare explicitly instead.
    let mut best: Option<(&str, usize)> = None;
    for (key, size) in groups {
        if best.map_or(true, |(_, best_size)| size > best_size) {
            best = Some((key, size));
        }
    }
    best.map(|(key, _)| key.to_string())
}

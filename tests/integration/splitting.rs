//! Container splitting and merging at scale.

use std::collections::HashMap;
use std::sync::Arc;

use crate::common::*;
use kwstore::{Limits, OptimizeOptions, SignatureHasher};
use kwstore_storage::{ContainerStore, PostingContainer};

#[test]
fn twenty_thousand_signatures_split_and_reload() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ContainerStore::open(tmp.path(), Arc::new(IdentityCodec), Limits::default(), false).unwrap();
    let hasher = SignatureHasher::new(24).unwrap();

    let root = PostingContainer::empty("");
    let mut expected = Vec::with_capacity(20_000);
    for i in 0..20_000u32 {
        let sig = hasher.hash(&format!("term-{}", i));
        root.add(&sig, [i]);
        expected.push((sig, i));
    }
    let outcome = root.save(&store).unwrap();
    assert!(!outcome.children.is_empty());
    assert!(outcome.items <= Limits::default().max_items);

    let files = container_files(tmp.path());
    assert!(files.len() >= 2, "expected a split, got {:?}", files);

    let mut loaded: HashMap<String, PostingContainer> = HashMap::new();
    for (sig, id) in &expected {
        let prefix = store.layout().resolve(sig.as_str());
        let container = loaded
            .entry(prefix.clone())
            .or_insert_with(|| PostingContainer::load(&store, &prefix).unwrap());
        assert!(container.get(sig).contains(*id), "lost {} (owner {:?})", sig, prefix);
    }

    let total: usize = store
        .layout()
        .prefixes()
        .iter()
        .map(|prefix| PostingContainer::load(&store, prefix).unwrap().signature_count())
        .sum();
    assert_eq!(total, 20_000);
}

#[test]
fn engine_splits_during_optimize_and_survives_restart() {
    let t = TestEngine::with_config(small_config(200));
    for i in 0..2_000u32 {
        t.engine.append(&format!("word{}", i), [i]).unwrap();
    }
    let report = t.engine.optimize(OptimizeOptions::full()).unwrap();
    assert_eq!(report.migrated, 2_000);
    assert!(container_files(t.dir.path()).len() >= 10);

    let t = t.reopen();
    assert_eq!(t.engine.stats().journal_signatures, 0);
    for i in 0..2_000u32 {
        assert_eq!(
            t.engine.posting_list(&format!("word{}", i)).hits().unwrap(),
            set(&[i]),
            "word{}",
            i
        );
    }
}

#[test]
fn full_optimize_merges_shrunken_containers() {
    let t = TestEngine::with_config(small_config(200));
    for i in 0..1_000u32 {
        t.engine.append(&format!("word{}", i), [i]).unwrap();
    }
    t.engine.optimize(OptimizeOptions::full()).unwrap();
    let before = container_files(t.dir.path()).len();
    assert!(before >= 5);

    for i in (0..1_000u32).filter(|i| i % 10 != 0) {
        t.engine.posting_list(&format!("word{}", i)).remove([i]).unwrap();
    }
    t.engine.optimize(OptimizeOptions::full()).unwrap();
    let after = container_files(t.dir.path()).len();
    assert!(after < before, "{} files before, {} after", before, after);

    for i in 0..1_000u32 {
        let hits = t.engine.posting_list(&format!("word{}", i)).hits().unwrap();
        if i % 10 == 0 {
            assert_eq!(hits, set(&[i]));
        } else {
            assert!(hits.is_empty(), "word{} still has {:?}", i, hits);
        }
    }
}

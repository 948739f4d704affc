//! Basic end-to-end flows.

use crate::common::*;
use kwstore::intset::{pack, unpack};

#[test]
fn append_then_read() {
    let t = TestEngine::new();
    t.engine.append("invoice", [1, 2, 3]).unwrap();
    assert_eq!(t.engine.posting_list("invoice").hits().unwrap(), set(&[1, 2, 3]));
}

#[test]
fn append_then_remove_one() {
    let t = TestEngine::new();
    t.engine.append("invoice", [1, 2, 3]).unwrap();
    t.engine.posting_list("invoice").remove([2]).unwrap();
    assert_eq!(t.engine.posting_list("invoice").hits().unwrap(), set(&[1, 3]));
}

#[test]
fn repeated_append_is_idempotent() {
    let t = TestEngine::new();
    assert_eq!(t.engine.append("invoice", [1, 2, 3]).unwrap(), 3);
    assert_eq!(t.engine.append("invoice", [1, 2, 3]).unwrap(), 0);
    assert_eq!(t.engine.posting_list("invoice").hits().unwrap().len(), 3);

    t.engine.optimize(OptimizeOptions::full()).unwrap();
    t.engine.append("invoice", [1, 2, 3]).unwrap();
    t.engine.optimize(OptimizeOptions::full()).unwrap();
    assert_eq!(t.engine.posting_list("invoice").hits().unwrap(), set(&[1, 2, 3]));
}

#[test]
fn migrate_moves_hits_out_of_journal() {
    let t = TestEngine::new();
    let ids: Vec<u32> = (100..150).collect();
    t.engine.append("receipt", ids.iter().copied()).unwrap();

    let list = t.engine.posting_list("receipt");
    let before = list.hits().unwrap();
    assert_eq!(list.journal_hits().len(), 50);

    assert!(t.engine.migrate(list.signature()).unwrap());
    assert!(list.journal_hits().is_empty());
    assert_eq!(list.hits().unwrap(), before);
}

#[test]
fn codec_uses_blob_above_literal_threshold() {
    let hits: kwstore::HitSet = (0..=30).collect();
    let packed = pack(&hits, 15).unwrap();
    assert_eq!(&packed[..4], &[0xFF, 0xFF, 0xFF, 0xFF]);
    assert_eq!(unpack(&packed).unwrap(), hits);
}

#[test]
fn removing_everything_deletes_the_container_file() {
    let t = TestEngine::new();
    t.engine.append("invoice", [4, 5, 6]).unwrap();
    t.engine.optimize(OptimizeOptions::full()).unwrap();
    assert_eq!(container_files(t.dir.path()).len(), 1);

    t.engine.posting_list("invoice").remove([4, 5, 6]).unwrap();
    assert!(t.engine.posting_list("invoice").hits().unwrap().is_empty());
    t.engine.optimize(OptimizeOptions::full()).unwrap();
    assert!(container_files(t.dir.path()).is_empty());

    let t = t.reopen();
    assert!(t.engine.posting_list("invoice").hits().unwrap().is_empty());
}

#[test]
fn terms_do_not_leak_into_each_other() {
    let t = TestEngine::new();
    t.engine.append("invoice", [1]).unwrap();
    t.engine.append("receipt", [2]).unwrap();
    t.engine.optimize(OptimizeOptions::full()).unwrap();
    assert_eq!(t.engine.posting_list("invoice").hits().unwrap(), set(&[1]));
    assert_eq!(t.engine.posting_list("receipt").hits().unwrap(), set(&[2]));
    assert!(t.engine.posting_list("unrelated").hits().unwrap().is_empty());
}

#[test]
fn quick_optimize_skips_small_journal_unless_forced() {
    let t = TestEngine::new();
    t.engine.append("invoice", [1]).unwrap();

    let report = t.engine.optimize(OptimizeOptions::default()).unwrap();
    assert_eq!(report.migrated, 0);
    assert_eq!(t.engine.stats().journal_signatures, 1);

    let forced = OptimizeOptions {
        force: true,
        ..OptimizeOptions::default()
    };
    let report = t.engine.optimize(forced).unwrap();
    assert_eq!(report.migrated, 1);
    assert!(report.journal_rewritten);
    assert_eq!(t.engine.stats().journal_signatures, 0);
}

#[test]
fn quick_optimize_compacts_journal_across_restart() {
    let t = TestEngine::new();
    for i in 0..500u32 {
        t.engine.append(&format!("w{}", i), [i + 1]).unwrap();
    }
    let before = t.engine.stats().journal_bytes;

    let forced = OptimizeOptions {
        force: true,
        ..OptimizeOptions::default()
    };
    let report = t.engine.optimize(forced).unwrap();
    assert_eq!(report.migrated, 500);
    assert!(report.journal_rewritten);
    assert!(t.engine.stats().journal_bytes < before);

    let t = t.reopen();
    assert_eq!(t.engine.stats().journal_signatures, 0);
    assert!(t.engine.stats().journal_bytes < before);
    assert!(t.engine.posting_list("w1").journal_hits().is_empty());
    assert_eq!(t.engine.posting_list("w1").hits().unwrap(), set(&[2]));
    assert_eq!(t.engine.max_msg_id(), Some(500));
}

#[test]
fn full_optimize_rewrites_journal() {
    let t = TestEngine::new();
    for i in 0..200u32 {
        t.engine.append(&format!("term{}", i % 20), [i]).unwrap();
    }
    let before = t.engine.stats().journal_bytes;
    let report = t.engine.optimize(OptimizeOptions::full()).unwrap();
    assert_eq!(report.migrated, 20);
    assert!(report.journal_rewritten);
    assert!(t.engine.stats().journal_bytes < before);
    assert_eq!(t.engine.max_msg_id(), Some(199));
    assert_eq!(t.engine.posting_list("term3").hits().unwrap().len(), 10);
}

#[test]
fn shutdown_request_cancels_optimize() {
    let t = TestEngine::new();
    t.engine.append("invoice", [1]).unwrap();
    t.engine.request_shutdown();

    let report = t.engine.optimize(OptimizeOptions::full()).unwrap();
    assert!(report.cancelled);
    assert_eq!(report.migrated, 0);
    assert!(!report.journal_rewritten);
    assert_eq!(t.engine.posting_list("invoice").hits().unwrap(), set(&[1]));
}

//! Restart, crash and codec behaviour.

use std::sync::Arc;

use crate::common::*;
use kwstore::Error;
use kwstore_storage::{ContainerStore, PostingContainer};

/// Drop the engine without its shutdown flush, as a crash would.
fn crash(t: TestEngine) -> tempfile::TempDir {
    let TestEngine { engine, dir } = t;
    std::mem::forget(engine);
    dir
}

fn open_at(dir: tempfile::TempDir, config: EngineConfig) -> TestEngine {
    let engine = Engine::open(dir.path(), config, Arc::new(IdentityCodec), None).unwrap();
    TestEngine { engine, dir }
}

#[test]
fn journal_replays_after_crash() {
    let t = TestEngine::new();
    t.engine.append("invoice", [1, 2, 3]).unwrap();
    t.engine.posting_list("invoice").remove([2]).unwrap();
    t.engine.append("receipt", [9]).unwrap();

    let t = open_at(crash(t), EngineConfig::default());
    assert_eq!(t.engine.posting_list("invoice").hits().unwrap(), set(&[1, 3]));
    assert_eq!(t.engine.posting_list("receipt").hits().unwrap(), set(&[9]));
    assert_eq!(t.engine.max_msg_id(), Some(9));
}

#[test]
fn tombstone_covers_unflushed_container_removal() {
    let t = TestEngine::new();
    t.engine.append("invoice", [1, 2, 3]).unwrap();
    t.engine.optimize(OptimizeOptions::full()).unwrap();

    // The container change stays in memory; only the tombstone is on disk
    t.engine.posting_list("invoice").remove([1]).unwrap();
    assert_eq!(t.engine.stats().dirty_containers, 1);

    let t = open_at(crash(t), EngineConfig::default());
    assert_eq!(t.engine.posting_list("invoice").hits().unwrap(), set(&[2, 3]));

    t.engine.optimize(OptimizeOptions::full()).unwrap();
    let t = t.reopen();
    assert_eq!(t.engine.posting_list("invoice").hits().unwrap(), set(&[2, 3]));
}

#[test]
fn failed_save_leaves_previous_file_intact() {
    let t = TestEngine::new();
    t.engine.append("invoice", [1, 2]).unwrap();
    t.engine.optimize(OptimizeOptions::full()).unwrap();
    let sig = t.engine.signature("invoice");

    t.engine.append("invoice", [3]).unwrap();
    t.engine.migrate(&sig).unwrap();

    // A directory where the temp file goes makes the write fail before
    // the rename.
    let postings = t.dir.path().join("postings");
    let blocker = postings.join("pl-root.dat.tmp");
    std::fs::create_dir(&blocker).unwrap();
    assert!(matches!(t.engine.flush_all(0), Err(Error::Io(_))));

    let store = ContainerStore::open(t.dir.path(), Arc::new(IdentityCodec), t.engine.config().limits(), false).unwrap();
    let on_disk = PostingContainer::load(&store, "").unwrap();
    assert_eq!(on_disk.get(&sig), set(&[1, 2]));

    std::fs::remove_dir(&blocker).unwrap();
    t.engine.flush_all(0).unwrap();
    let on_disk = PostingContainer::load(&store, "").unwrap();
    assert_eq!(on_disk.get(&sig), set(&[1, 2, 3]));
}

#[test]
fn leftover_temp_files_are_ignored() {
    let t = TestEngine::new();
    t.engine.append("invoice", [1, 2]).unwrap();
    t.engine.optimize(OptimizeOptions::full()).unwrap();
    let postings = t.dir.path().join("postings");
    std::fs::write(postings.join("pl-root.dat.tmp"), "half written").unwrap();
    std::fs::write(postings.join("pl-a.dat.tmp"), "half written").unwrap();

    let t = t.reopen();
    assert_eq!(t.engine.stats().container_files, 1);
    assert_eq!(t.engine.posting_list("invoice").hits().unwrap(), set(&[1, 2]));

    t.engine.append("invoice", [3]).unwrap();
    t.engine.optimize(OptimizeOptions::full()).unwrap();
    assert!(!postings.join("pl-root.dat.tmp").exists());
    assert_eq!(t.engine.posting_list("invoice").hits().unwrap(), set(&[1, 2, 3]));
}

#[test]
fn corrupt_container_line_only_loses_that_line() {
    let t = TestEngine::new();
    let good = t.engine.signature("invoice");
    let bad = t.engine.signature("receipt");
    let postings = t.dir.path().join("postings");
    std::fs::write(
        postings.join("pl-root.dat"),
        format!("{}\t1\t2\n{}\t%%%\n", good, bad),
    )
    .unwrap();

    let t = t.reopen();
    assert_eq!(t.engine.posting_list("invoice").hits().unwrap(), set(&[1, 2]));
    assert!(t.engine.posting_list("receipt").hits().unwrap().is_empty());
}

#[test]
fn encrypted_store_round_trip_and_wrong_key() {
    let dir = tempfile::tempdir().unwrap();
    let sig_hex;
    {
        let engine = Engine::open(dir.path(), EngineConfig::default(), Arc::new(XorCipher { key: 7 }), None).unwrap();
        engine.append("invoice", (0..40).collect::<Vec<u32>>()).unwrap();
        engine.optimize(OptimizeOptions::full()).unwrap();
        engine.append("receipt", [5]).unwrap();
        sig_hex = engine.signature("invoice").to_string();
        engine.close().unwrap();
    }

    let raw = std::fs::read(dir.path().join("postings").join("pl-root.dat")).unwrap();
    assert!(!String::from_utf8_lossy(&raw).contains(&sig_hex));

    {
        let engine = Engine::open(dir.path(), EngineConfig::default(), Arc::new(XorCipher { key: 7 }), None).unwrap();
        assert_eq!(engine.posting_list("invoice").hits().unwrap().len(), 40);
        assert_eq!(engine.posting_list("receipt").hits().unwrap(), set(&[5]));
    }

    let wrong = Engine::open(dir.path(), EngineConfig::default(), Arc::new(XorCipher { key: 8 }), None);
    assert!(matches!(wrong, Err(ref e) if e.is_decode()));
}

#[test]
fn keyed_signatures_hide_plain_hashes() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        obfuscate_index: true,
        ..EngineConfig::default()
    };
    let plain_sig = kwstore::SignatureHasher::new(24).unwrap().hash("invoice").to_string();
    {
        let engine = Engine::open(dir.path(), config.clone(), Arc::new(IdentityCodec), Some(&b"k1"[..])).unwrap();
        engine.append("invoice", [1]).unwrap();
        engine.optimize(OptimizeOptions::full()).unwrap();
    }
    let journal = std::fs::read_to_string(dir.path().join("kw-journal.dat")).unwrap();
    let container = std::fs::read_to_string(dir.path().join("postings").join("pl-root.dat")).unwrap();
    assert!(!journal.contains(&plain_sig));
    assert!(!container.contains(&plain_sig));

    let engine = Engine::open(dir.path(), config, Arc::new(IdentityCodec), Some(&b"k1"[..])).unwrap();
    assert_eq!(engine.posting_list("invoice").hits().unwrap(), set(&[1]));
}

#[test]
fn append_after_torn_journal_write_survives_restart() {
    let t = TestEngine::new();
    t.engine.append("invoice", [1]).unwrap();
    let journal = t.dir.path().join("kw-journal.dat");

    // Half of a line whose write failed
    let torn = format!("{}\t2", t.engine.signature("meeting"));
    let mut file = std::fs::OpenOptions::new().append(true).open(&journal).unwrap();
    std::io::Write::write_all(&mut file, torn.as_bytes()).unwrap();
    drop(file);

    t.engine.append("receipt", [3]).unwrap();

    let t = open_at(crash(t), EngineConfig::default());
    assert_eq!(t.engine.posting_list("invoice").hits().unwrap(), set(&[1]));
    assert_eq!(t.engine.posting_list("receipt").hits().unwrap(), set(&[3]));
    assert!(t.engine.posting_list("meeting").hits().unwrap().is_empty());
}

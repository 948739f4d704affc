//! Concurrent writers, readers and maintenance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crate::common::*;

#[test]
fn concurrent_disjoint_appends_lose_nothing() {
    let t = TestEngine::with_config(small_config(500));
    let threads = 8u32;
    let per_thread = 250u32;

    thread::scope(|s| {
        for n in 0..threads {
            let engine = &t.engine;
            s.spawn(move || {
                let start = n * per_thread;
                for chunk in (start..start + per_thread).collect::<Vec<_>>().chunks(10) {
                    engine.append("shared", chunk.iter().copied()).unwrap();
                    engine.append(&format!("own{}", n), chunk.iter().copied()).unwrap();
                }
            });
        }
        // Maintenance racing the writers
        let engine = &t.engine;
        s.spawn(move || {
            for _ in 0..20 {
                let forced = OptimizeOptions {
                    force: true,
                    ..OptimizeOptions::default()
                };
                engine.optimize(forced).unwrap();
            }
        });
    });

    let hits = t.engine.posting_list("shared").hits().unwrap();
    assert_eq!(hits.len(), (threads * per_thread) as usize);
    for n in 0..threads {
        let own = t.engine.posting_list(&format!("own{}", n)).hits().unwrap();
        assert_eq!(own.len(), per_thread as usize);
        assert!(own.iter().all(|id| id / per_thread == n));
    }

    let t = t.reopen();
    assert_eq!(
        t.engine.posting_list("shared").hits().unwrap().len(),
        (threads * per_thread) as usize
    );
}

#[test]
fn readers_never_see_a_partial_set_during_migration() {
    let t = TestEngine::with_config(small_config(300));
    let ids: Vec<u32> = (0..50).collect();
    let expected = set(&ids);

    for round in 0..20u32 {
        let term = format!("term{}", round);
        t.engine.append(&term, ids.iter().copied()).unwrap();
        // Filler so migration and flushing actually move containers around
        for i in 0..20u32 {
            t.engine.append(&format!("filler{}-{}", round, i), [i]).unwrap();
        }

        let done = AtomicBool::new(false);
        thread::scope(|s| {
            for _ in 0..4 {
                let engine = &t.engine;
                let term = term.as_str();
                let done = &done;
                let expected = &expected;
                s.spawn(move || {
                    while !done.load(Ordering::Acquire) {
                        let hits = engine.posting_list(term).hits().unwrap();
                        assert!(
                            expected.iter().all(|id| hits.contains(id)),
                            "partial read of {}: {} of {}",
                            term,
                            hits.len(),
                            expected.len()
                        );
                    }
                });
            }
            t.engine.optimize(OptimizeOptions::full()).unwrap();
            done.store(true, Ordering::Release);
        });

        assert!(t.engine.posting_list(&term).journal_hits().is_empty());
        assert_eq!(t.engine.posting_list(&term).hits().unwrap(), expected);
    }
}

#[test]
fn removals_race_with_migration() {
    let t = TestEngine::new();
    let all: Vec<u32> = (0..400).collect();
    t.engine.append("invoice", all.iter().copied()).unwrap();

    thread::scope(|s| {
        let engine = &t.engine;
        s.spawn(move || {
            for id in (0..400u32).filter(|id| id % 2 == 1) {
                engine.posting_list("invoice").remove([id]).unwrap();
            }
        });
        let engine = &t.engine;
        s.spawn(move || {
            for _ in 0..10 {
                engine.optimize(OptimizeOptions::full()).unwrap();
            }
        });
    });

    let expected: Vec<u32> = (0..400).filter(|id| id % 2 == 0).collect();
    assert_eq!(t.engine.posting_list("invoice").hits().unwrap(), set(&expected));
    let t = t.reopen();
    assert_eq!(t.engine.posting_list("invoice").hits().unwrap(), set(&expected));
}

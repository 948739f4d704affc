//! Model-checked operation sequences.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use crate::common::*;

const TERMS: [&str; 4] = ["invoice", "receipt", "meeting", "travel"];

#[derive(Debug, Clone)]
enum Op {
    Append(usize, Vec<u32>),
    Remove(usize, Vec<u32>),
    Migrate(usize),
    QuickOptimize,
    FullOptimize,
    Reopen,
}

fn op() -> impl Strategy<Value = Op> {
    let term = 0..TERMS.len();
    let ids = proptest::collection::vec(0u32..500, 1..12);
    prop_oneof![
        4 => (term.clone(), ids.clone()).prop_map(|(t, ids)| Op::Append(t, ids)),
        2 => (term.clone(), ids).prop_map(|(t, ids)| Op::Remove(t, ids)),
        2 => term.prop_map(Op::Migrate),
        1 => Just(Op::QuickOptimize),
        1 => Just(Op::FullOptimize),
        1 => Just(Op::Reopen),
    ]
}

fn check(t: &TestEngine, model: &BTreeMap<usize, BTreeSet<u32>>) -> Result<(), TestCaseError> {
    for (i, term) in TERMS.iter().enumerate() {
        let expected: Vec<u32> = model.get(&i).map(|s| s.iter().copied().collect()).unwrap_or_default();
        prop_assert_eq!(t.engine.posting_list(term).hits().unwrap().to_vec(), expected, "term {}", term);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_engine_matches_set_model(ops in proptest::collection::vec(op(), 1..40)) {
        let mut t = Some(TestEngine::with_config(small_config(40)));
        let mut model: BTreeMap<usize, BTreeSet<u32>> = BTreeMap::new();

        for op in ops {
            let engine = &t.as_ref().unwrap().engine;
            match op {
                Op::Append(i, ids) => {
                    engine.append(TERMS[i], ids.iter().copied()).unwrap();
                    model.entry(i).or_default().extend(ids);
                }
                Op::Remove(i, ids) => {
                    engine.posting_list(TERMS[i]).remove(ids.iter().copied()).unwrap();
                    if let Some(set) = model.get_mut(&i) {
                        for id in &ids {
                            set.remove(id);
                        }
                    }
                }
                Op::Migrate(i) => {
                    engine.migrate(&engine.signature(TERMS[i])).unwrap();
                }
                Op::QuickOptimize => {
                    engine.optimize(OptimizeOptions { force: true, ..OptimizeOptions::default() }).unwrap();
                }
                Op::FullOptimize => {
                    engine.optimize(OptimizeOptions::full()).unwrap();
                }
                Op::Reopen => {
                    t = Some(t.take().unwrap().reopen());
                }
            }
            check(t.as_ref().unwrap(), &model)?;
        }

        let t = t.take().unwrap().reopen();
        check(&t, &model)?;
    }

    #[test]
    fn prop_append_is_idempotent(ids in proptest::collection::vec(0u32..100_000, 1..60), repeats in 1usize..4) {
        let t = TestEngine::new();
        let mut total_new = 0;
        for _ in 0..repeats {
            total_new += t.engine.append("invoice", ids.iter().copied()).unwrap();
        }
        let unique: BTreeSet<u32> = ids.iter().copied().collect();
        prop_assert_eq!(total_new, unique.len());

        t.engine.optimize(OptimizeOptions::full()).unwrap();
        t.engine.append("invoice", ids.iter().copied()).unwrap();
        let hits = t.engine.posting_list("invoice").hits().unwrap();
        prop_assert_eq!(hits.to_vec(), unique.into_iter().collect::<Vec<_>>());
    }
}

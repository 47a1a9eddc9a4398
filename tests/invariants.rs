//! Property-based fuzzing of allocate/free/duplicate sequences against the
//! invariants spec §8 and §3 describe: every live offset is unique and
//! within range, `totals()` never reports more free slots than exist, and
//! driving every live reference back to zero empties the area exactly.

use std::collections::HashSet;

use proptest::prelude::*;

use swapcore::testutil::{format_area_file, FakeBackend};
use swapcore::{ActivateOptions, BackingKind, SwapConfig, SwapCore, SwapEntry};

const USABLE_SLOTS: u64 = 32;

#[derive(Debug, Clone, Copy)]
enum Op {
    Alloc,
    Free(usize),
    Dup(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Alloc),
        (0usize..64).prop_map(Op::Free),
        (0usize..64).prop_map(Op::Dup),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn allocate_free_duplicate_preserve_invariants(ops in prop::collection::vec(op_strategy(), 1..200)) {
        let backend = FakeBackend::new();
        let mut cfg = SwapConfig::default();
        cfg.cluster_size = 8;
        cfg.latency_quantum = 8;
        let core = SwapCore::new(backend, cfg);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("area");
        format_area_file(&path, 64, (USABLE_SLOTS + 1) as u32, &[]);
        core.activate(&path, BackingKind::File, 64, ActivateOptions::default()).unwrap();

        // Shadow model: entry -> outstanding reference count.
        let mut live: Vec<(SwapEntry, u32)> = Vec::new();

        for op in ops {
            match op {
                Op::Alloc => {
                    if let Some(e) = core.allocate() {
                        prop_assert!(e.offset() >= 1 && (e.offset() as u64) <= USABLE_SLOTS);
                        let already_live: HashSet<_> = live.iter().map(|(e, _)| *e).collect();
                        prop_assert!(!already_live.contains(&e), "allocate handed out an offset already held");
                        live.push((e, 1));
                    }
                }
                Op::Free(i) if !live.is_empty() => {
                    let idx = i % live.len();
                    let (entry, count) = live[idx];
                    core.free(entry).unwrap();
                    if count <= 1 {
                        live.remove(idx);
                    } else {
                        live[idx].1 -= 1;
                    }
                }
                Op::Dup(i) if !live.is_empty() => {
                    let idx = i % live.len();
                    let entry = live[idx].0;
                    core.duplicate(entry).unwrap();
                    live[idx].1 += 1;
                }
                _ => {}
            }

            let (free, total) = core.totals();
            prop_assert_eq!(total, USABLE_SLOTS);
            prop_assert!(free <= USABLE_SLOTS);
            prop_assert_eq!(free, USABLE_SLOTS - live.len() as u64);
        }

        for (entry, count) in live {
            for _ in 0..count {
                core.free(entry).unwrap();
            }
        }
        let (free, total) = core.totals();
        prop_assert_eq!(free, total);
    }
}

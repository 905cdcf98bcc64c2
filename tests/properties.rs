//! Property-based tests that drive random sequences of `alloc`/`free`/`reset`
//! against a plain-Rust shadow model and check the invariants that must hold
//! after every single step, not just at the end.

use blockpool::{Error, Pool};
use proptest::prelude::*;
use std::ptr::NonNull;

const BLOCK_SIZE: usize = 32;
const ALIGNMENT: usize = 8;
const REGION_BYTES: usize = 4096;

#[derive(Clone, Copy, Debug)]
enum Op {
    Alloc,
    Free(usize),
    Reset,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Alloc),
        4 => any::<usize>().prop_map(Op::Free),
        1 => Just(Op::Reset),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn invariants_hold_after_every_step(ops in prop::collection::vec(op_strategy(), 0..300)) {
        let state_size = blockpool::state_size();
        let mut state = vec![0u8; state_size];
        let mut region = vec![0u8; REGION_BYTES];
        let pool = Pool::init(&mut state, &mut region, BLOCK_SIZE, ALIGNMENT).unwrap();
        let total = pool.get_stats().total_blocks;

        // Shadow model: the set of pointers the real pool currently has
        // allocated out, plus the counters we expect `get_stats` to report.
        let mut live: Vec<NonNull<u8>> = Vec::new();
        let mut alloc_count: u32 = 0;
        let mut free_count: u32 = 0;
        let mut peak: u32 = 0;

        for op in ops {
            match op {
                Op::Alloc => match pool.alloc() {
                    Ok(block) => {
                        prop_assert!(pool.contains(block.as_ptr()));
                        prop_assert!(!live.contains(&block), "the same block was handed out twice");
                        live.push(block);
                        alloc_count += 1;
                        peak = peak.max(live.len() as u32);
                    }
                    Err(e) => prop_assert_eq!(e, Error::OutOfMemory, "alloc can only fail this way"),
                },
                Op::Free(pick) => {
                    if !live.is_empty() {
                        let index = pick % live.len();
                        let block = live.remove(index);
                        prop_assert_eq!(pool.free(block), Ok(()));
                        free_count += 1;
                    }
                }
                Op::Reset => {
                    pool.reset();
                    live.clear();
                    alloc_count = 0;
                    free_count = 0;
                    peak = 0;
                }
            }

            let stats = pool.get_stats();
            prop_assert_eq!(stats.total_blocks, total);
            prop_assert_eq!(stats.used_blocks + stats.free_blocks, total);
            prop_assert_eq!(stats.used_blocks as usize, live.len());
            prop_assert_eq!(stats.alloc_count, alloc_count);
            prop_assert_eq!(stats.free_count, free_count);
            prop_assert_eq!(stats.peak_usage, peak);
            prop_assert!(stats.peak_usage >= stats.used_blocks);
        }
    }

    #[test]
    fn freeing_an_already_freed_block_is_rejected_without_side_effects(
        ops in prop::collection::vec(op_strategy(), 0..100),
        pick in any::<usize>(),
    ) {
        let state_size = blockpool::state_size();
        let mut state = vec![0u8; state_size];
        let mut region = vec![0u8; REGION_BYTES];
        let pool = Pool::init(&mut state, &mut region, BLOCK_SIZE, ALIGNMENT).unwrap();

        let mut live: Vec<NonNull<u8>> = Vec::new();
        let mut freed: Vec<NonNull<u8>> = Vec::new();
        for op in ops {
            match op {
                Op::Alloc => {
                    if let Ok(block) = pool.alloc() {
                        live.push(block);
                    }
                }
                Op::Free(inner_pick) => {
                    if !live.is_empty() {
                        let index = inner_pick % live.len();
                        let block = live.remove(index);
                        prop_assert_eq!(pool.free(block), Ok(()));
                        freed.push(block);
                    }
                }
                Op::Reset => {
                    pool.reset();
                    live.clear();
                    freed.clear();
                }
            }
        }

        if let Some(&block) = freed.get(pick % freed.len().max(1)) {
            if !freed.is_empty() {
                let before = pool.get_stats();
                prop_assert_eq!(pool.free(block), Err(Error::DoubleFree));
                let after = pool.get_stats();
                prop_assert_eq!(before, after, "a rejected free must not change stats");
            }
        }
    }
}

//! Bulk-synchronous round separation: an item pushed during round N is
//! popped only after every round-N item, whatever the thread count or
//! chunk capacity.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use proptest::prelude::*;

use worklist_rs::{LoopOptions, Runtime, RuntimeConfig, WorklistSpec};

/// Item tagged with the round that pushed it.
#[derive(Clone, Copy, Debug)]
struct Tagged {
    round: u32,
    #[allow(dead_code)]
    id: u32,
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 24,
        ..ProptestConfig::default()
    })]

    #[test]
    fn rounds_never_interleave(
        threads in 1usize..5,
        seeds in 1u32..40,
        fanout in 0u32..3,
        rounds in 1u32..5,
        chunk_capacity in 1usize..33,
    ) {
        let rt = Runtime::new(RuntimeConfig {
            threads,
            ..RuntimeConfig::default()
        });
        let order: Mutex<Vec<u32>> = Mutex::new(Vec::new());
        let ids = AtomicUsize::new(0);

        rt.for_each(
            (0..seeds).map(|id| Tagged { round: 0, id }),
            |item, ctx| {
                order.lock().unwrap().push(item.round);
                if item.round + 1 < rounds {
                    for _ in 0..fanout {
                        let id = ids.fetch_add(1, Ordering::Relaxed) as u32;
                        ctx.push(Tagged { round: item.round + 1, id });
                    }
                }
            },
            LoopOptions::new(WorklistSpec::bulk_synchronous())
                .chunk_capacity(chunk_capacity),
        );

        let order = order.into_inner().unwrap();
        // The recorded round tags must be globally non-decreasing.
        for pair in order.windows(2) {
            prop_assert!(
                pair[0] <= pair[1],
                "round {} popped after round {}", pair[1], pair[0]
            );
        }
    }
}

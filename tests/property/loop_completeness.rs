//! Completeness under arbitrary bounded derivation trees: whatever the
//! seeds, fanout, and worklist variant, every derivable item is
//! processed and the loop terminates.

use std::sync::atomic::{AtomicU32, Ordering};

use proptest::prelude::*;

use worklist_rs::{LoopOptions, Runtime, RuntimeConfig, WorklistSpec};

fn spec_for(variant: u8) -> WorklistSpec<u32> {
    match variant {
        0 => WorklistSpec::chunked_fifo(),
        1 => WorklistSpec::chunked_lifo(),
        2 => WorklistSpec::per_socket_chunked_fifo(),
        3 => WorklistSpec::per_socket_chunked_lifo(),
        4 => WorklistSpec::bulk_synchronous(),
        5 => WorklistSpec::obim(|x: &u32| *x / 8),
        _ => WorklistSpec::obim(|x: &u32| *x / 8).with_barrier(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 24,
        ..ProptestConfig::default()
    })]

    #[test]
    fn every_derivable_item_processed(
        variant in 0u8..7,
        threads in 1usize..5,
        fanout in 1u32..4,
        n in 1u32..600,
        seeds in proptest::collection::vec(0u32..600, 1..8),
        chunk_capacity in 1usize..65,
    ) {
        let seeds: Vec<u32> = seeds.into_iter().filter(|s| *s < n).collect();
        let rt = Runtime::new(RuntimeConfig {
            threads,
            ..RuntimeConfig::default()
        });
        let hits: Vec<AtomicU32> = (0..n).map(|_| AtomicU32::new(0)).collect();

        rt.for_each(
            seeds.clone(),
            |&item, ctx| {
                hits[item as usize].fetch_add(1, Ordering::Relaxed);
                for k in 1..=fanout {
                    let child = item * fanout + k;
                    if child < n {
                        ctx.push(child);
                    }
                }
            },
            LoopOptions::new(spec_for(variant)).chunk_capacity(chunk_capacity),
        );

        // Recompute the closure serially and compare coverage.
        let mut reachable = vec![false; n as usize];
        let mut stack: Vec<u32> = seeds;
        while let Some(item) = stack.pop() {
            if std::mem::replace(&mut reachable[item as usize], true) {
                continue;
            }
            for k in 1..=fanout {
                let child = item * fanout + k;
                if child < n {
                    stack.push(child);
                }
            }
        }

        for i in 0..n as usize {
            let processed = hits[i].load(Ordering::Relaxed) > 0;
            prop_assert_eq!(
                processed, reachable[i],
                "item {} processed={} reachable={}", i, processed, reachable[i]
            );
        }
    }
}

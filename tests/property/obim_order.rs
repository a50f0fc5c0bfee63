//! OBIM ordering properties.
//!
//! Strict global priority order is explicitly NOT guaranteed; these
//! properties pin down what is:
//!
//! - one worker with pre-seeded work drains buckets in ascending order;
//! - with several workers, processing trends from low priorities to
//!   high ones (monotone in expectation, not pointwise).

use std::sync::Mutex;

use proptest::prelude::*;

use worklist_rs::{LoopOptions, Runtime, RuntimeConfig, WorklistSpec};

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        ..ProptestConfig::default()
    })]

    /// Single worker, seeds only: items come out bucket-sorted.
    #[test]
    fn single_worker_is_bucket_sorted(
        items in proptest::collection::vec(0u32..1000, 1..200),
        shift in 0u32..6,
    ) {
        let rt = Runtime::new(RuntimeConfig {
            threads: 1,
            ..RuntimeConfig::default()
        });
        let order: Mutex<Vec<u32>> = Mutex::new(Vec::new());

        rt.for_each(
            items.clone(),
            |&item, _ctx| order.lock().unwrap().push(item >> shift),
            LoopOptions::new(WorklistSpec::obim(move |x: &u32| *x >> shift)),
        );

        let order = order.into_inner().unwrap();
        prop_assert_eq!(order.len(), items.len());
        for pair in order.windows(2) {
            prop_assert!(pair[0] <= pair[1], "bucket order violated");
        }
    }

    /// Multiple workers: low-half priorities are, on average, processed
    /// earlier than high-half priorities.
    #[test]
    fn parallel_processing_trends_upward(
        threads in 2usize..5,
        n in 64u32..256,
    ) {
        let rt = Runtime::new(RuntimeConfig {
            threads,
            ..RuntimeConfig::default()
        });
        // Priorities 0..n in a scrambled seed order.
        let mut items: Vec<u32> = (0..n).collect();
        let mut state = 0x9E3779B97F4A7C15u64 ^ u64::from(n);
        for i in (1..items.len()).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            items.swap(i, (state % (i as u64 + 1)) as usize);
        }

        let order: Mutex<Vec<u32>> = Mutex::new(Vec::new());
        rt.for_each(
            items,
            |&item, _ctx| order.lock().unwrap().push(item),
            LoopOptions::new(WorklistSpec::obim(|x: &u32| *x)).chunk_capacity(4),
        );

        let order = order.into_inner().unwrap();
        prop_assert_eq!(order.len() as u32, n);

        let mid = n / 2;
        let mut low_rank_sum = 0usize;
        let mut low_count = 0usize;
        let mut high_rank_sum = 0usize;
        let mut high_count = 0usize;
        for (rank, &p) in order.iter().enumerate() {
            if p < mid {
                low_rank_sum += rank;
                low_count += 1;
            } else {
                high_rank_sum += rank;
                high_count += 1;
            }
        }
        let low_mean = low_rank_sum as f64 / low_count as f64;
        let high_mean = high_rank_sum as f64 / high_count as f64;
        prop_assert!(
            low_mean < high_mean,
            "low-priority work was not front-loaded: {} vs {}", low_mean, high_mean
        );
    }
}

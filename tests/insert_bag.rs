//! InsertBag accounting under concurrent pushers, and its role as the
//! seed container for loops.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use worklist_rs::{InsertBag, LoopOptions, Runtime, RuntimeConfig, WorklistSpec};

/// N threads push M items each; iteration yields exactly N·M items and
/// per-thread counts match what was pushed.
#[test]
fn n_threads_m_items_accounting() {
    const N: usize = 8;
    const M: usize = 5000;

    let bag: InsertBag<(usize, usize)> = InsertBag::new();
    thread::scope(|scope| {
        for t in 0..N {
            let bag = &bag;
            scope.spawn(move || {
                for i in 0..M {
                    bag.push((t, i));
                }
            });
        }
    });

    let mut bag = bag;
    assert_eq!(bag.len(), N * M);

    let mut per_thread = [0usize; N];
    for &(t, _) in bag.iter() {
        per_thread[t] += 1;
    }
    assert_eq!(per_thread, [M; N]);
}

/// Pushes from inside a loop land in the bag alongside external pushes;
/// nothing is lost or duplicated.
#[test]
fn bag_as_scratch_accumulator() {
    let rt = Runtime::new(RuntimeConfig {
        threads: 4,
        ..RuntimeConfig::default()
    });
    let bag: InsertBag<u32> = InsertBag::new();

    rt.for_each(
        0..1000u32,
        |&item, _ctx| {
            if item % 3 == 0 {
                bag.push(item);
            }
        },
        LoopOptions::new(WorklistSpec::chunked_fifo()),
    );

    let mut bag = bag;
    let mut collected: Vec<u32> = bag.drain().collect();
    collected.sort_unstable();
    let expected: Vec<u32> = (0..1000).filter(|x| x % 3 == 0).collect();
    assert_eq!(collected, expected);
}

/// A drained bag seeds a loop; the loop sees every bagged item.
#[test]
fn bag_seeds_for_each() {
    let rt = Runtime::new(RuntimeConfig {
        threads: 4,
        ..RuntimeConfig::default()
    });

    let mut bag: InsertBag<u32> = (0..500).collect();
    let count = AtomicUsize::new(0);
    rt.for_each(
        bag.drain(),
        |_, _ctx| {
            count.fetch_add(1, Ordering::Relaxed);
        },
        LoopOptions::new(WorklistSpec::per_socket_chunked_fifo()),
    );
    assert_eq!(count.load(Ordering::Relaxed), 500);
    assert!(bag.is_empty());
}

/// clear_parallel leaves an empty, reusable bag.
#[test]
fn clear_parallel_resets() {
    let rt = Runtime::new(RuntimeConfig {
        threads: 4,
        ..RuntimeConfig::default()
    });
    let mut bag: InsertBag<Vec<u8>> = InsertBag::new();
    for i in 0..10_000 {
        bag.push(vec![0u8; i % 64]);
    }
    bag.clear_parallel(&rt);
    assert!(bag.is_empty());
    bag.push(vec![1]);
    assert_eq!(bag.len(), 1);
}

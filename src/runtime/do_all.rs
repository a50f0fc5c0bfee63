//! `do_all`: non-speculative parallel-for.
//!
//! The degenerate loop: no worklist, no dynamic pushes, no termination
//! vote — workers partition the input and join. Two distribution modes:
//!
//! - **Static** (default): contiguous equal shares. Zero coordination;
//!   right for uniform per-item cost.
//! - **Steal**: workers claim fixed-size blocks from a shared cursor.
//!   One `fetch_add` per block buys load balance for irregular costs.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Instant;

use super::config::{DoAllOptions, RuntimeConfig};
use super::metrics::{LoopMetricsLocal, LoopReport};
use super::worker_id;

/// Blocks per worker the steal grain aims for; a worker that runs hot
/// can claim many times its share.
const STEAL_BLOCKS_PER_WORKER: usize = 8;

pub(crate) fn run<T, F>(
    cfg: RuntimeConfig,
    items: &[T],
    operator: F,
    options: DoAllOptions,
) -> LoopReport
where
    T: Sync,
    F: Fn(&T) + Sync,
{
    let threads = cfg.threads;
    let len = items.len();
    let block = options
        .block
        .unwrap_or_else(|| (len / (threads * STEAL_BLOCKS_PER_WORKER)).max(1));

    let cursor = AtomicUsize::new(0);
    let failed = AtomicBool::new(false);
    let first_panic = Mutex::new(None);
    let started = Instant::now();

    let mut report = LoopReport {
        loopname: options.loopname,
        workers: threads,
        ..LoopReport::default()
    };

    thread::scope(|scope| {
        let operator = &operator;
        let cursor = &cursor;
        let failed = &failed;
        let first_panic = &first_panic;
        let mut handles = Vec::with_capacity(threads);
        for w in 0..threads {
            let steal = options.steal;
            let handle = thread::Builder::new()
                .name(format!("worklist-worker-{w}"))
                .spawn_scoped(scope, move || {
                    worker_id::set_current_worker_id(Some(w));
                    let mut m = LoopMetricsLocal::default();

                    let result = panic::catch_unwind(AssertUnwindSafe(|| {
                        if steal {
                            // Dynamic: claim blocks until the cursor runs out.
                            loop {
                                if failed.load(Ordering::Acquire) {
                                    break;
                                }
                                let start = cursor.fetch_add(block, Ordering::Relaxed);
                                if start >= len {
                                    break;
                                }
                                let end = (start + block).min(len);
                                for item in &items[start..end] {
                                    operator(item);
                                }
                                m.iterations += (end - start) as u64;
                            }
                        } else {
                            // Static: contiguous share for worker w.
                            let per = (len + threads - 1) / threads;
                            let start = (w * per).min(len);
                            let end = ((w + 1) * per).min(len);
                            for (i, item) in items[start..end].iter().enumerate() {
                                if failed.load(Ordering::Acquire) {
                                    m.iterations += i as u64;
                                    return;
                                }
                                operator(item);
                            }
                            m.iterations += (end - start) as u64;
                        }
                    }));

                    if let Err(payload) = result {
                        let mut slot = first_panic.lock().expect("panic mutex poisoned");
                        if slot.is_none() {
                            *slot = Some(payload);
                        }
                        failed.store(true, Ordering::Release);
                    }

                    worker_id::set_current_worker_id(None);
                    m
                })
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }
        for handle in handles {
            if let Ok(m) = handle.join() {
                report.merge_worker(&m);
            }
        }
    });

    report.duration = started.elapsed();

    if let Some(payload) = first_panic.lock().expect("panic mutex poisoned").take() {
        panic::resume_unwind(payload);
    }
    report
}

//! The `for_each` driver: a fixed worker pool over a pluggable worklist.
//!
//! # Shape of one invocation
//!
//! ```text
//!  for_each(seeds, op, options)
//!    │  build worklist, pre-count seeds into in_flight
//!    │  spawn scoped workers "worklist-worker-{w}"
//!    ▼
//!  worker w:  push seed share ──► loop:
//!               pop ── Some(item) ──► [guard?] op(item, ctx) ──► bookkeep
//!               │                        ctx.push ──► worklist (count++)
//!               └─ None ──► in_flight == 0 ? done : spin→yield→park
//!    │
//!    ▼
//!  join, merge metrics, re-raise first operator panic
//! ```
//!
//! # Termination
//!
//! A single counter tracks live work: seeds + pushes − completions.
//! A worker that observes "nothing visible to me anywhere" (the
//! worklists' `pop -> None` contract) *and* a zero count sets the done
//! flag. The counter is raised before an item becomes visible and
//! lowered only after its operator completed, so zero is exact — no
//! idle votes, no generations, no ABA.
//!
//! # Failure
//!
//! Operator panics are caught per item; the first payload is kept, the
//! done flag poisons the loop, peers finish their current item, and the
//! panic is re-raised on the caller after teardown. A missed unpark can
//! only delay a worker by one park timeout, never strand it.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use crossbeam_utils::sync::{Parker, Unparker};

use crate::worklist::{BuildParams, Worklist};

use super::config::{ConflictGuard, DoAllOptions, LoopOptions, RuntimeConfig};
use super::context::UserContext;
use super::metrics::{LoopMetricsLocal, LoopReport};
use super::topology::Topology;
use super::worker_id;

// ============================================================================
// Runtime
// ============================================================================

/// Entry point for parallel loops. Holds the configuration and the
/// detected socket topology; each loop invocation spawns its own fixed
/// worker pool and blocks until the loop terminates.
pub struct Runtime {
    config: RuntimeConfig,
    topology: Arc<Topology>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl Runtime {
    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    pub fn new(config: RuntimeConfig) -> Self {
        config.validate();
        Self {
            config,
            topology: Arc::new(Topology::detect()),
        }
    }

    /// Construct with an explicit topology (tests, benchmarks, or
    /// callers with out-of-band placement knowledge).
    pub fn with_topology(config: RuntimeConfig, topology: Topology) -> Self {
        config.validate();
        Self {
            config,
            topology: Arc::new(topology),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn threads(&self) -> usize {
        self.config.threads
    }

    /// Run `operator` over `seeds` and everything it derives, until the
    /// worklist drains (or the operator breaks the loop). Blocking.
    ///
    /// The operator may be invoked concurrently from all workers and,
    /// with aborts or conflict guards in play, more than once per item.
    ///
    /// # Panics
    ///
    /// Re-raises the first operator panic after all workers have
    /// stopped.
    pub fn for_each<T, F>(
        &self,
        seeds: impl IntoIterator<Item = T>,
        operator: F,
        options: LoopOptions<T>,
    ) -> LoopReport
    where
        T: Send,
        F: Fn(&T, &mut UserContext<'_, T>) + Sync,
    {
        let threads = self.config.threads;
        let params = BuildParams {
            workers: threads,
            chunk_capacity: options.chunk_capacity.unwrap_or(self.config.chunk_capacity),
            topology: Arc::clone(&self.topology),
            seed: self.config.seed,
            backscan_period: self.config.backscan_period,
        };

        let seeds: Vec<T> = seeds.into_iter().collect();
        let mut parts = partition(seeds, threads);

        let mut parkers: Vec<Option<Parker>> = (0..threads).map(|_| Some(Parker::new())).collect();
        let unparkers = parkers
            .iter()
            .map(|p| p.as_ref().expect("parker present").unparker().clone())
            .collect();

        let seed_count: usize = parts.iter().map(Vec::len).sum();
        let ctl = LoopControl {
            wl: Worklist::build(options.worklist, &params),
            in_flight: AtomicUsize::new(seed_count),
            done: AtomicBool::new(false),
            breaking: AtomicBool::new(false),
            unparkers,
            next_unpark: AtomicUsize::new(0),
            panic: Mutex::new(None),
        };

        let guard = options.conflict_guard;
        let cfg = self.config;
        let started = Instant::now();

        let mut report = LoopReport {
            loopname: options.loopname,
            workers: threads,
            ..LoopReport::default()
        };

        thread::scope(|scope| {
            let ctl = &ctl;
            let operator = &operator;
            let mut handles = Vec::with_capacity(threads);
            for w in 0..threads {
                let seeds = std::mem::take(&mut parts[w]);
                let parker = parkers[w].take().expect("one parker per worker");
                let guard = guard.clone();
                let handle = thread::Builder::new()
                    .name(format!("worklist-worker-{w}"))
                    .spawn_scoped(scope, move || {
                        worker_main(w, ctl, operator, guard, seeds, parker, &cfg)
                    })
                    .expect("failed to spawn worker thread");
                handles.push(handle);
            }
            for handle in handles {
                match handle.join() {
                    Ok(metrics) => report.merge_worker(&metrics),
                    // worker_main catches operator panics itself; a
                    // panic here is an internal invariant violation,
                    // but surface it the same way.
                    Err(payload) => ctl.record_panic(payload),
                }
            }
        });

        report.duration = started.elapsed();

        if let Some(payload) = ctl.panic.lock().expect("panic mutex poisoned").take() {
            panic::resume_unwind(payload);
        }
        report
    }

    /// Run `f(worker_id, workers)` once on every worker. Blocking.
    pub fn on_each<F>(&self, f: F)
    where
        F: Fn(usize, usize) + Sync,
    {
        let threads = self.config.threads;
        thread::scope(|scope| {
            let f = &f;
            for w in 0..threads {
                thread::Builder::new()
                    .name(format!("worklist-worker-{w}"))
                    .spawn_scoped(scope, move || {
                        worker_id::set_current_worker_id(Some(w));
                        f(w, threads);
                        worker_id::set_current_worker_id(None);
                    })
                    .expect("failed to spawn worker thread");
            }
        });
    }

    /// Non-speculative parallel-for over a slice: no worklist, no
    /// dynamic pushes. Static contiguous partition by default; dynamic
    /// block claiming with `options.steal`. Blocking.
    ///
    /// # Panics
    ///
    /// Re-raises the first operator panic after all workers have
    /// stopped.
    pub fn do_all<T, F>(&self, items: &[T], operator: F, options: DoAllOptions) -> LoopReport
    where
        T: Sync,
        F: Fn(&T) + Sync,
    {
        super::do_all::run(self.config, items, operator, options)
    }
}

/// Split seeds into contiguous per-worker shares.
fn partition<T>(seeds: Vec<T>, workers: usize) -> Vec<Vec<T>> {
    let per = (seeds.len() + workers - 1) / workers.max(1);
    let mut parts: Vec<Vec<T>> = Vec::with_capacity(workers);
    let mut iter = seeds.into_iter();
    for _ in 0..workers {
        parts.push(iter.by_ref().take(per.max(1)).collect());
    }
    parts
}

// ============================================================================
// Shared loop state
// ============================================================================

/// State shared by all workers of one `for_each` invocation.
pub(crate) struct LoopControl<T> {
    pub(crate) wl: Worklist<T>,
    /// Seeds + pushes − completions. Zero means fully drained.
    in_flight: AtomicUsize,
    /// Terminal flag: drained, broken, or poisoned by a panic.
    done: AtomicBool,
    /// Cooperative break requested by an operator.
    breaking: AtomicBool,
    unparkers: Vec<Unparker>,
    next_unpark: AtomicUsize,
    /// First operator panic; re-raised on the caller after join.
    panic: Mutex<Option<Box<dyn Any + Send + 'static>>>,
}

impl<T> LoopControl<T> {
    /// Account for a new item before it becomes visible.
    #[inline]
    pub(crate) fn note_spawned(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    /// Account for a completed item; the worker that drains the count
    /// to zero shuts the loop down.
    #[inline]
    fn note_completed(&self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.initiate_done();
        }
    }

    #[inline]
    fn exiting(&self) -> bool {
        self.done.load(Ordering::Acquire) || self.breaking.load(Ordering::Acquire)
    }

    pub(crate) fn unpark_one(&self) {
        let n = self.unparkers.len();
        if n == 0 {
            return;
        }
        let idx = self.next_unpark.fetch_add(1, Ordering::Relaxed) % n;
        self.unparkers[idx].unpark();
    }

    fn unpark_all(&self) {
        for u in &self.unparkers {
            u.unpark();
        }
    }

    fn initiate_done(&self) {
        self.done.store(true, Ordering::Release);
        self.unpark_all();
    }

    pub(crate) fn initiate_break(&self) {
        self.breaking.store(true, Ordering::Release);
        self.unpark_all();
    }

    fn record_panic(&self, payload: Box<dyn Any + Send + 'static>) {
        let mut slot = self.panic.lock().expect("panic mutex poisoned");
        if slot.is_none() {
            *slot = Some(payload);
        }
        drop(slot);
        self.initiate_done();
    }
}

// ============================================================================
// Worker loop
// ============================================================================

fn worker_main<T, F>(
    w: usize,
    ctl: &LoopControl<T>,
    operator: &F,
    guard: Option<Arc<dyn ConflictGuard<T>>>,
    seeds: Vec<T>,
    parker: Parker,
    cfg: &RuntimeConfig,
) -> LoopMetricsLocal
where
    T: Send,
    F: Fn(&T, &mut UserContext<'_, T>) + Sync,
{
    worker_id::set_current_worker_id(Some(w));
    let mut m = LoopMetricsLocal::default();

    // Parallel seeding: each worker pushes its own share. The seeds were
    // counted into in_flight before any worker started, so a fast peer
    // can never see "empty and zero" mid-seed.
    for item in seeds {
        if ctl.wl.push(w, item, &mut m) {
            ctl.unpark_one();
        }
    }

    let mut idle = TieredIdle::new();
    loop {
        if ctl.exiting() {
            break;
        }
        let Some(item) = ctl.wl.pop(w, &mut m) else {
            if ctl.in_flight.load(Ordering::Acquire) == 0 {
                ctl.initiate_done();
                break;
            }
            m.empty_polls += 1;
            if idle.next_round(cfg) {
                m.parks += 1;
                parker.park_timeout(cfg.park_timeout);
            }
            continue;
        };
        idle.reset();

        if let Some(g) = guard.as_deref() {
            if !g.try_enter(&item) {
                // Deferred by the conflict manager: retry later. The
                // item keeps its in-flight slot.
                m.conflicts += 1;
                if ctl.wl.push(w, item, &mut m) {
                    ctl.unpark_one();
                }
                continue;
            }
        }

        let mut ctx = UserContext::new(w, ctl, &mut m);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| operator(&item, &mut ctx)));
        let aborted = ctx.aborted();

        if let Some(g) = guard.as_deref() {
            g.exit(&item);
        }

        match outcome {
            Ok(()) => {
                m.iterations += 1;
                if aborted && !ctl.exiting() {
                    // Retry: the item keeps its in-flight slot, so no
                    // completion is recorded.
                    m.aborts += 1;
                    if ctl.wl.push(w, item, &mut m) {
                        ctl.unpark_one();
                    }
                } else {
                    ctl.note_completed();
                }
            }
            Err(payload) => {
                ctl.record_panic(payload);
                break;
            }
        }
    }

    ctl.wl.retire_worker(w);
    worker_id::set_current_worker_id(None);
    m
}

/// Tiered idle strategy: spin, then occasional yields, then park with a
/// timeout. Matches the idle behavior of the loop's wakeup contract —
/// parking is bounded, so a lost unpark costs one timeout at most.
struct TieredIdle {
    rounds: u32,
}

impl TieredIdle {
    fn new() -> Self {
        Self { rounds: 0 }
    }

    fn reset(&mut self) {
        self.rounds = 0;
    }

    /// Returns `true` when the caller should park.
    fn next_round(&mut self, cfg: &RuntimeConfig) -> bool {
        self.rounds = self.rounds.saturating_add(1);
        if self.rounds <= cfg.spin_iters {
            std::hint::spin_loop();
            return false;
        }
        if (self.rounds & 0xF) == 0 {
            thread::yield_now();
        }
        true
    }
}

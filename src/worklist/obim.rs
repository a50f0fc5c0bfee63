//! Ordered-by-integer-metric (OBIM) worklist.
//!
//! A map from integer priority to a per-socket chunked FIFO bucket.
//! Global priority order is *approximate* by design: each worker keeps a
//! cursor and processes non-decreasing priorities between refill points,
//! retreating when it pushes below its own cursor; under contention
//! workers converge toward the global minimum. Algorithms using OBIM
//! (Δ-stepping SSSP and friends) must tolerate out-of-order processing —
//! their correctness comes from monotone relaxation, not from strict
//! priority.
//!
//! # Cursor discipline
//!
//! ```text
//! push(w, t):  p = indexer(t); bucket[p].push(w, t)
//!              if p < cursor(w): retreat(w) = min(retreat(w), p)
//!              min_hint = min(min_hint, p)        (monotone, advisory)
//!
//! pop(w):      honor retreat, drain cursor bucket,
//!              else scan upward from cursor for a non-empty bucket,
//!              every backscan_period refills scan from min_hint instead,
//!              and always backscan once before reporting empty
//! ```
//!
//! The final backscan makes `pop -> None` authoritative for this worker:
//! any item it could ever reach (including its own unpublished push
//! chunks, which live inside the buckets' per-worker slots) has been
//! looked for. Termination detection depends on that.
//!
//! `min_hint` is only ever lowered. A stale-low hint costs a few extra
//! empty probes; raising it could race with a concurrent lower push.
//!
//! # Barrier mode
//!
//! `with_barrier` drains one globally-published priority per phase.
//! Workers that find the current bucket empty flush the push chunks of
//! every bucket they touched, rendezvous, and the barrier leader scans
//! for the next non-empty priority. Superseded items at higher
//! priorities are then guaranteed to see all lower-priority updates.
//!
//! # Starvation caveat
//!
//! `backscan_period` trades scan overhead against pickup latency for
//! items pushed below every cursor. Very large periods delay such items
//! until some worker's cursor happens to pass them; the final-backscan
//! rule bounds this by loop emptiness, not by time.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use crate::runtime::barrier::PhaseBarrier;
use crate::runtime::metrics::LoopMetricsLocal;
use crate::runtime::rng::splitmix64;
use crate::runtime::topology::Topology;

use super::chunked::{ChunkedQueue, Placement};
use super::{BuildParams, PerWorkerSlots, PopOrder};

/// Sentinel priority: "no priority published". Indexers must not
/// return this value.
const NO_PRIORITY: u32 = u32::MAX;

type Bucket<T> = Arc<ChunkedQueue<T>>;

struct Cursor<T> {
    current: u32,
    bucket: Option<Bucket<T>>,
    /// Lowest priority this worker pushed below its cursor since the
    /// last refill.
    retreat: Option<u32>,
    refills: u32,
    /// Barrier mode only: buckets with possibly-open push chunks.
    dirty: Vec<(u32, Bucket<T>)>,
}

struct BarrierMode {
    barrier: PhaseBarrier,
    /// Globally published priority being drained this phase.
    current: AtomicU32,
    drained: AtomicBool,
}

pub(crate) struct Obim<T> {
    indexer: Arc<dyn Fn(&T) -> u32 + Send + Sync>,
    buckets: RwLock<BTreeMap<u32, Bucket<T>>>,
    min_hint: AtomicU32,
    cursors: PerWorkerSlots<Cursor<T>>,
    backscan_period: u32,
    barrier: Option<BarrierMode>,
    // Parameters for lazily building buckets.
    workers: usize,
    chunk_capacity: usize,
    topology: Arc<Topology>,
    seed: u64,
}

impl<T: Send> Obim<T> {
    pub fn new(
        indexer: Arc<dyn Fn(&T) -> u32 + Send + Sync>,
        barrier: bool,
        params: &BuildParams,
    ) -> Self {
        Self {
            indexer,
            buckets: RwLock::new(BTreeMap::new()),
            min_hint: AtomicU32::new(NO_PRIORITY),
            cursors: PerWorkerSlots::new(params.workers, |_| Cursor {
                current: 0,
                bucket: None,
                retreat: None,
                refills: 0,
                dirty: Vec::new(),
            }),
            backscan_period: params.backscan_period.max(1),
            barrier: barrier.then(|| BarrierMode {
                barrier: PhaseBarrier::new(params.workers),
                current: AtomicU32::new(NO_PRIORITY),
                drained: AtomicBool::new(false),
            }),
            workers: params.workers,
            chunk_capacity: params.chunk_capacity,
            topology: Arc::clone(&params.topology),
            seed: params.seed,
        }
    }

    pub fn push(&self, w: usize, item: T, m: &mut LoopMetricsLocal) -> bool {
        let p = (self.indexer)(&item);
        debug_assert!(p != NO_PRIORITY, "indexer returned the reserved priority");
        let bucket = self.bucket_at(p);
        let published = bucket.push(w, item, m);
        self.min_hint.fetch_min(p, Ordering::Relaxed);

        self.cursors.with(w, |cur| {
            if p < cur.current {
                cur.retreat = Some(cur.retreat.map_or(p, |r| r.min(p)));
            }
            if self.barrier.is_some() && !cur.dirty.iter().any(|(dp, _)| *dp == p) {
                cur.dirty.push((p, Arc::clone(&bucket)));
            }
        });
        published
    }

    pub fn pop(&self, w: usize, m: &mut LoopMetricsLocal) -> Option<T> {
        match &self.barrier {
            None => self.pop_chaotic(w, m),
            Some(mode) => self.pop_phased(w, mode, m),
        }
    }

    pub fn retire_worker(&self, w: usize) {
        if let Some(mode) = &self.barrier {
            let mut m = LoopMetricsLocal::default();
            self.cursors.with(w, |cur| {
                for (_, bucket) in cur.dirty.drain(..) {
                    bucket.flush_local(w, &mut m);
                }
            });
            mode.barrier.leave();
        }
    }

    // ------------------------------------------------------------------
    // Chaotic (default) mode
    // ------------------------------------------------------------------

    fn pop_chaotic(&self, w: usize, m: &mut LoopMetricsLocal) -> Option<T> {
        self.cursors.with(w, |cur| {
            // A push below the cursor rewinds it before the next pop.
            if let Some(r) = cur.retreat.take() {
                if r < cur.current || cur.bucket.is_none() {
                    cur.current = r;
                    cur.bucket = self.lookup(r);
                }
            }

            if let Some(bucket) = &cur.bucket {
                if let Some(item) = bucket.pop(w, m) {
                    return Some(item);
                }
            }

            // Refill: advance the cursor to the next non-empty bucket,
            // periodically rescanning from the global minimum so
            // late-pushed low buckets are picked up.
            cur.refills = cur.refills.wrapping_add(1);
            let backscan = cur.refills % self.backscan_period == 0;
            let from = if backscan {
                self.min_hint.load(Ordering::Relaxed).min(cur.current)
            } else {
                cur.current
            };
            if let Some((p, item, bucket)) = self.scan_from(w, from, m) {
                cur.current = p;
                cur.bucket = Some(bucket);
                return Some(item);
            }

            // Nothing at or above `from`: one authoritative backscan
            // before conceding emptiness.
            let hint = self.min_hint.load(Ordering::Relaxed);
            if hint < from {
                if let Some((p, item, bucket)) = self.scan_from(w, hint, m) {
                    cur.current = p;
                    cur.bucket = Some(bucket);
                    return Some(item);
                }
            }
            None
        })
    }

    // ------------------------------------------------------------------
    // Barrier mode
    // ------------------------------------------------------------------

    fn pop_phased(&self, w: usize, mode: &BarrierMode, m: &mut LoopMetricsLocal) -> Option<T> {
        loop {
            if mode.drained.load(Ordering::Acquire) {
                return None;
            }
            let gp = mode.current.load(Ordering::Acquire);
            if gp != NO_PRIORITY {
                if let Some(bucket) = self.lookup(gp) {
                    if let Some(item) = bucket.pop(w, m) {
                        return Some(item);
                    }
                }
            }

            // Current bucket exhausted from this worker's view: make all
            // our pushed items visible, re-check once (the flush may have
            // fed the current bucket), then rendezvous.
            self.flush_dirty(w, m);
            if gp != NO_PRIORITY {
                if let Some(bucket) = self.lookup(gp) {
                    if let Some(item) = bucket.pop(w, m) {
                        return Some(item);
                    }
                }
            }

            mode.barrier.arrive_with(|| {
                match self.min_nonempty_shared() {
                    Some(p) => mode.current.store(p, Ordering::Release),
                    None => {
                        mode.current.store(NO_PRIORITY, Ordering::Release);
                        mode.drained.store(true, Ordering::Release);
                    }
                }
            });
        }
    }

    fn flush_dirty(&self, w: usize, m: &mut LoopMetricsLocal) {
        self.cursors.with(w, |cur| {
            for (_, bucket) in cur.dirty.drain(..) {
                bucket.flush_local(w, m);
            }
        });
    }

    /// Lowest priority whose bucket has sealed chunks. Runs on the
    /// barrier leader while every worker is flushed and parked, so
    /// shared-list emptiness is the whole truth.
    fn min_nonempty_shared(&self) -> Option<u32> {
        let map = self.buckets.read().expect("priority map poisoned");
        map.iter()
            .find(|(_, bucket)| !bucket.shared_is_empty())
            .map(|(p, _)| *p)
    }

    // ------------------------------------------------------------------
    // Priority map
    // ------------------------------------------------------------------

    fn lookup(&self, p: u32) -> Option<Bucket<T>> {
        let map = self.buckets.read().expect("priority map poisoned");
        map.get(&p).cloned()
    }

    /// Get or lazily create the bucket at `p`. Creation is idempotent
    /// under race: the double-checked insert under the write lock keeps
    /// exactly one bucket per priority.
    fn bucket_at(&self, p: u32) -> Bucket<T> {
        if let Some(bucket) = self.lookup(p) {
            return bucket;
        }
        let mut map = self.buckets.write().expect("priority map poisoned");
        Arc::clone(map.entry(p).or_insert_with(|| {
            Arc::new(ChunkedQueue::new(
                PopOrder::Fifo,
                Placement::PerSocket(Arc::clone(&self.topology)),
                &BuildParams {
                    workers: self.workers,
                    chunk_capacity: self.chunk_capacity,
                    topology: Arc::clone(&self.topology),
                    // Distinct steal patterns per bucket.
                    seed: splitmix64(self.seed ^ u64::from(p)),
                    backscan_period: self.backscan_period,
                },
            ))
        }))
    }

    /// Probe buckets in priority order starting at `from`, claiming the
    /// first item found. Each probe holds the map lock only long enough
    /// to clone one bucket handle.
    fn scan_from(&self, w: usize, from: u32, m: &mut LoopMetricsLocal) -> Option<(u32, T, Bucket<T>)> {
        let mut next = from;
        loop {
            let entry = {
                let map = self.buckets.read().expect("priority map poisoned");
                map.range(next..)
                    .next()
                    .map(|(p, bucket)| (*p, Arc::clone(bucket)))
            };
            let (p, bucket) = entry?;
            if let Some(item) = bucket.pop(w, m) {
                return Some((p, item, bucket));
            }
            next = p.checked_add(1)?;
        }
    }
}

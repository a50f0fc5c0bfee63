//! Chunked FIFO/LIFO queues, global or per-socket.
//!
//! One implementation covers both placements:
//!
//! - **Global**: a single shared list of sealed chunks.
//! - **Per-socket**: one list per socket; pushes land on the pusher's
//!   home socket, pops drain the home socket before stealing from
//!   siblings. On single-socket machines this collapses to Global.
//!
//! # Pop order
//!
//! ```text
//! 1. private pop chunk          (no synchronization)
//! 2. home shared list           (one CAS-ish claim)
//! 3. own private push chunk     (partial work, still ours)
//! 4. sibling lists, round-robin from a randomized offset,
//!    with exponential backoff before giving up
//! ```
//!
//! Stage 3 before stage 4 matters for termination: a worker never
//! reports "empty" while it still owns unpublished items, so `pop`
//! returning `None` really means nothing is visible to this worker.
//!
//! Sealed chunks are published as soon as they fill (stage "publish on
//! full"), which is also the driver's cue to unpark a peer. Partial push
//! chunks are never stolen.

use std::sync::{Arc, Mutex};

use crossbeam_deque::{Injector, Steal};
use crossbeam_utils::{Backoff, CachePadded};

use crate::runtime::metrics::LoopMetricsLocal;
use crate::runtime::rng::XorShift64;
use crate::runtime::topology::Topology;

use super::chunk::Chunk;
use super::pool::ChunkPool;
use super::{BuildParams, PerWorkerSlots, PopOrder};

// ============================================================================
// Shared chunk lists
// ============================================================================

/// A shared list of sealed chunks; the only inter-thread handoff point.
///
/// The FIFO flavor is a lock-free MPMC queue; the LIFO flavor is a
/// mutex-guarded stack (transfers are chunk-granular and rare relative
/// to item operations, so the lock is off the hot path).
pub(crate) enum SharedChunks<T> {
    Fifo(Injector<Box<Chunk<T>>>),
    Lifo(Mutex<Vec<Box<Chunk<T>>>>),
}

impl<T> SharedChunks<T> {
    pub fn new(order: PopOrder) -> Self {
        match order {
            PopOrder::Fifo => SharedChunks::Fifo(Injector::new()),
            PopOrder::Lifo => SharedChunks::Lifo(Mutex::new(Vec::new())),
        }
    }

    pub fn push(&self, chunk: Box<Chunk<T>>) {
        match self {
            SharedChunks::Fifo(q) => q.push(chunk),
            SharedChunks::Lifo(s) => s.lock().expect("chunk stack poisoned").push(chunk),
        }
    }

    pub fn pop(&self) -> Option<Box<Chunk<T>>> {
        match self {
            SharedChunks::Fifo(q) => loop {
                match q.steal() {
                    Steal::Success(chunk) => return Some(chunk),
                    Steal::Empty => return None,
                    // Transient race with another claimant; resolves quickly.
                    Steal::Retry => std::hint::spin_loop(),
                }
            },
            SharedChunks::Lifo(s) => s.lock().expect("chunk stack poisoned").pop(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            SharedChunks::Fifo(q) => q.is_empty(),
            SharedChunks::Lifo(s) => s.lock().expect("chunk stack poisoned").is_empty(),
        }
    }
}

// ============================================================================
// ChunkedQueue
// ============================================================================

pub(crate) enum Placement {
    Global,
    PerSocket(Arc<Topology>),
}

struct WorkerSlot<T> {
    push: Option<Box<Chunk<T>>>,
    pop: Option<Box<Chunk<T>>>,
    rng: XorShift64,
}

pub(crate) struct ChunkedQueue<T> {
    order: PopOrder,
    lists: Box<[CachePadded<SharedChunks<T>>]>,
    /// Worker -> home list index. All zeros under Global placement.
    home: Box<[usize]>,
    slots: PerWorkerSlots<WorkerSlot<T>>,
    pool: ChunkPool<T>,
}

impl<T: Send> ChunkedQueue<T> {
    pub fn new(order: PopOrder, placement: Placement, params: &BuildParams) -> Self {
        let (lists, home): (usize, Box<[usize]>) = match &placement {
            Placement::Global => (1, vec![0; params.workers].into_boxed_slice()),
            Placement::PerSocket(topo) => (
                topo.sockets(),
                (0..params.workers)
                    .map(|w| topo.socket_of_worker(w))
                    .collect(),
            ),
        };

        let lists = (0..lists)
            .map(|_| CachePadded::new(SharedChunks::new(order)))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        // One steal-offset stream per worker, forked off the loop seed.
        let mut rng_master = XorShift64::new(params.seed);
        let slots = PerWorkerSlots::new(params.workers, |_| WorkerSlot {
            push: None,
            pop: None,
            rng: rng_master.fork(),
        });

        Self {
            order,
            lists,
            home,
            slots,
            pool: ChunkPool::new(params.workers, params.chunk_capacity),
        }
    }

    /// Append to worker `w`'s push chunk, sealing and publishing it when
    /// it fills. Returns `true` on publication.
    pub fn push(&self, w: usize, item: T, m: &mut LoopMetricsLocal) -> bool {
        self.slots.with(w, |slot| {
            let chunk = slot
                .push
                .get_or_insert_with(|| self.pool.acquire(w));
            if chunk.push(item).is_err() {
                // Publish-on-full keeps the slot non-full between pushes.
                unreachable!("push slot held a full chunk");
            }
            if chunk.is_full() {
                let sealed = slot.push.take().expect("chunk just filled");
                self.lists[self.home[w]].push(sealed);
                m.chunks_published += 1;
                true
            } else {
                false
            }
        })
    }

    pub fn pop(&self, w: usize, m: &mut LoopMetricsLocal) -> Option<T> {
        self.slots.with(w, |slot| {
            // 1. Private pop chunk.
            if let Some(item) = self.take_from_slot_pop(w, slot) {
                return Some(item);
            }

            // 2. Home shared list.
            let home = self.home[w];
            if let Some(chunk) = self.lists[home].pop() {
                m.chunks_claimed += 1;
                return self.install(w, slot, chunk);
            }

            // 3. Own push chunk: partial, but still ours to drain.
            if let Some(chunk) = slot.push.take() {
                return self.install(w, slot, chunk);
            }

            // 4. Steal a sealed chunk from a sibling list.
            if self.lists.len() > 1 {
                m.steal_attempts += 1;
                let n = self.lists.len();
                let backoff = Backoff::new();
                loop {
                    let start = slot.rng.next_usize(n);
                    for k in 0..n {
                        let idx = (start + k) % n;
                        if idx == home {
                            continue;
                        }
                        if let Some(chunk) = self.lists[idx].pop() {
                            m.steal_successes += 1;
                            m.chunks_claimed += 1;
                            return self.install(w, slot, chunk);
                        }
                    }
                    if backoff.is_completed() {
                        break;
                    }
                    backoff.snooze();
                }
            }

            None
        })
    }

    /// Publish worker `w`'s partial push chunk, if any. Used by phase-
    /// oriented wrappers (OBIM barrier mode) that need all items visible
    /// on the shared lists before a rendezvous.
    pub fn flush_local(&self, w: usize, m: &mut LoopMetricsLocal) -> bool {
        self.slots.with(w, |slot| match slot.push.take() {
            Some(chunk) if !chunk.is_empty() => {
                self.lists[self.home[w]].push(chunk);
                m.chunks_published += 1;
                true
            }
            Some(chunk) => {
                self.pool.release(w, chunk);
                false
            }
            None => false,
        })
    }

    /// Whether every shared list is empty. Per-worker slots are not
    /// inspected; callers that need full visibility flush first.
    pub fn shared_is_empty(&self) -> bool {
        self.lists.iter().all(|l| l.is_empty())
    }

    #[inline]
    fn take(order: PopOrder, chunk: &mut Chunk<T>) -> Option<T> {
        match order {
            PopOrder::Fifo => chunk.pop_front(),
            PopOrder::Lifo => chunk.pop_back(),
        }
    }

    fn take_from_slot_pop(&self, w: usize, slot: &mut WorkerSlot<T>) -> Option<T> {
        let chunk = slot.pop.as_mut()?;
        let item = Self::take(self.order, chunk);
        if chunk.is_empty() {
            let drained = slot.pop.take().expect("pop chunk present");
            self.pool.release(w, drained);
        }
        item
    }

    fn install(
        &self,
        w: usize,
        slot: &mut WorkerSlot<T>,
        mut chunk: Box<Chunk<T>>,
    ) -> Option<T> {
        let item = Self::take(self.order, &mut chunk);
        if chunk.is_empty() {
            self.pool.release(w, chunk);
        } else {
            slot.pop = Some(chunk);
        }
        item
    }
}

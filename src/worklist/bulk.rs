//! Bulk-synchronous worklist: strict round separation.
//!
//! Two shared chunk lists alternate roles. Pushes always seal into
//! `next`; pops only ever see `curr`. When a worker observes `curr`
//! empty it flushes its partial push chunk into `next` and arrives at
//! the phase barrier. The last arrival swaps the roles
//! (flush → barrier → swap; the roles are never swapped while any
//! worker can still push into the outgoing round).
//!
//! Consequence, relied on by level-synchronous algorithms: an item
//! pushed during round N is popped no earlier than round N+1, after
//! every round-N item has been popped.
//!
//! Unlike the chunked queues, `pop` deliberately does NOT drain the
//! worker's own push chunk: that chunk belongs to the next round.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use crate::runtime::barrier::PhaseBarrier;
use crate::runtime::metrics::LoopMetricsLocal;

use super::chunk::Chunk;
use super::chunked::SharedChunks;
use super::pool::ChunkPool;
use super::{BuildParams, PerWorkerSlots, PopOrder};

struct BulkSlot<T> {
    push: Option<Box<Chunk<T>>>,
    pop: Option<Box<Chunk<T>>>,
}

pub(crate) struct BulkQueue<T> {
    /// `lists[round & 1]` is `curr`, the other is `next`.
    lists: [CachePadded<SharedChunks<T>>; 2],
    /// Round counter; written only by the barrier leader, read by
    /// workers strictly between barriers.
    round: AtomicUsize,
    /// Set by the leader that swaps in an empty round.
    drained: AtomicBool,
    barrier: PhaseBarrier,
    slots: PerWorkerSlots<BulkSlot<T>>,
    pool: ChunkPool<T>,
}

impl<T: Send> BulkQueue<T> {
    pub fn new(params: &BuildParams) -> Self {
        Self {
            lists: [
                CachePadded::new(SharedChunks::new(PopOrder::Fifo)),
                CachePadded::new(SharedChunks::new(PopOrder::Fifo)),
            ],
            round: AtomicUsize::new(0),
            drained: AtomicBool::new(false),
            barrier: PhaseBarrier::new(params.workers),
            slots: PerWorkerSlots::new(params.workers, |_| BulkSlot {
                push: None,
                pop: None,
            }),
            pool: ChunkPool::new(params.workers, params.chunk_capacity),
        }
    }

    /// Push into the *next* round.
    pub fn push(&self, w: usize, item: T, m: &mut LoopMetricsLocal) -> bool {
        let next = (self.round.load(Ordering::Acquire) + 1) & 1;
        self.slots.with(w, |slot| {
            let chunk = slot.push.get_or_insert_with(|| self.pool.acquire(w));
            if chunk.push(item).is_err() {
                unreachable!("push slot held a full chunk");
            }
            if chunk.is_full() {
                let sealed = slot.push.take().expect("chunk just filled");
                self.lists[next].push(sealed);
                m.chunks_published += 1;
                true
            } else {
                false
            }
        })
    }

    /// Pop from the current round, advancing the phase when the round is
    /// globally drained. Blocks at the phase barrier while peers finish
    /// their round-N items.
    pub fn pop(&self, w: usize, m: &mut LoopMetricsLocal) -> Option<T> {
        loop {
            if self.drained.load(Ordering::Acquire) {
                return None;
            }
            let round = self.round.load(Ordering::Acquire);
            let curr = round & 1;

            // Private pop chunk first, then the current round's list.
            let popped = self.slots.with(w, |slot| {
                if let Some(chunk) = slot.pop.as_mut() {
                    let item = chunk.pop_front();
                    if chunk.is_empty() {
                        let drained = slot.pop.take().expect("pop chunk present");
                        self.pool.release(w, drained);
                    }
                    if item.is_some() {
                        return item;
                    }
                }
                if let Some(mut chunk) = self.lists[curr].pop() {
                    m.chunks_claimed += 1;
                    let item = chunk.pop_front();
                    if chunk.is_empty() {
                        self.pool.release(w, chunk);
                    } else {
                        slot.pop = Some(chunk);
                    }
                    return item;
                }
                None
            });
            if popped.is_some() {
                return popped;
            }

            // Round looks drained from here: publish our partial push
            // chunk into the next round and rendezvous.
            self.flush_push_chunk(w, m);
            self.barrier.arrive_with(|| {
                let next = (round + 1) & 1;
                if self.lists[next].is_empty() {
                    self.drained.store(true, Ordering::Release);
                }
                self.round.store(round + 1, Ordering::Release);
            });
            // Loop: re-read round/drained and pull from the new curr.
        }
    }

    pub fn retire_worker(&self, w: usize) {
        let mut m = LoopMetricsLocal::default();
        // A breaking worker's push chunk still belongs to the next
        // round; publish it so the remaining workers can finish it.
        self.flush_push_chunk(w, &mut m);
        self.barrier.leave();
    }

    fn flush_push_chunk(&self, w: usize, m: &mut LoopMetricsLocal) {
        let next = (self.round.load(Ordering::Acquire) + 1) & 1;
        self.slots.with(w, |slot| {
            if let Some(chunk) = slot.push.take() {
                if chunk.is_empty() {
                    self.pool.release(w, chunk);
                } else {
                    self.lists[next].push(chunk);
                    m.chunks_published += 1;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::topology::Topology;
    use std::sync::Arc;

    fn queue(workers: usize, cap: usize) -> BulkQueue<u32> {
        BulkQueue::new(&BuildParams {
            workers,
            chunk_capacity: cap,
            topology: Arc::new(Topology::single()),
            seed: 7,
            backscan_period: 32,
        })
    }

    #[test]
    fn single_worker_round_trip() {
        let q = queue(1, 4);
        let mut m = LoopMetricsLocal::default();
        for i in 0..3 {
            q.push(0, i, &mut m);
        }
        // Items went to round 1; the first pop advances the phase.
        let mut seen = Vec::new();
        while let Some(item) = q.pop(0, &mut m) {
            seen.push(item);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn items_pushed_mid_round_wait_for_next_round() {
        let q = queue(1, 64);
        let mut m = LoopMetricsLocal::default();
        q.push(0, 10, &mut m);
        q.push(0, 11, &mut m);

        // Advance into round 1.
        let first = q.pop(0, &mut m).unwrap();
        // Push during round 1: must not be popped before 10 and 11.
        q.push(0, 99, &mut m);
        let second = q.pop(0, &mut m).unwrap();
        let mut round1 = vec![first, second];
        round1.sort_unstable();
        assert_eq!(round1, vec![10, 11]);

        assert_eq!(q.pop(0, &mut m), Some(99));
        assert_eq!(q.pop(0, &mut m), None);
    }

    #[test]
    fn drains_when_next_round_is_empty() {
        let q = queue(1, 4);
        let mut m = LoopMetricsLocal::default();
        assert_eq!(q.pop(0, &mut m), None);
        // Subsequent pops stay drained and do not rendezvous again.
        assert_eq!(q.pop(0, &mut m), None);
    }

    #[test]
    fn retire_publishes_breaking_workers_push_chunk() {
        let q = queue(2, 64);
        let mut m = LoopMetricsLocal::default();
        q.push(0, 5, &mut m);
        // Worker 0 exits early; its partial chunk must become visible.
        q.retire_worker(0);

        let mut m1 = LoopMetricsLocal::default();
        assert_eq!(q.pop(1, &mut m1), Some(5));
        assert_eq!(q.pop(1, &mut m1), None);
    }
}

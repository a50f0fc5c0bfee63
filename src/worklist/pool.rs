//! Chunk recycling pool.
//!
//! Worklists churn through chunks at a high rate: every sealed chunk that
//! drains comes back here instead of hitting the allocator. The layout
//! follows the per-worker-local-plus-global-fallback shape:
//!
//! ```text
//! acquire(w):
//!   1. worker w's local freelist (uncontended fast path)
//!   2. shared overflow queue
//!   3. fresh allocation
//!
//! release(w, chunk):
//!   1. worker w's local freelist (bounded, may be full)
//!   2. shared overflow queue (bounded)
//!   3. drop (caps the pool's footprint)
//! ```
//!
//! # Invariants
//!
//! - Every chunk handed out by `acquire` is empty.
//! - The pool never holds more than
//!   `workers * local_cap + shared_cap` chunks; excess is freed.
//!
//! Per-worker freelists are `CachePadded` so adjacent workers' queue
//! indices never share a cache line.

use crossbeam_queue::ArrayQueue;
use crossbeam_utils::CachePadded;

use super::chunk::Chunk;

/// Chunks each worker keeps on its private freelist.
const LOCAL_FREELIST_CAP: usize = 8;

/// Chunks the shared overflow queue retains before dropping.
const SHARED_FREELIST_CAP: usize = 64;

pub(crate) struct ChunkPool<T> {
    chunk_capacity: usize,
    locals: Box<[CachePadded<ArrayQueue<Box<Chunk<T>>>>]>,
    shared: ArrayQueue<Box<Chunk<T>>>,
}

impl<T> ChunkPool<T> {
    /// # Panics
    ///
    /// Panics if `workers` is zero or `chunk_capacity` is zero.
    pub fn new(workers: usize, chunk_capacity: usize) -> Self {
        assert!(workers > 0, "ChunkPool: workers must be > 0");
        assert!(chunk_capacity > 0, "ChunkPool: chunk_capacity must be > 0");

        let locals = (0..workers)
            .map(|_| CachePadded::new(ArrayQueue::new(LOCAL_FREELIST_CAP)))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            chunk_capacity,
            locals,
            shared: ArrayQueue::new(SHARED_FREELIST_CAP),
        }
    }

    /// Hand out an empty chunk, recycling when possible.
    pub fn acquire(&self, worker: usize) -> Box<Chunk<T>> {
        if let Some(chunk) = self.locals[worker].pop() {
            debug_assert!(chunk.is_empty(), "pooled chunk was not drained");
            return chunk;
        }
        if let Some(chunk) = self.shared.pop() {
            debug_assert!(chunk.is_empty(), "pooled chunk was not drained");
            return chunk;
        }
        Box::new(Chunk::new(self.chunk_capacity))
    }

    /// Return a drained chunk. Overflow beyond the bounded freelists is
    /// dropped, which caps the pool's idle footprint.
    pub fn release(&self, worker: usize, mut chunk: Box<Chunk<T>>) {
        chunk.recycle();
        match self.locals[worker].push(chunk) {
            Ok(()) => {}
            Err(chunk) => {
                // Local freelist full; spill to the shared queue, or free.
                let _ = self.shared.push(chunk);
            }
        }
    }

    /// Number of chunks currently parked in the pool (local + shared).
    pub fn pooled(&self) -> usize {
        self.locals.iter().map(|q| q.len()).sum::<usize>() + self.shared.len()
    }
}

//! Worklist family: concurrent multi-producer/multi-consumer pools of
//! work items, built from chunks.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────┐
//!                 │                   Worklist                       │
//!                 │                                                  │
//!   push(w, t) ───┼──► worker w's push chunk ──(full)──► shared list │
//!                 │                                          │       │
//!                 │   worker w's pop chunk ◄──(claim/steal)──┘       │
//!   pop(w) ◄──────┼──────────┘                                       │
//!                 │                                                  │
//!                 │   ChunkPool: drained chunks recycle per-worker   │
//!                 └──────────────────────────────────────────────────┘
//! ```
//!
//! Items move in chunks (`chunk::Chunk`); a chunk is only ever owned by
//! one worker slot or one shared list at a time, so item storage itself
//! needs no synchronization. The variants differ in how sealed chunks
//! are placed and claimed:
//!
//! | Variant | Placement | Claim order |
//! |---------|-----------|-------------|
//! | chunked FIFO/LIFO | one global list | own slots → list |
//! | per-socket FIFO/LIFO | one list per socket | own slots → home socket → siblings |
//! | bulk-synchronous | `curr`/`next` lists | `curr` only, barrier-separated rounds |
//! | OBIM | one per-socket queue per priority | cursor bucket → upward scan → backscan |
//!
//! # Ordering guarantees
//!
//! FIFO/LIFO describe per-shared-list chunk order, not a global item
//! order. OBIM is approximately priority-ordered (see `obim`);
//! bulk-synchronous gives strict round separation (see `bulk`).

pub(crate) mod bulk;
pub(crate) mod chunk;
pub(crate) mod chunked;
pub(crate) mod obim;
pub(crate) mod pool;

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::Arc;

use crossbeam_utils::CachePadded;

use crate::runtime::metrics::LoopMetricsLocal;
use crate::runtime::topology::Topology;

use bulk::BulkQueue;
use chunked::{ChunkedQueue, Placement};
use obim::Obim;

// ============================================================================
// Public selection surface
// ============================================================================

/// Item pop order within a chunk and chunk claim order on a shared list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PopOrder {
    Fifo,
    Lifo,
}

/// Worklist selection, passed to `for_each` via
/// [`LoopOptions`](crate::runtime::config::LoopOptions).
///
/// The set of worklists is closed; the driver dispatches over a small
/// enum rather than a type parameter, which keeps the hot path at a
/// single branch per operation.
pub struct WorklistSpec<T> {
    pub(crate) kind: SpecKind<T>,
}

pub(crate) enum SpecKind<T> {
    Chunked { order: PopOrder, per_socket: bool },
    BulkSynchronous,
    Obim {
        indexer: Arc<dyn Fn(&T) -> u32 + Send + Sync>,
        barrier: bool,
    },
}

impl<T> WorklistSpec<T> {
    /// One global list of sealed chunks, FIFO chunk claim, FIFO item pop.
    pub fn chunked_fifo() -> Self {
        Self {
            kind: SpecKind::Chunked {
                order: PopOrder::Fifo,
                per_socket: false,
            },
        }
    }

    /// One global list, LIFO everywhere: best cache locality for
    /// recently pushed work, no ordering pretense.
    pub fn chunked_lifo() -> Self {
        Self {
            kind: SpecKind::Chunked {
                order: PopOrder::Lifo,
                per_socket: false,
            },
        }
    }

    /// One sealed-chunk list per socket; pops prefer the home socket and
    /// only then steal from siblings. Collapses to [`chunked_fifo`] on
    /// single-socket machines.
    ///
    /// [`chunked_fifo`]: Self::chunked_fifo
    pub fn per_socket_chunked_fifo() -> Self {
        Self {
            kind: SpecKind::Chunked {
                order: PopOrder::Fifo,
                per_socket: true,
            },
        }
    }

    /// Per-socket placement with LIFO pops.
    pub fn per_socket_chunked_lifo() -> Self {
        Self {
            kind: SpecKind::Chunked {
                order: PopOrder::Lifo,
                per_socket: true,
            },
        }
    }

    /// Two alternating lists with a barrier between rounds: items pushed
    /// in round N are popped only in round N+1.
    pub fn bulk_synchronous() -> Self {
        Self {
            kind: SpecKind::BulkSynchronous,
        }
    }

    /// Ordered-by-integer-metric: `indexer` maps each item to a
    /// nonnegative priority; lower priorities are processed
    /// (approximately) first. The indexer must be pure and must not
    /// return `u32::MAX`, which is reserved as a sentinel.
    pub fn obim(indexer: impl Fn(&T) -> u32 + Send + Sync + 'static) -> Self {
        Self {
            kind: SpecKind::Obim {
                indexer: Arc::new(indexer),
                barrier: false,
            },
        }
    }

    /// OBIM modifier: drain one global priority per phase, with a
    /// barrier before advancing. Trades synchronization for less wasted
    /// work on superseded items.
    ///
    /// # Panics
    ///
    /// Panics if `self` is not an OBIM spec.
    pub fn with_barrier(mut self) -> Self {
        match &mut self.kind {
            SpecKind::Obim { barrier, .. } => *barrier = true,
            _ => panic!("with_barrier only applies to OBIM worklists"),
        }
        self
    }
}

impl<T> Clone for WorklistSpec<T> {
    fn clone(&self) -> Self {
        let kind = match &self.kind {
            SpecKind::Chunked { order, per_socket } => SpecKind::Chunked {
                order: *order,
                per_socket: *per_socket,
            },
            SpecKind::BulkSynchronous => SpecKind::BulkSynchronous,
            SpecKind::Obim { indexer, barrier } => SpecKind::Obim {
                indexer: Arc::clone(indexer),
                barrier: *barrier,
            },
        };
        Self { kind }
    }
}

impl<T> fmt::Debug for WorklistSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SpecKind::Chunked { order, per_socket } => f
                .debug_struct("Chunked")
                .field("order", order)
                .field("per_socket", per_socket)
                .finish(),
            SpecKind::BulkSynchronous => f.write_str("BulkSynchronous"),
            SpecKind::Obim { barrier, .. } => {
                f.debug_struct("Obim").field("barrier", barrier).finish()
            }
        }
    }
}

// ============================================================================
// Per-worker slots
// ============================================================================

/// Per-worker mutable state stored inside a shared worklist, indexed by
/// the worker handle (there is no thread-local state in the worklist
/// contract; the handle is passed into every operation).
///
/// # Safety contract
///
/// While a loop is running, slot `w` is touched only by worker `w`; the
/// driver upholds this by construction (each worker thread is handed a
/// distinct `w`). Quiescent access for teardown or tests goes through
/// `&mut self`.
pub(crate) struct PerWorkerSlots<S> {
    slots: Box<[CachePadded<UnsafeCell<S>>]>,
}

// SAFETY: each UnsafeCell is only dereferenced by its owning worker (see
// the safety contract above), so cross-thread access never aliases.
unsafe impl<S: Send> Sync for PerWorkerSlots<S> {}

impl<S> PerWorkerSlots<S> {
    pub fn new(workers: usize, mut init: impl FnMut(usize) -> S) -> Self {
        let slots = (0..workers)
            .map(|w| CachePadded::new(UnsafeCell::new(init(w))))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { slots }
    }

    /// Run `f` with exclusive access to worker `w`'s slot.
    ///
    /// Calls must not nest for the same slot; the worklists keep their
    /// `with` regions non-reentrant.
    #[inline]
    pub fn with<R>(&self, w: usize, f: impl FnOnce(&mut S) -> R) -> R {
        // SAFETY: only worker w reaches this slot while the loop runs,
        // and the closure discipline keeps the &mut region scoped.
        unsafe { f(&mut *self.slots[w].get()) }
    }
}

// ============================================================================
// Built worklists
// ============================================================================

/// Everything a worklist needs to size itself for one loop invocation.
pub(crate) struct BuildParams {
    pub workers: usize,
    pub chunk_capacity: usize,
    pub topology: Arc<Topology>,
    pub seed: u64,
    pub backscan_period: u32,
}

/// A constructed worklist, dispatched over by the driver.
pub(crate) enum Worklist<T> {
    Chunked(ChunkedQueue<T>),
    Bulk(BulkQueue<T>),
    Obim(Obim<T>),
}

impl<T: Send> Worklist<T> {
    pub fn build(spec: WorklistSpec<T>, params: &BuildParams) -> Self {
        match spec.kind {
            SpecKind::Chunked { order, per_socket } => {
                let placement = if per_socket {
                    Placement::PerSocket(Arc::clone(&params.topology))
                } else {
                    Placement::Global
                };
                Worklist::Chunked(ChunkedQueue::new(order, placement, params))
            }
            SpecKind::BulkSynchronous => Worklist::Bulk(BulkQueue::new(params)),
            SpecKind::Obim { indexer, barrier } => {
                Worklist::Obim(Obim::new(indexer, barrier, params))
            }
        }
    }

    /// Push an item on behalf of worker `w`. Returns `true` when the
    /// push published a sealed chunk (the caller's cue to wake a peer).
    #[inline]
    pub fn push(&self, w: usize, item: T, m: &mut LoopMetricsLocal) -> bool {
        match self {
            Worklist::Chunked(q) => q.push(w, item, m),
            Worklist::Bulk(q) => q.push(w, item, m),
            Worklist::Obim(q) => q.push(w, item, m),
        }
    }

    /// Pop an item on behalf of worker `w`. `None` means no work is
    /// visible to this worker anywhere in the list (its own slots
    /// included), which the termination protocol relies on.
    #[inline]
    pub fn pop(&self, w: usize, m: &mut LoopMetricsLocal) -> Option<T> {
        match self {
            Worklist::Chunked(q) => q.pop(w, m),
            Worklist::Bulk(q) => q.pop(w, m),
            Worklist::Obim(q) => q.pop(w, m),
        }
    }

    /// Permanently withdraw worker `w` from any phase rendezvous. Called
    /// exactly once per worker on exit so barrier-based variants cannot
    /// deadlock on a departed peer.
    pub fn retire_worker(&self, w: usize) {
        match self {
            Worklist::Chunked(_) => {}
            Worklist::Bulk(q) => q.retire_worker(w),
            Worklist::Obim(q) => q.retire_worker(w),
        }
    }
}

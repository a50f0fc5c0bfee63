//! Shared-memory work-stealing runtime for irregular graph algorithms.
//!
//! The core primitive is a parallel for-each whose work items may
//! generate new work: an operator pops an item, mutates shared state
//! (typically with lock-free updates such as atomic-min on node data),
//! and pushes follow-up items through a [`UserContext`]. Scheduling is
//! delegated to a pluggable *worklist*:
//!
//! - [`WorklistSpec::chunked_fifo`] / [`WorklistSpec::chunked_lifo`] —
//!   one shared pool of sealed chunks;
//! - [`WorklistSpec::per_socket_chunked_fifo`] /
//!   [`WorklistSpec::per_socket_chunked_lifo`] — socket-local pools
//!   with locality-preferring stealing;
//! - [`WorklistSpec::bulk_synchronous`] — strict round separation for
//!   level-synchronous algorithms;
//! - [`WorklistSpec::obim`] — ordered-by-integer-metric priority
//!   buckets for Δ-stepping-style algorithms, with an optional
//!   [`with_barrier`](WorklistSpec::with_barrier) phase mode.
//!
//! Work moves between threads in fixed-capacity chunks; each worker
//! owns a private filling chunk and a private draining chunk, and only
//! sealed chunks ever cross threads. OBIM provides *approximate*
//! priority order by design — scalability comes from per-worker
//! cursors, not a global heap.
//!
//! # Example: Δ-stepping SSSP skeleton
//!
//! ```no_run
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use worklist_rs::{LoopOptions, Runtime, WorklistSpec};
//!
//! // (node, tentative distance) update requests
//! #[derive(Clone, Copy)]
//! struct Req { node: usize, dist: u32 }
//!
//! let adj: Vec<Vec<(usize, u32)>> = /* graph */ vec![];
//! let dist: Vec<AtomicU32> = (0..adj.len()).map(|_| AtomicU32::new(u32::MAX)).collect();
//!
//! let rt = Runtime::default();
//! dist[0].store(0, Ordering::Relaxed);
//! rt.for_each(
//!     [Req { node: 0, dist: 0 }],
//!     |req, ctx| {
//!         if dist[req.node].load(Ordering::Relaxed) < req.dist {
//!             return; // superseded: empty work
//!         }
//!         for &(next, weight) in &adj[req.node] {
//!             let nd = req.dist + weight;
//!             if dist[next].fetch_min(nd, Ordering::Relaxed) > nd {
//!                 ctx.push(Req { node: next, dist: nd });
//!             }
//!         }
//!     },
//!     LoopOptions::new(WorklistSpec::obim(|r: &Req| r.dist >> 3)).loopname("sssp"),
//! );
//! ```
//!
//! # What this crate is not
//!
//! No distributed execution, no persistence, no fairness or determinism
//! guarantees, and no strict global priority order. Graph storage,
//! loaders, and per-node locking are the caller's business; the runtime
//! interoperates with an external conflict manager through
//! [`ConflictGuard`] but ships none.

pub mod bag;
pub mod runtime;
pub mod worklist;

pub use bag::InsertBag;
pub use runtime::config::{ConflictGuard, DoAllOptions, LoopOptions, RuntimeConfig};
pub use runtime::context::UserContext;
pub use runtime::executor::Runtime;
pub use runtime::metrics::{LoopMetricsLocal, LoopReport};
pub use runtime::topology::Topology;
pub use worklist::WorklistSpec;

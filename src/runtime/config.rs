//! Runtime and per-loop configuration.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::worklist::chunk::DEFAULT_CHUNK_CAPACITY;
use crate::worklist::WorklistSpec;

use super::topology::allowed_cpu_count;

/// Runtime-wide knobs. Defaults are conservative; profile before tuning.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker threads per loop invocation. Defaults to the allowed CPU
    /// count (affinity-mask aware).
    pub threads: usize,

    /// Items per chunk unless a loop overrides it. Larger chunks
    /// amortize transfer cost; smaller chunks spread work sooner.
    pub chunk_capacity: usize,

    /// Seed for the deterministic steal-pattern RNG. Same seed, same
    /// victim sequence (modulo timing).
    pub seed: u64,

    /// Spin iterations before an idle worker starts yielding/parking.
    pub spin_iters: u32,

    /// Park timeout for idle workers. An upper bound on wakeup
    /// staleness, so a missed unpark can only delay, never deadlock.
    pub park_timeout: Duration,

    /// OBIM: refills between backward scans for newly populated lower
    /// buckets. Larger values scan less but pick up late low-priority
    /// pushes later; the terminal backscan before reporting empty
    /// bounds the worst case. Must be nonzero.
    pub backscan_period: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            threads: allowed_cpu_count(),
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            seed: 0x853c49e6748fea9b,
            spin_iters: 200,
            park_timeout: Duration::from_micros(200),
            backscan_period: 32,
        }
    }
}

impl RuntimeConfig {
    /// # Panics
    ///
    /// Panics on invalid values; configuration errors are programming
    /// errors, caught at the construction site.
    pub fn validate(&self) {
        assert!(self.threads > 0, "threads must be > 0");
        assert!(self.chunk_capacity > 0, "chunk_capacity must be > 0");
        assert!(self.spin_iters > 0, "spin_iters must be > 0");
        assert!(
            self.park_timeout > Duration::ZERO,
            "park_timeout must be > 0"
        );
        assert!(self.backscan_period > 0, "backscan_period must be > 0");
    }
}

// ============================================================================
// Conflict guard (external lock manager interop)
// ============================================================================

/// Interop seam for an external conflict manager.
///
/// The runtime itself ships no item locks (operators on shared graph
/// data are expected to use lock-free updates such as atomic-min). An
/// installed guard is consulted before each operator invocation; a
/// refusal re-enqueues the item through the retry path, exactly like
/// `UserContext::abort`.
pub trait ConflictGuard<T>: Send + Sync {
    /// Try to acquire whatever the item needs. `false` defers the item.
    fn try_enter(&self, item: &T) -> bool;

    /// Release after the operator ran (called on success and abort
    /// alike).
    fn exit(&self, _item: &T) {}
}

// ============================================================================
// Per-loop options
// ============================================================================

/// Options for one `for_each` invocation.
pub struct LoopOptions<T> {
    /// Worklist policy. Default: per-socket chunked FIFO.
    pub worklist: WorklistSpec<T>,
    /// Override the runtime's chunk capacity for this loop.
    pub chunk_capacity: Option<usize>,
    /// Tag carried into the `LoopReport`.
    pub loopname: Option<String>,
    /// Optional external conflict manager; `None` means the operator
    /// promises race-freedom (the default, "no conflicts" mode).
    pub conflict_guard: Option<Arc<dyn ConflictGuard<T>>>,
}

impl<T> Default for LoopOptions<T> {
    fn default() -> Self {
        Self {
            worklist: WorklistSpec::per_socket_chunked_fifo(),
            chunk_capacity: None,
            loopname: None,
            conflict_guard: None,
        }
    }
}

impl<T> LoopOptions<T> {
    pub fn new(worklist: WorklistSpec<T>) -> Self {
        Self {
            worklist,
            ..Self::default()
        }
    }

    pub fn chunk_capacity(mut self, capacity: usize) -> Self {
        self.chunk_capacity = Some(capacity);
        self
    }

    pub fn loopname(mut self, name: impl Into<String>) -> Self {
        self.loopname = Some(name.into());
        self
    }

    pub fn conflict_guard(mut self, guard: Arc<dyn ConflictGuard<T>>) -> Self {
        self.conflict_guard = Some(guard);
        self
    }
}

/// Options for one `do_all` invocation.
#[derive(Clone, Debug, Default)]
pub struct DoAllOptions {
    /// Dynamic block claiming instead of a static contiguous partition.
    /// Worth it when per-item cost is uneven.
    pub steal: bool,
    /// Items per claimed block under `steal`. `None` picks a grain from
    /// the input size.
    pub block: Option<usize>,
    /// Tag carried into the `LoopReport`.
    pub loopname: Option<String>,
}

impl DoAllOptions {
    pub fn steal() -> Self {
        Self {
            steal: true,
            ..Self::default()
        }
    }

    pub fn loopname(mut self, name: impl Into<String>) -> Self {
        self.loopname = Some(name.into());
        self
    }
}

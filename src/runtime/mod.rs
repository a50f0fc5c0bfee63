//! Loop drivers and their support machinery.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`executor`] | `for_each` driver: worker pool, termination, break/abort |
//! | `do_all` | Non-speculative parallel-for and `on_each` |
//! | [`context`] | Operator-scoped [`context::UserContext`] |
//! | [`config`] | [`config::RuntimeConfig`], per-loop options, conflict-guard seam |
//! | `barrier` | Phase barrier for bulk-synchronous rounds and barriered OBIM |
//! | [`metrics`] | Per-worker counters, merged into a [`metrics::LoopReport`] |
//! | [`topology`] | Socket layout and allowed-CPU queries |
//! | `rng` | Deterministic RNG for steal patterns |
//! | `worker_id` | Thread-local worker identity for lane routing |

pub(crate) mod barrier;
pub mod config;
pub mod context;
pub(crate) mod do_all;
pub mod executor;
pub mod metrics;
pub(crate) mod rng;
pub mod topology;
pub(crate) mod worker_id;

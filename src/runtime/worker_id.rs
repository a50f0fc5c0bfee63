//! Thread-local worker identity.
//!
//! Worklists take the worker handle explicitly on every call; nothing in
//! their contract needs thread-local state. The TLS id exists for the
//! one place where no handle is available: [`crate::bag::InsertBag`]
//! routes pushes to a lane, and a push may come from a worker thread
//! (use its id for an uncontended lane) or from any other thread (fall
//! back to a per-thread sequence number).
//!
//! # Invariant
//!
//! `current_worker_id()` is `Some(w)` only on a live loop's worker
//! thread `w`; workers clear it before exit so a recycled OS thread
//! can never mis-route.

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Sentinel: not a worker thread. Worker ids are small and sequential,
/// so the all-ones value can never collide.
const NO_WORKER: usize = usize::MAX;

thread_local! {
    static WORKER_ID: Cell<usize> = const { Cell::new(NO_WORKER) };
    /// Lazily assigned per-thread sequence number for lane routing on
    /// non-worker threads.
    static THREAD_SEQ: Cell<usize> = const { Cell::new(NO_WORKER) };
}

/// Monotone source for [`THREAD_SEQ`] assignments.
static NEXT_THREAD_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Install (or clear, with `None`) this thread's worker id. Called by
/// the loop drivers at worker startup and exit.
#[inline]
pub(crate) fn set_current_worker_id(id: Option<usize>) {
    WORKER_ID.with(|c| c.set(id.unwrap_or(NO_WORKER)));
}

/// The current thread's worker id, if it is a live loop worker.
#[inline]
pub(crate) fn current_worker_id() -> Option<usize> {
    WORKER_ID.with(|c| {
        let v = c.get();
        if v == NO_WORKER {
            None
        } else {
            Some(v)
        }
    })
}

/// A stable small integer for lane routing: the worker id on worker
/// threads, otherwise a per-thread sequence number assigned on first
/// use.
#[inline]
pub(crate) fn lane_hint() -> usize {
    if let Some(w) = current_worker_id() {
        return w;
    }
    THREAD_SEQ.with(|c| {
        let v = c.get();
        if v != NO_WORKER {
            return v;
        }
        let assigned = NEXT_THREAD_SEQ.fetch_add(1, Ordering::Relaxed);
        c.set(assigned);
        assigned
    })
}

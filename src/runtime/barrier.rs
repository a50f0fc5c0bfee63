//! Phase barrier with a dynamic participant count.
//!
//! Bulk-synchronous rounds and barriered OBIM phases rendezvous here.
//! Unlike `std::sync::Barrier`, a participant may permanently withdraw
//! via [`PhaseBarrier::leave`] — required so a worker exiting early
//! (cooperative break, operator panic) cannot strand peers mid-phase.
//!
//! # Release-time work
//!
//! [`PhaseBarrier::arrive_with`] runs a closure on the releasing thread
//! *before* any waiter resumes, while the barrier lock is held. Phase
//! transitions (swap `curr`/`next`, pick the next priority) go there, so
//! a released waiter always observes the post-transition state.
//!
//! A release triggered by `leave` does not run a closure: leaving only
//! happens on the teardown paths, where released waiters re-check the
//! loop's exit flags instead of continuing the phase.
//!
//! # Implementation
//!
//! Mutex + condvar with a generation counter. Rendezvous is once per
//! phase, never per item, so lock cost is irrelevant; what matters is
//! that the shrink/release races are handled in one obviously-serialized
//! place.

#[cfg(not(loom))]
use std::sync::{Condvar, Mutex};

#[cfg(loom)]
use loom::sync::{Condvar, Mutex};

struct State {
    participants: usize,
    arrived: usize,
    generation: u64,
}

pub(crate) struct PhaseBarrier {
    state: Mutex<State>,
    cv: Condvar,
}

impl PhaseBarrier {
    /// # Panics
    ///
    /// Panics if `participants` is zero.
    pub fn new(participants: usize) -> Self {
        assert!(participants > 0, "PhaseBarrier: participants must be > 0");
        Self {
            state: Mutex::new(State {
                participants,
                arrived: 0,
                generation: 0,
            }),
            cv: Condvar::new(),
        }
    }

    /// Arrive at the barrier and block until every remaining participant
    /// has arrived. The last arrival runs `on_release` and returns
    /// `true`; everyone else returns `false` after release.
    pub fn arrive_with(&self, on_release: impl FnOnce()) -> bool {
        let mut s = self.state.lock().expect("barrier lock poisoned");
        s.arrived += 1;
        if s.arrived >= s.participants {
            on_release();
            s.arrived = 0;
            s.generation = s.generation.wrapping_add(1);
            self.cv.notify_all();
            return true;
        }
        let gen = s.generation;
        while s.generation == gen {
            s = self.cv.wait(s).expect("barrier lock poisoned");
        }
        false
    }

    /// Arrive with no release-time work.
    #[cfg(test)]
    pub fn arrive(&self) -> bool {
        self.arrive_with(|| {})
    }

    /// Permanently withdraw from the rendezvous. If the withdrawal
    /// completes the current phase, waiters are released (with no
    /// release closure; see module docs).
    pub fn leave(&self) {
        let mut s = self.state.lock().expect("barrier lock poisoned");
        assert!(s.participants > 0, "PhaseBarrier: leave without participants");
        s.participants -= 1;
        if s.participants > 0 && s.arrived >= s.participants {
            s.arrived = 0;
            s.generation = s.generation.wrapping_add(1);
            self.cv.notify_all();
        }
    }
}

//! `InsertBag`: unordered, append-only, concurrently-pushable storage.
//!
//! The seed container and scratch accumulator for parallel loops: any
//! thread may `push` at any time; iteration and clearing require
//! `&mut self`, which encodes the "only when quiescent" contract in the
//! type system instead of in documentation.
//!
//! # Layout
//!
//! Items live in chunk chains spread over power-of-two *lanes*. A push
//! locks one lane, selected by the pushing thread's worker id (so each
//! loop worker has an uncontended home lane) or by a per-thread
//! sequence number off the worker pool. Lane mutexes are therefore
//! almost always uncontended; `CachePadded` keeps the lane headers off
//! each other's cache lines.
//!
//! Iteration order is unspecified.

use std::sync::Mutex;

use crossbeam_utils::CachePadded;

use crate::runtime::executor::Runtime;
use crate::runtime::topology::allowed_cpu_count;
use crate::runtime::worker_id;
use crate::worklist::chunk::{Chunk, DEFAULT_CHUNK_CAPACITY};

struct Lane<T> {
    sealed: Vec<Box<Chunk<T>>>,
    open: Option<Box<Chunk<T>>>,
}

impl<T> Lane<T> {
    fn len(&self) -> usize {
        self.sealed.iter().map(|c| c.len()).sum::<usize>()
            + self.open.as_ref().map_or(0, |c| c.len())
    }

    fn take_chunks(&mut self) -> Vec<Box<Chunk<T>>> {
        let mut chunks = std::mem::take(&mut self.sealed);
        if let Some(open) = self.open.take() {
            chunks.push(open);
        }
        chunks
    }
}

pub struct InsertBag<T> {
    lanes: Box<[CachePadded<Mutex<Lane<T>>>]>,
    /// `lanes.len() - 1`; lane count is a power of two.
    mask: usize,
    chunk_capacity: usize,
}

impl<T> Default for InsertBag<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InsertBag<T> {
    /// A bag sized for this machine: one lane per allowed CPU, rounded
    /// up to a power of two.
    pub fn new() -> Self {
        Self::with_lanes(allowed_cpu_count(), DEFAULT_CHUNK_CAPACITY)
    }

    /// # Panics
    ///
    /// Panics if either argument is zero.
    pub fn with_lanes(lanes: usize, chunk_capacity: usize) -> Self {
        assert!(lanes > 0, "InsertBag: lanes must be > 0");
        assert!(chunk_capacity > 0, "InsertBag: chunk_capacity must be > 0");
        let lanes = lanes.next_power_of_two();
        let lanes = (0..lanes)
            .map(|_| {
                CachePadded::new(Mutex::new(Lane {
                    sealed: Vec::new(),
                    open: None,
                }))
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let mask = lanes.len() - 1;
        Self {
            lanes,
            mask,
            chunk_capacity,
        }
    }

    /// Append an item. Callable from any thread at any time.
    pub fn push(&self, item: T) {
        let lane = &self.lanes[worker_id::lane_hint() & self.mask];
        let mut lane = lane.lock().expect("bag lane poisoned");
        let open = lane
            .open
            .get_or_insert_with(|| Box::new(Chunk::new(self.chunk_capacity)));
        if let Err(item) = open.push(item) {
            let full = lane
                .open
                .replace(Box::new(Chunk::new(self.chunk_capacity)))
                .expect("open chunk present");
            lane.sealed.push(full);
            lane.open
                .as_mut()
                .expect("fresh chunk installed")
                .push(item)
                .unwrap_or_else(|_| unreachable!("fresh chunk rejected a push"));
        }
    }

    /// Item count. Exact when quiescent; a racing snapshot otherwise.
    pub fn len(&self) -> usize {
        self.lanes
            .iter()
            .map(|l| l.lock().expect("bag lane poisoned").len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes
            .iter()
            .all(|l| l.lock().expect("bag lane poisoned").len() == 0)
    }

    /// Iterate all items. `&mut self`: callable only when no concurrent
    /// pushers exist, so no locks are taken.
    pub fn iter(&mut self) -> impl Iterator<Item = &T> {
        self.lanes.iter_mut().flat_map(|l| {
            let lane = l.get_mut().expect("bag lane poisoned");
            lane.sealed
                .iter()
                .chain(lane.open.iter())
                .flat_map(|c| c.iter())
        })
    }

    /// Move the items out lane by lane as the iterator advances; a
    /// fully consumed iterator leaves the bag empty. The usual bridge
    /// from a filled bag to `for_each` seeds.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.lanes.iter_mut().flat_map(|l| {
            let lane = l.get_mut().expect("bag lane poisoned");
            lane.take_chunks()
                .into_iter()
                .flat_map(|c| c.into_items().into_iter())
        })
    }

    /// Drop everything, serially.
    pub fn clear(&mut self) {
        for lane in self.lanes.iter_mut() {
            let lane = lane.get_mut().expect("bag lane poisoned");
            lane.sealed.clear();
            lane.open = None;
        }
    }

    /// Drop everything, spreading chain destruction across the runtime's
    /// workers. Worthwhile for bags holding many chunks of non-trivial
    /// items; otherwise use [`clear`](Self::clear).
    pub fn clear_parallel(&mut self, rt: &Runtime)
    where
        T: Send,
    {
        let chains: Vec<Mutex<Vec<Box<Chunk<T>>>>> = self
            .lanes
            .iter_mut()
            .map(|l| Mutex::new(l.get_mut().expect("bag lane poisoned").take_chunks()))
            .collect();
        rt.do_all(
            &chains,
            |chain| {
                chain.lock().expect("clear chain poisoned").clear();
            },
            crate::runtime::config::DoAllOptions::steal(),
        );
    }
}

impl<T> Extend<T> for InsertBag<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}

impl<T> FromIterator<T> for InsertBag<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut bag = Self::new();
        bag.extend(iter);
        bag
    }
}

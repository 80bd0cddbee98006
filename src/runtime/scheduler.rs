//! Ready queue and waker plumbing for the deterministic scheduler.
//!
//! The ready queue is the single scheduling structure: fibers are enqueued
//! when spawned, woken, or cancelled, and the runtime picks the next fiber
//! with a seeded RNG so every interleaving is a pure function of the seed.

use crate::runtime::fiber::FiberRecord;
use crate::types::FiberId;
use crate::util::DetRng;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, Weak};
use std::task::Wake;

/// State shared between the runtime, fiber handles, and wakers.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    /// Live fibers by identity.
    pub(crate) fibers: HashMap<FiberId, FiberRecord>,
    /// Fibers eligible for their next step.
    pub(crate) ready: ReadyQueue,
}

impl Shared {
    /// Returns the identities of live fibers forked from `parent`.
    pub(crate) fn children_of(&self, parent: FiberId) -> Vec<FiberId> {
        let mut children: Vec<FiberId> = self
            .fibers
            .values()
            .filter(|record| record.cx.parent_id() == Some(parent))
            .map(|record| record.cx.fiber_id())
            .collect();
        // Deterministic order regardless of map iteration.
        children.sort_unstable();
        children
    }
}

/// A deduplicating FIFO of runnable fibers with seeded picking.
#[derive(Debug, Default)]
pub(crate) struct ReadyQueue {
    queue: VecDeque<FiberId>,
}

impl ReadyQueue {
    /// Enqueues a fiber unless it is already queued.
    pub(crate) fn schedule(&mut self, id: FiberId) {
        if !self.queue.contains(&id) {
            self.queue.push_back(id);
        }
    }

    /// Removes and returns one ready fiber, chosen by the seeded RNG.
    ///
    /// Picking from anywhere in the queue (rather than strictly the front)
    /// is what lets different seeds explore different interleavings while
    /// one seed always replays the same one.
    pub(crate) fn pick(&mut self, rng: &mut DetRng) -> Option<FiberId> {
        if self.queue.is_empty() {
            return None;
        }
        let index = rng.next_usize(self.queue.len());
        self.queue.remove(index)
    }

    /// Returns true if no fiber is queued.
    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Waker that reschedules its fiber on wake.
pub(crate) struct FiberWaker {
    pub(crate) fiber: FiberId,
    pub(crate) shared: Weak<Mutex<Shared>>,
}

impl Wake for FiberWaker {
    fn wake(self: std::sync::Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &std::sync::Arc<Self>) {
        if let Some(shared) = self.shared.upgrade() {
            let mut guard = shared.lock().expect("lock poisoned");
            if guard.fibers.contains_key(&self.fiber) {
                guard.ready.schedule(self.fiber);
            }
        }
    }
}

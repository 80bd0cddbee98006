//! The deterministic cooperative runtime.
//!
//! This is the scheduler-facing glue the local-state mechanism needs: it
//! threads each fiber's ambient store linearly through that fiber's steps,
//! snapshots the store at fork instants, and guarantees that a cancelled
//! fiber's scope-restore finalizers run before its `Cancelled` outcome is
//! published.
//!
//! Execution is single-threaded and seed-deterministic: the ready fiber for
//! each step is picked with a seeded RNG, so one seed always replays one
//! interleaving. That makes isolation properties testable across many
//! interleavings by sweeping seeds.

use crate::cx::Cx;
use crate::error::{Error, ErrorKind, Result};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::fiber::{spawn_into, FiberHandle, FiberRecord};
use crate::runtime::scheduler::{FiberWaker, Shared};
use crate::tracing_compat::{debug, trace};
use crate::types::{CancelReason, FiberId, PanicPayload};
use crate::util::DetRng;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

/// A deterministic, single-threaded fiber runtime.
///
/// Fibers are cooperative futures. Each carries exactly one ambient
/// [`LocalStore`](crate::LocalStore) through its [`Cx`]; forking duplicates
/// the store by value at the fork instant and the copies never interact
/// again.
#[derive(Debug)]
pub struct Runtime {
    shared: Arc<Mutex<Shared>>,
    config: RuntimeConfig,
    rng: DetRng,
    steps: u64,
}

impl Runtime {
    /// Creates a runtime with the given configuration.
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        let rng = DetRng::new(config.seed);
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            config,
            rng,
            steps: 0,
        }
    }

    /// Creates a runtime with the default configuration and the given seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::new(RuntimeConfig::new(seed))
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Returns the number of steps executed so far.
    #[must_use]
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    /// Returns the number of live fibers.
    #[must_use]
    pub fn live_fiber_count(&self) -> usize {
        self.shared.lock().expect("lock poisoned").fibers.len()
    }

    /// Returns true if no fiber is ready to run.
    ///
    /// Live fibers may remain: a fiber blocked on a join is live but not
    /// ready until its child resolves.
    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        self.shared.lock().expect("lock poisoned").ready.is_empty()
    }

    /// Spawns a root fiber with an empty ambient store.
    ///
    /// The factory receives the fiber's [`Cx`].
    pub fn spawn<F, Fut, T>(&mut self, f: F) -> FiberHandle<T>
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        spawn_into(&self.shared, None, f)
    }

    /// Runs fibers until no fiber is ready or the step bound is reached.
    ///
    /// Returns the number of steps executed by this call.
    pub fn run_until_quiescent(&mut self) -> u64 {
        let start = self.steps;
        while !self.is_quiescent() {
            if let Some(max) = self.config.max_steps {
                if self.steps >= max {
                    debug!(steps = self.steps, "step bound reached");
                    break;
                }
            }
            self.step();
        }
        self.steps - start
    }

    /// Spawns a root fiber, drives the runtime to quiescence, and returns
    /// the fiber's result.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Cancelled`] or [`ErrorKind::FiberPanicked`] if
    /// the fiber did not complete normally, and [`ErrorKind::Stalled`] if
    /// the runtime stopped making progress before the fiber resolved.
    pub fn run<F, Fut, T>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = self.spawn(f);
        self.run_until_quiescent();
        match handle.try_take_outcome() {
            Some(outcome) => outcome.into_result(),
            None => Err(Error::new(ErrorKind::Stalled)
                .with_detail(format!("after {} steps", self.steps))),
        }
    }

    /// Cancels every live fiber with a shutdown reason and drains them.
    ///
    /// Scope-restore finalizers of the cancelled fibers run before their
    /// outcomes resolve, exactly as for individual cancellation.
    pub fn shutdown(&mut self) {
        let ids: Vec<FiberId> = {
            let mut guard = self.shared.lock().expect("lock poisoned");
            let mut ids: Vec<FiberId> = guard.fibers.keys().copied().collect();
            // Deterministic cancellation order regardless of map iteration.
            ids.sort_unstable();
            for id in &ids {
                if let Some(record) = guard.fibers.get(id) {
                    record.cx.request_cancel(CancelReason::shutdown());
                }
                guard.ready.schedule(*id);
            }
            ids
        };
        if !ids.is_empty() {
            debug!(fibers = ids.len(), "runtime shutdown requested");
        }
        self.run_until_quiescent();
    }

    /// Executes a single scheduling step.
    ///
    /// Returns true if a fiber was picked (even if it turned out to have
    /// already resolved).
    pub fn step(&mut self) -> bool {
        let picked = {
            let mut guard = self.shared.lock().expect("lock poisoned");
            guard.ready.pick(&mut self.rng)
        };
        let Some(id) = picked else {
            return false;
        };
        self.steps += 1;

        // Move the future out so the shared lock is not held while polling:
        // fibers re-enter the shared state when they fork or wake others.
        let taken = {
            let mut guard = self.shared.lock().expect("lock poisoned");
            match guard.fibers.get_mut(&id) {
                Some(record) => record
                    .future
                    .take()
                    .map(|future| (future, record.cx.cancel_reason())),
                None => None,
            }
        };
        let Some((mut future, cancel)) = taken else {
            return true;
        };

        if let Some(reason) = cancel {
            // Dropping the future runs every pending scope-restore guard;
            // only then does the fiber resolve as cancelled.
            drop(future);
            trace!(fiber = %id, reason = %reason, "fiber cancelled");
            self.resolve(id, move |record| record.completion.cancelled(reason));
            return true;
        }

        let waker = Waker::from(Arc::new(FiberWaker {
            fiber: id,
            shared: Arc::downgrade(&self.shared),
        }));
        let mut task_cx = Context::from_waker(&waker);
        let poll = catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut task_cx)));

        match poll {
            Ok(Poll::Ready(())) => {
                // Result already delivered through the wrapper future.
                drop(future);
                trace!(fiber = %id, "fiber completed");
                let mut guard = self.shared.lock().expect("lock poisoned");
                guard.fibers.remove(&id);
            }
            Ok(Poll::Pending) => {
                let mut guard = self.shared.lock().expect("lock poisoned");
                if let Some(record) = guard.fibers.get_mut(&id) {
                    record.future = Some(future);
                }
            }
            Err(payload) => {
                let payload = PanicPayload::new(panic_message(payload.as_ref()));
                drop(future);
                debug!(fiber = %id, panic = payload.message(), "fiber panicked");
                self.resolve(id, move |record| record.completion.panicked(payload));
            }
        }
        true
    }

    /// Removes a failed fiber, publishes its outcome, and cancels its
    /// still-live children with a parent-cancelled reason.
    fn resolve(&mut self, id: FiberId, deliver: impl FnOnce(&FiberRecord)) {
        let record = {
            let mut guard = self.shared.lock().expect("lock poisoned");
            guard.fibers.remove(&id)
        };
        if let Some(record) = record {
            deliver(&record);
        }
        let mut guard = self.shared.lock().expect("lock poisoned");
        for child in guard.children_of(id) {
            if let Some(record) = guard.fibers.get(&child) {
                record.cx.request_cancel(CancelReason::parent_cancelled());
            }
            guard.ready.schedule(child);
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Future that yields once, rescheduling its fiber for a later step.
///
/// Yield points are where cancellation and sibling interleavings become
/// observable; tests use them to pin down fork/scope orderings.
#[derive(Debug, Default)]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: std::pin::Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

/// Yields the current fiber once.
#[must_use]
pub fn yield_now() -> YieldNow {
    YieldNow::default()
}

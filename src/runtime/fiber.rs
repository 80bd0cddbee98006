//! Fiber records, join handles, and spawning.
//!
//! A fiber's result travels to joiners through a completion slot. The happy
//! path (the fiber runs to completion) delivers through the wrapper future;
//! the cancellation and panic paths deliver through a type-erased
//! [`Completion`] stored on the fiber record, because on those paths the
//! wrapper future is dropped rather than run to completion.

use crate::cx::Cx;
use crate::runtime::scheduler::Shared;
use crate::store::LocalStore;
use crate::tracing_compat::trace;
use crate::types::{CancelReason, FiberId, Outcome, PanicPayload};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll, Waker};

/// A live fiber owned by the scheduler.
pub(crate) struct FiberRecord {
    /// The fiber's capability context (shared with the fiber's own clones).
    pub(crate) cx: Cx,
    /// The fiber's future; `None` only while the runtime is polling it.
    pub(crate) future: Option<Pin<Box<dyn Future<Output = ()> + Send>>>,
    /// Failure-path result delivery (cancellation, panic).
    pub(crate) completion: Box<dyn Completion>,
}

impl std::fmt::Debug for FiberRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FiberRecord")
            .field("fiber", &self.cx.fiber_id())
            .field("polling", &self.future.is_none())
            .finish()
    }
}

/// Failure-path completion for a fiber whose value type has been erased.
pub(crate) trait Completion: Send {
    /// Resolves the fiber as cancelled.
    fn cancelled(&self, reason: CancelReason);
    /// Resolves the fiber as panicked.
    fn panicked(&self, payload: PanicPayload);
}

/// Slot a fiber's outcome is delivered into, shared with its handle.
pub(crate) struct JoinSlot<T> {
    outcome: Option<Outcome<T>>,
    waker: Option<Waker>,
    finished: bool,
}

impl<T> JoinSlot<T> {
    fn new() -> Self {
        Self {
            outcome: None,
            waker: None,
            finished: false,
        }
    }
}

/// Delivers `outcome` into the slot and wakes a pending joiner.
///
/// The first delivery wins; a fiber resolves exactly once.
pub(crate) fn complete<T>(slot: &Arc<Mutex<JoinSlot<T>>>, outcome: Outcome<T>) {
    let mut guard = slot.lock().expect("lock poisoned");
    if guard.finished {
        return;
    }
    guard.finished = true;
    guard.outcome = Some(outcome);
    if let Some(waker) = guard.waker.take() {
        waker.wake();
    }
}

struct SlotCompletion<T>(Arc<Mutex<JoinSlot<T>>>);

impl<T: Send> Completion for SlotCompletion<T> {
    fn cancelled(&self, reason: CancelReason) {
        complete(&self.0, Outcome::Cancelled(reason));
    }

    fn panicked(&self, payload: PanicPayload) {
        complete(&self.0, Outcome::Panicked(payload));
    }
}

/// A handle to a spawned fiber.
///
/// The handle observes the fiber's outcome and can request cancellation; it
/// does not own the fiber. Dropping the handle leaves the fiber running.
/// Join returns only the fiber's result — the fiber's local state is never
/// merged back into the joiner.
pub struct FiberHandle<T> {
    id: FiberId,
    slot: Arc<Mutex<JoinSlot<T>>>,
    shared: Weak<Mutex<Shared>>,
}

impl<T> std::fmt::Debug for FiberHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FiberHandle")
            .field("fiber", &self.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl<T> FiberHandle<T> {
    /// Returns the fiber's identity.
    #[must_use]
    pub fn id(&self) -> FiberId {
        self.id
    }

    /// Returns true if the fiber has resolved.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.slot.lock().expect("lock poisoned").finished
    }

    /// Requests cancellation of the fiber.
    ///
    /// Cancellation takes effect at the fiber's next scheduling point: its
    /// future is dropped there, which runs every pending scope-restore
    /// guard before the `Cancelled` outcome becomes observable through this
    /// handle. Requesting cancellation of a resolved fiber is a no-op.
    pub fn cancel(&self, reason: CancelReason) {
        if let Some(shared) = self.shared.upgrade() {
            let mut guard = shared.lock().expect("lock poisoned");
            if let Some(record) = guard.fibers.get(&self.id) {
                record.cx.request_cancel(reason);
                guard.ready.schedule(self.id);
            }
        }
    }

    /// Takes the fiber's outcome if it has already resolved.
    #[must_use]
    pub fn try_take_outcome(&self) -> Option<Outcome<T>> {
        self.slot.lock().expect("lock poisoned").outcome.take()
    }

    /// Waits for the fiber to resolve and returns its outcome.
    ///
    /// Intended to be awaited from another fiber on the same runtime; the
    /// joiner is woken when the fiber resolves.
    pub async fn join(self) -> Outcome<T> {
        JoinFuture { slot: self.slot }.await
    }
}

struct JoinFuture<T> {
    slot: Arc<Mutex<JoinSlot<T>>>,
}

impl<T> Future for JoinFuture<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut guard = self.slot.lock().expect("lock poisoned");
        if let Some(outcome) = guard.outcome.take() {
            Poll::Ready(outcome)
        } else {
            guard.waker = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

/// Creates a fiber record, registers it, and schedules its first step.
///
/// When `parent` is given, the child's ambient store is a value-snapshot of
/// the parent's store taken here — the fork instant. A root fiber starts
/// with an empty store.
pub(crate) fn spawn_into<F, Fut, T>(
    shared: &Arc<Mutex<Shared>>,
    parent: Option<&Cx>,
    f: F,
) -> FiberHandle<T>
where
    F: FnOnce(Cx) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let id = FiberId::next();
    let locals = parent.map_or_else(LocalStore::new, Cx::locals_snapshot);
    let cx = Cx::new_fiber(
        id,
        parent.map(Cx::fiber_id),
        locals,
        Arc::downgrade(shared),
    );

    let slot = Arc::new(Mutex::new(JoinSlot::new()));
    let user_future = f(cx.clone());
    let delivery = Arc::clone(&slot);
    let wrapped = async move {
        let value = user_future.await;
        complete(&delivery, Outcome::Ok(value));
    };

    let record = FiberRecord {
        cx,
        future: Some(Box::pin(wrapped)),
        completion: Box::new(SlotCompletion(Arc::clone(&slot))),
    };

    let mut guard = shared.lock().expect("lock poisoned");
    guard.fibers.insert(id, record);
    guard.ready.schedule(id);
    drop(guard);
    trace!(fiber = %id, "fiber spawned");

    FiberHandle {
        id,
        slot,
        shared: Arc::downgrade(shared),
    }
}

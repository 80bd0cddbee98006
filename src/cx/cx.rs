//! The fiber context type.
//!
//! `Cx` is the per-fiber capability token. It carries the fiber's identity,
//! cancellation state, and — centrally — the fiber's ambient [`LocalStore`],
//! the local-state mapping threaded linearly through that fiber's steps.
//!
//! # Threading model
//!
//! `Cx` is cheaply clonable (it wraps an `Arc`); clones share one fiber's
//! state. The semantic contract is that a `Cx` belongs to exactly one fiber:
//! the scheduler never runs two steps of the same fiber concurrently, so a
//! store step is atomic from the fiber's own point of view. `run_step`
//! additionally holds the inner write lock for the whole step, so even an
//! embedder that violates the contract cannot interleave two steps.
//!
//! # Fork semantics
//!
//! [`Cx::fork`] snapshots the ambient store *by value* at the fork instant
//! and hands the copy to the child fiber. From that instant the two stores
//! evolve independently: no write on either side is ever visible to the
//! other, and joining a child returns only its result value, never its local
//! state.

use crate::error::{Error, ErrorKind, Result};
use crate::runtime::{spawn_into, FiberHandle, Shared};
use crate::store::LocalStore;
use crate::tracing_compat::trace;
use crate::types::{CancelReason, FiberId};
use core::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock, Weak};

/// Internal state shared by all clones of one fiber's `Cx`.
#[derive(Debug)]
pub(crate) struct CxInner {
    /// This fiber's identity.
    fiber: FiberId,
    /// The parent fiber, if this fiber was forked.
    parent: Option<FiberId>,
    /// The ambient local-state store.
    locals: LocalStore,
    /// Pending cancellation request, if any.
    cancelled: Option<CancelReason>,
}

/// The capability context for a fiber.
///
/// All local-state operations flow through a `Cx`: a
/// [`FiberLocal`](crate::FiberLocal) handle reads and writes the ambient
/// store of whichever fiber's `Cx` it is given. A `Cx` also grants the
/// ability to fork child fibers and to observe cancellation.
#[derive(Clone)]
pub struct Cx {
    pub(crate) inner: Arc<RwLock<CxInner>>,
    scheduler: Weak<Mutex<Shared>>,
}

impl Cx {
    /// Creates the context for a new fiber (internal use).
    pub(crate) fn new_fiber(
        fiber: FiberId,
        parent: Option<FiberId>,
        locals: LocalStore,
        scheduler: Weak<Mutex<Shared>>,
    ) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CxInner {
                fiber,
                parent,
                locals,
                cancelled: None,
            })),
            scheduler,
        }
    }

    /// Creates a detached context with an empty ambient store.
    ///
    /// A detached context is not owned by any runtime: local-state
    /// operations work normally, but [`fork`](Self::fork) fails with
    /// [`ErrorKind::RuntimeShutdown`]. Useful for exercising local-state
    /// logic from synchronous call sites and unit tests.
    #[must_use]
    pub fn detached() -> Self {
        Self::new_fiber(FiberId::next(), None, LocalStore::new(), Weak::new())
    }

    /// Returns this fiber's identity.
    #[must_use]
    pub fn fiber_id(&self) -> FiberId {
        self.read().fiber
    }

    /// Returns the parent fiber's identity, if this fiber was forked.
    #[must_use]
    pub fn parent_id(&self) -> Option<FiberId> {
        self.read().parent
    }

    /// Returns true if cancellation has been requested for this fiber.
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.read().cancelled.is_some()
    }

    /// Returns the pending cancellation reason, if any.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.read().cancelled.clone()
    }

    /// Records a cancellation request, strengthening any existing one.
    pub(crate) fn request_cancel(&self, reason: CancelReason) {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.cancelled = Some(match inner.cancelled.take() {
            Some(existing) => existing.strengthen(reason),
            None => reason,
        });
    }

    /// Executes a store transformation step and commits the result.
    ///
    /// The step reads the fiber's current ambient store, produces a new
    /// store plus a result, and the new store becomes the ambient state for
    /// this fiber's subsequent steps. The inner lock is held for the whole
    /// step, making the transformation atomic with respect to this fiber.
    pub(crate) fn run_step<R>(&self, step: impl FnOnce(LocalStore) -> (LocalStore, R)) -> R {
        let mut inner = self.inner.write().expect("lock poisoned");
        let store = inner.locals.clone();
        let (next, result) = step(store);
        inner.locals = next;
        result
    }

    /// Returns a value-snapshot of this fiber's ambient store.
    ///
    /// This is the fork contract: the snapshot and the live store share
    /// structure internally but can never observe each other's subsequent
    /// changes.
    #[must_use]
    pub fn locals_snapshot(&self) -> LocalStore {
        self.read().locals.snapshot()
    }

    /// Forks a child fiber.
    ///
    /// The child begins execution with a value-copy of this fiber's ambient
    /// store taken at this instant; afterwards the two fibers' local state
    /// evolves independently. The factory receives the child's own `Cx`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::RuntimeShutdown`] if the owning runtime is gone
    /// (or this context is detached).
    pub fn fork<F, Fut, T>(&self, f: F) -> Result<FiberHandle<T>>
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let Some(shared) = self.scheduler.upgrade() else {
            return Err(Error::new(ErrorKind::RuntimeShutdown)
                .with_detail("fork requires a live runtime"));
        };
        let handle = spawn_into(&shared, Some(self), f);
        trace!(parent = %self.fiber_id(), child = %handle.id(), "fiber forked");
        Ok(handle)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, CxInner> {
        self.inner.read().expect("lock poisoned")
    }
}

impl fmt::Debug for Cx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.read();
        f.debug_struct("Cx")
            .field("fiber", &inner.fiber)
            .field("parent", &inner.parent)
            .field("locals", &inner.locals)
            .field("cancelled", &inner.cancelled)
            .finish()
    }
}

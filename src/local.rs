//! Fiber-local variables.
//!
//! A [`FiberLocal<A>`] is a typed handle to one slot of the ambient
//! [`LocalStore`](crate::LocalStore). The handle itself holds no value: it is
//! a key (a unique identity plus a default), and all value state lives in the
//! store carried by whichever fiber currently executes. Many fibers may hold
//! the same handle; each addresses its *own* store slot under that handle's
//! identity.
//!
//! # Propagation rules
//!
//! - Reads and writes are visible to the owning fiber's later steps.
//! - A forked child starts from a value-snapshot of the parent's store taken
//!   at the fork instant, then diverges freely.
//! - Nothing ever flows child→parent or sibling→sibling; joining a fiber
//!   returns its result value only.
//!
//! # Scoped overrides
//!
//! [`FiberLocal::scope`] installs a value for the lifetime of an RAII guard
//! and restores the previously active state when the guard drops — on normal
//! exit, unwind, or cancellation alike. The guard captures the raw slot
//! state, so a scope entered while the slot was unset restores "unset" and a
//! later `get` still tracks the default.
//!
//! ```
//! use fiberlocal::{FiberLocal, Runtime};
//!
//! let mut runtime = Runtime::with_seed(7);
//! let counter = FiberLocal::new(0u64);
//! let local = counter.clone();
//! let result = runtime
//!     .run(move |cx| async move {
//!         local.set(&cx, 41);
//!         local.update(&cx, |n| n + 1);
//!         local.get(&cx)
//!     })
//!     .unwrap();
//! assert_eq!(result, 42);
//! ```

use crate::cx::Cx;
use crate::store::{LocalStore, StoredValue};
use crate::tracing_compat::trace;
use crate::types::LocalId;
use std::future::Future;
use std::sync::Arc;

/// A typed handle to a fiber-local variable.
///
/// Created with [`FiberLocal::new`], which allocates a globally unique
/// identity: two handles created independently never alias each other's
/// storage, even with equal defaults. The handle is immutable after
/// construction and cheap to clone and share across fibers; only the store
/// entries it indexes change.
pub struct FiberLocal<A> {
    id: LocalId,
    default: Arc<A>,
}

impl<A> Clone for FiberLocal<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            default: Arc::clone(&self.default),
        }
    }
}

impl<A> std::fmt::Debug for FiberLocal<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FiberLocal").field("id", &self.id).finish()
    }
}

impl<A> FiberLocal<A>
where
    A: Clone + Send + Sync + 'static,
{
    /// Creates a new fiber-local variable with the given default value.
    ///
    /// Allocating the identity is the observable effect here: every call
    /// returns a handle addressing a fresh slot.
    #[must_use]
    pub fn new(default: A) -> Self {
        Self {
            id: LocalId::next(),
            default: Arc::new(default),
        }
    }

    /// Returns this variable's identity.
    #[must_use]
    pub fn id(&self) -> LocalId {
        self.id
    }

    /// Returns the current value in the given fiber's store, or the default
    /// if the slot is unset.
    #[must_use]
    pub fn get(&self, cx: &Cx) -> A {
        cx.run_step(|store| {
            let value = self.current(&store);
            (store, value)
        })
    }

    /// Stores `value` in the given fiber's slot.
    pub fn set(&self, cx: &Cx, value: A) {
        cx.run_step(|store| (store.set(self.id, Arc::new(value)), ()));
    }

    /// Clears the slot; a subsequent [`get`](Self::get) returns the default.
    pub fn reset(&self, cx: &Cx) {
        cx.run_step(|store| (store.remove(self.id), ()));
    }

    /// Replaces the current value with `f(current)`.
    ///
    /// The whole replacement is one step: no other read or write of this
    /// fiber's store can observe an intermediate state. An unset slot is
    /// treated exactly like a slot holding the default.
    pub fn update(&self, cx: &Cx, f: impl FnOnce(A) -> A) {
        cx.run_step(|store| {
            let next = f(self.current(&store));
            (store.set(self.id, Arc::new(next)), ())
        });
    }

    /// Like [`update`](Self::update), but `f` also returns an auxiliary
    /// result which is passed through to the caller.
    pub fn modify<B>(&self, cx: &Cx, f: impl FnOnce(A) -> (A, B)) -> B {
        cx.run_step(|store| {
            let (next, aux) = f(self.current(&store));
            (store.set(self.id, Arc::new(next)), aux)
        })
    }

    /// Stores `value` and returns the previously active value.
    pub fn get_and_set(&self, cx: &Cx, value: A) -> A {
        cx.run_step(|store| {
            let previous = self.current(&store);
            (store.set(self.id, Arc::new(value)), previous)
        })
    }

    /// Clears the slot and returns the previously active value.
    pub fn get_and_reset(&self, cx: &Cx) -> A {
        cx.run_step(|store| {
            let previous = self.current(&store);
            (store.remove(self.id), previous)
        })
    }

    /// Installs `value` for the lifetime of the returned guard.
    ///
    /// On entry the raw slot state (present value or "unset") is captured;
    /// when the guard drops — normal exit, unwind, or the fiber being
    /// cancelled and its future dropped — that state is restored, no matter
    /// what mutations happened in between. Restoration is a synchronous
    /// store step and cannot be interrupted.
    ///
    /// Nested scopes compose: each guard restores what was active at its own
    /// entry, so dropping the inner guard rolls back to the outer scope's
    /// value and dropping the outer guard rolls back to the pre-scope state.
    #[must_use = "the override is removed when the guard is dropped"]
    pub fn scope(&self, cx: &Cx, value: A) -> ScopeGuard {
        let saved = cx.run_step(|store| {
            let saved = store.get(self.id).cloned();
            (store.set(self.id, Arc::new(value)), saved)
        });
        trace!(local = %self.id, "scope entered");
        ScopeGuard {
            cx: cx.clone(),
            id: self.id,
            saved,
        }
    }

    /// Runs `body` with `value` installed, restoring the previous state on
    /// every exit path.
    ///
    /// Equivalent to holding a [`scope`](Self::scope) guard across the
    /// `body` await.
    pub async fn scoped<T>(&self, cx: &Cx, value: A, body: impl Future<Output = T>) -> T {
        let _guard = self.scope(cx, value);
        body.await
    }

    /// Derives a view of this variable through a focus.
    ///
    /// The lens addresses the *same* slot: writes through the lens are
    /// `read → transform → write` steps on the underlying `A`, and writes to
    /// the underlying variable are immediately visible through the lens.
    pub fn lens<B, G, S>(&self, read: G, write: S) -> FiberLocalLens<A, B>
    where
        G: Fn(&A) -> B + Send + Sync + 'static,
        S: Fn(&A, B) -> A + Send + Sync + 'static,
    {
        FiberLocalLens {
            source: self.clone(),
            read: Arc::new(read),
            write: Arc::new(write),
        }
    }

    /// The effective current value: the stored value, or the default when
    /// the slot is unset.
    fn current(&self, store: &LocalStore) -> A {
        store.get(self.id).map_or_else(
            || (*self.default).clone(),
            |value| Self::decode(value).clone(),
        )
    }

    /// Typed access at the erasure boundary.
    ///
    /// The slot for this identity can only ever have been written through a
    /// handle of this type, so the downcast is infallible by construction.
    fn decode(value: &StoredValue) -> &A {
        value
            .downcast_ref::<A>()
            .expect("local slot holds a value of the declared type")
    }
}

/// RAII guard for a scoped override; see [`FiberLocal::scope`].
///
/// Dropping the guard restores the slot state captured at scope entry. The
/// guard is the guaranteed-finalizer integration point: because restoration
/// lives in `Drop`, no early return, unwind, or cancellation-driven future
/// drop can skip it.
#[must_use = "the override is removed when the guard is dropped"]
pub struct ScopeGuard {
    cx: Cx,
    id: LocalId,
    saved: Option<StoredValue>,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let id = self.id;
        let saved = self.saved.take();
        self.cx.run_step(|store| {
            let restored = match saved {
                Some(value) => store.set(id, value),
                None => store.remove(id),
            };
            (restored, ())
        });
        trace!(local = %id, "scope exited");
    }
}

impl std::fmt::Debug for ScopeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeGuard").field("id", &self.id).finish()
    }
}

/// A view of a [`FiberLocal<A>`] focused on a component `B`.
///
/// Created with [`FiberLocal::lens`]. All operations go through the
/// underlying variable's slot, so the lens and its source always agree.
pub struct FiberLocalLens<A, B> {
    source: FiberLocal<A>,
    read: Arc<dyn Fn(&A) -> B + Send + Sync>,
    write: Arc<dyn Fn(&A, B) -> A + Send + Sync>,
}

impl<A, B> Clone for FiberLocalLens<A, B> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            read: Arc::clone(&self.read),
            write: Arc::clone(&self.write),
        }
    }
}

impl<A, B> std::fmt::Debug for FiberLocalLens<A, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FiberLocalLens")
            .field("id", &self.source.id)
            .finish()
    }
}

impl<A, B> FiberLocalLens<A, B>
where
    A: Clone + Send + Sync + 'static,
{
    /// Returns the focused component of the current value.
    #[must_use]
    pub fn get(&self, cx: &Cx) -> B {
        cx.run_step(|store| {
            let focused = (self.read)(&self.source.current(&store));
            (store, focused)
        })
    }

    /// Writes the focused component back through the underlying value.
    pub fn set(&self, cx: &Cx, value: B) {
        cx.run_step(|store| {
            let next = (self.write)(&self.source.current(&store), value);
            (store.set(self.source.id, Arc::new(next)), ())
        });
    }

    /// Replaces the focused component with `f(current)` in one step.
    pub fn update(&self, cx: &Cx, f: impl FnOnce(B) -> B) {
        cx.run_step(|store| {
            let current = self.source.current(&store);
            let next = (self.write)(&current, f((self.read)(&current)));
            (store.set(self.source.id, Arc::new(next)), ())
        });
    }

    /// Like [`update`](Self::update), but `f` also returns an auxiliary
    /// result which is passed through to the caller.
    pub fn modify<C>(&self, cx: &Cx, f: impl FnOnce(B) -> (B, C)) -> C {
        cx.run_step(|store| {
            let current = self.source.current(&store);
            let (next, aux) = f((self.read)(&current));
            (
                store.set(self.source.id, Arc::new((self.write)(&current, next))),
                aux,
            )
        })
    }

    /// Writes the focused component and returns its previous value.
    pub fn get_and_set(&self, cx: &Cx, value: B) -> B {
        cx.run_step(|store| {
            let current = self.source.current(&store);
            let previous = (self.read)(&current);
            (
                store.set(self.source.id, Arc::new((self.write)(&current, value))),
                previous,
            )
        })
    }

    /// Clears the underlying slot; subsequent reads focus the default.
    pub fn reset(&self, cx: &Cx) {
        self.source.reset(cx);
    }

    /// Clears the underlying slot and returns the previously focused value.
    pub fn get_and_reset(&self, cx: &Cx) -> B {
        cx.run_step(|store| {
            let previous = (self.read)(&self.source.current(&store));
            (store.remove(self.source.id), previous)
        })
    }

    /// Installs the focused value for the lifetime of the returned guard.
    ///
    /// Captures and restores the underlying slot's raw state, with the same
    /// guarantees as [`FiberLocal::scope`].
    #[must_use = "the override is removed when the guard is dropped"]
    pub fn scope(&self, cx: &Cx, value: B) -> ScopeGuard {
        let saved = cx.run_step(|store| {
            let saved = store.get(self.source.id).cloned();
            let next = (self.write)(&self.source.current(&store), value);
            (store.set(self.source.id, Arc::new(next)), saved)
        });
        trace!(local = %self.source.id, "lens scope entered");
        ScopeGuard {
            cx: cx.clone(),
            id: self.source.id,
            saved,
        }
    }

    /// Runs `body` with the focused value installed, restoring the previous
    /// state on every exit path.
    pub async fn scoped<T>(&self, cx: &Cx, value: B, body: impl Future<Output = T>) -> T {
        let _guard = self.scope(cx, value);
        body.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_default_when_unset() {
        let cx = Cx::detached();
        let local = FiberLocal::new(7u32);
        assert_eq!(local.get(&cx), 7);
    }

    #[test]
    fn set_then_get() {
        let cx = Cx::detached();
        let local = FiberLocal::new(0u32);
        local.set(&cx, 42);
        assert_eq!(local.get(&cx), 42);
    }

    #[test]
    fn reset_restores_default() {
        let cx = Cx::detached();
        let local = FiberLocal::new(7u32);
        local.set(&cx, 42);
        local.reset(&cx);
        assert_eq!(local.get(&cx), 7);
    }

    #[test]
    fn update_applies_function_to_effective_value() {
        let cx = Cx::detached();
        let local = FiberLocal::new(10u32);
        // Unset slot: f sees the default.
        local.update(&cx, |n| n + 1);
        assert_eq!(local.get(&cx), 11);
        local.update(&cx, |n| n * 2);
        assert_eq!(local.get(&cx), 22);
    }

    #[test]
    fn modify_returns_auxiliary_result() {
        let cx = Cx::detached();
        let local = FiberLocal::new(5u32);
        let aux = local.modify(&cx, |n| (n + 1, format!("was {n}")));
        assert_eq!(aux, "was 5");
        assert_eq!(local.get(&cx), 6);
    }

    #[test]
    fn get_and_set_returns_previous() {
        let cx = Cx::detached();
        let local = FiberLocal::new(1u32);
        assert_eq!(local.get_and_set(&cx, 2), 1);
        assert_eq!(local.get_and_set(&cx, 3), 2);
        assert_eq!(local.get(&cx), 3);
    }

    #[test]
    fn get_and_reset_returns_previous_and_clears() {
        let cx = Cx::detached();
        let local = FiberLocal::new(1u32);
        local.set(&cx, 9);
        assert_eq!(local.get_and_reset(&cx), 9);
        assert_eq!(local.get(&cx), 1);
    }

    #[test]
    fn distinct_handles_with_equal_defaults_never_alias() {
        let cx = Cx::detached();
        let a = FiberLocal::new(0u32);
        let b = FiberLocal::new(0u32);
        a.set(&cx, 1);
        assert_eq!(b.get(&cx), 0);
        b.set(&cx, 2);
        assert_eq!(a.get(&cx), 1);
    }

    #[test]
    fn scope_restores_on_normal_exit() {
        let cx = Cx::detached();
        let local = FiberLocal::new(0u32);
        local.set(&cx, 42);
        {
            let _guard = local.scope(&cx, 0);
            assert_eq!(local.get_and_set(&cx, 1), 0);
            assert_eq!(local.get(&cx), 1);
        }
        assert_eq!(local.get(&cx), 42);
    }

    #[test]
    fn scope_restores_unset_state() {
        let cx = Cx::detached();
        let local = FiberLocal::new(7u32);
        {
            let _guard = local.scope(&cx, 99);
            local.set(&cx, 100);
        }
        // The slot is unset again, so the default shows through.
        assert_eq!(local.get(&cx), 7);
        assert!(!cx.locals_snapshot().contains(local.id()));
    }

    #[test]
    fn nested_scopes_restore_in_lifo_order() {
        let cx = Cx::detached();
        let local = FiberLocal::new(0u32);
        local.set(&cx, 42);
        {
            let _outer = local.scope(&cx, 1);
            {
                let _inner = local.scope(&cx, 2);
                local.set(&cx, 3);
                assert_eq!(local.get(&cx), 3);
            }
            assert_eq!(local.get(&cx), 1);
        }
        assert_eq!(local.get(&cx), 42);
    }

    #[test]
    fn scope_restores_on_unwind() {
        let cx = Cx::detached();
        let local = FiberLocal::new(42u32);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = local.scope(&cx, 0);
            local.set(&cx, 1);
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(local.get(&cx), 42);
    }

    #[test]
    fn heterogeneous_locals_coexist() {
        let cx = Cx::detached();
        let number = FiberLocal::new(0u64);
        let name = FiberLocal::new(String::from("anonymous"));
        number.set(&cx, 9);
        name.set(&cx, String::from("fiber"));
        assert_eq!(number.get(&cx), 9);
        assert_eq!(name.get(&cx), "fiber");
    }

    #[derive(Clone, Debug, PartialEq)]
    struct RequestMeta {
        id: u64,
        attempt: u32,
    }

    fn attempt_lens(local: &FiberLocal<RequestMeta>) -> FiberLocalLens<RequestMeta, u32> {
        local.lens(
            |meta| meta.attempt,
            |meta, attempt| RequestMeta { attempt, ..meta.clone() },
        )
    }

    #[test]
    fn lens_reads_and_writes_through_source() {
        let cx = Cx::detached();
        let meta = FiberLocal::new(RequestMeta { id: 1, attempt: 0 });
        let attempts = attempt_lens(&meta);

        assert_eq!(attempts.get(&cx), 0);
        attempts.set(&cx, 3);
        assert_eq!(meta.get(&cx), RequestMeta { id: 1, attempt: 3 });

        meta.set(&cx, RequestMeta { id: 2, attempt: 5 });
        assert_eq!(attempts.get(&cx), 5);
    }

    #[test]
    fn lens_update_and_modify() {
        let cx = Cx::detached();
        let meta = FiberLocal::new(RequestMeta { id: 1, attempt: 0 });
        let attempts = attempt_lens(&meta);

        attempts.update(&cx, |n| n + 1);
        let aux = attempts.modify(&cx, |n| (n + 1, n));
        assert_eq!(aux, 1);
        assert_eq!(attempts.get(&cx), 2);
        // The unfocused component is untouched.
        assert_eq!(meta.get(&cx).id, 1);
    }

    #[test]
    fn lens_get_and_set_and_reset() {
        let cx = Cx::detached();
        let meta = FiberLocal::new(RequestMeta { id: 1, attempt: 2 });
        let attempts = attempt_lens(&meta);

        assert_eq!(attempts.get_and_set(&cx, 7), 2);
        assert_eq!(attempts.get_and_reset(&cx), 7);
        assert_eq!(meta.get(&cx), RequestMeta { id: 1, attempt: 2 });
    }

    #[test]
    fn lens_scope_restores_source_state() {
        let cx = Cx::detached();
        let meta = FiberLocal::new(RequestMeta { id: 1, attempt: 0 });
        let attempts = attempt_lens(&meta);
        meta.set(&cx, RequestMeta { id: 3, attempt: 1 });
        {
            let _guard = attempts.scope(&cx, 9);
            assert_eq!(attempts.get(&cx), 9);
            assert_eq!(meta.get(&cx).id, 3);
        }
        assert_eq!(meta.get(&cx), RequestMeta { id: 3, attempt: 1 });
    }
}

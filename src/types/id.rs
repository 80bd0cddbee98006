//! Identifier types for fibers and local variables.
//!
//! Both identifiers are allocated from process-wide atomic counters, so two
//! allocations can never collide. For [`LocalId`] this uniqueness *is* the
//! semantic contract: a local variable is keyed by identity, and two
//! independently created variables must never alias each other's storage
//! slot, even when their default values are equal.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_FIBER_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_LOCAL_ID: AtomicU64 = AtomicU64::new(1);

/// A unique identifier for a fiber.
///
/// Fibers form a tree: every fiber except a root is forked from a parent and
/// carries a value-snapshot of the parent's local state from its fork instant.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FiberId(u64);

impl FiberId {
    /// Allocates a fresh fiber identifier.
    #[must_use]
    pub(crate) fn next() -> Self {
        Self(NEXT_FIBER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Creates a fiber ID for testing purposes.
    #[doc(hidden)]
    #[must_use]
    pub const fn new_for_test(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FiberId({})", self.0)
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.0)
    }
}

/// A unique identifier for a fiber-local variable.
///
/// This is the key under which a [`FiberLocal`](crate::FiberLocal) addresses
/// its slot in the ambient [`LocalStore`](crate::LocalStore). Allocating the
/// identifier is the observable effect of constructing a handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(u64);

impl LocalId {
    /// Allocates a fresh local-variable identifier.
    #[must_use]
    pub(crate) fn next() -> Self {
        Self(NEXT_LOCAL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Creates a local ID for testing purposes.
    #[doc(hidden)]
    #[must_use]
    pub const fn new_for_test(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalId({})", self.0)
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

//! The persistent local-state store.
//!
//! A [`LocalStore`] is an immutable mapping from local-variable identity to a
//! type-erased value. It is the ambient state a fiber threads linearly
//! through its own steps: every mutating operation returns a *new* store and
//! leaves the input untouched. Because the backing map is structurally
//! shared, snapshotting a store at a fork instant is an O(1) clone, and the
//! parent's and child's stores evolve independently from that point on.
//!
//! Values are stored as `Arc<dyn Any + Send + Sync>`. The only typed access
//! is at the [`FiberLocal`](crate::FiberLocal) boundary, which downcasts at
//! its own key; the erased representation never leaks out of the crate.

use crate::types::LocalId;
use core::fmt;
use std::any::Any;
use std::sync::Arc;

/// A type-erased value slot.
pub(crate) type StoredValue = Arc<dyn Any + Send + Sync>;

/// An immutable, structurally-shared map from variable identity to value.
///
/// Absence of a key means "use that variable's default"; the store never
/// materializes an entry for a default value.
#[derive(Clone, Default)]
pub struct LocalStore {
    entries: im::HashMap<LocalId, StoredValue>,
}

impl LocalStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: im::HashMap::new(),
        }
    }

    /// Returns the value stored under `key`, if present.
    #[must_use]
    pub(crate) fn get(&self, key: LocalId) -> Option<&StoredValue> {
        self.entries.get(&key)
    }

    /// Returns a new store with `value` bound under `key`.
    #[must_use]
    pub(crate) fn set(&self, key: LocalId, value: StoredValue) -> Self {
        Self {
            entries: self.entries.update(key, value),
        }
    }

    /// Returns a new store without an entry for `key`.
    #[must_use]
    pub(crate) fn remove(&self, key: LocalId) -> Self {
        Self {
            entries: self.entries.without(&key),
        }
    }

    /// Returns true if the store has an explicit entry for `key`.
    #[must_use]
    pub fn contains(&self, key: LocalId) -> bool {
        self.entries.contains_key(&key)
    }

    /// Returns the number of explicit entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the store has no explicit entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns a value-snapshot of this store.
    ///
    /// This is what the scheduler hands to a child fiber at the fork
    /// instant. It is an O(1) structural-sharing clone; subsequent `set` and
    /// `remove` operations on either copy are invisible to the other.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        self.clone()
    }
}

impl fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalStore")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value<T: Send + Sync + 'static>(v: T) -> StoredValue {
        Arc::new(v)
    }

    fn read<T: Clone + Send + Sync + 'static>(store: &LocalStore, key: LocalId) -> Option<T> {
        store
            .get(key)
            .map(|v| v.downcast_ref::<T>().expect("declared type").clone())
    }

    #[test]
    fn set_then_get() {
        let key = LocalId::next();
        let store = LocalStore::new().set(key, value(42u32));
        assert_eq!(read::<u32>(&store, key), Some(42));
    }

    #[test]
    fn absent_key_reads_none() {
        let store = LocalStore::new();
        assert_eq!(read::<u32>(&store, LocalId::next()), None);
        assert!(store.is_empty());
    }

    #[test]
    fn remove_after_set_yields_absent() {
        let key = LocalId::next();
        let store = LocalStore::new().set(key, value(1u32));
        let removed = store.remove(key);
        assert_eq!(read::<u32>(&removed, key), None);
        assert!(!removed.contains(key));
        // The input store is unchanged.
        assert_eq!(read::<u32>(&store, key), Some(1));
    }

    #[test]
    fn set_does_not_mutate_input() {
        let key = LocalId::next();
        let base = LocalStore::new().set(key, value(1u32));
        let updated = base.set(key, value(2u32));
        assert_eq!(read::<u32>(&base, key), Some(1));
        assert_eq!(read::<u32>(&updated, key), Some(2));
    }

    #[test]
    fn derived_stores_never_observe_each_other() {
        let key_a = LocalId::next();
        let key_b = LocalId::next();
        let ancestor = LocalStore::new().set(key_a, value(10u32));

        let left = ancestor.set(key_a, value(11u32));
        let right = ancestor.set(key_b, value(20u32)).remove(key_a);

        assert_eq!(read::<u32>(&left, key_a), Some(11));
        assert_eq!(read::<u32>(&left, key_b), None);
        assert_eq!(read::<u32>(&right, key_a), None);
        assert_eq!(read::<u32>(&right, key_b), Some(20));
        assert_eq!(read::<u32>(&ancestor, key_a), Some(10));
    }

    #[test]
    fn snapshot_is_independent() {
        let key = LocalId::next();
        let parent = LocalStore::new().set(key, value(42u32));
        let child = parent.snapshot();

        let parent = parent.set(key, value(1u32));
        let child = child.set(key, value(2u32));

        assert_eq!(read::<u32>(&parent, key), Some(1));
        assert_eq!(read::<u32>(&child, key), Some(2));
    }

    #[test]
    fn heterogeneous_values_under_distinct_keys() {
        let num = LocalId::next();
        let text = LocalId::next();
        let store = LocalStore::new()
            .set(num, value(7u64))
            .set(text, value(String::from("ctx")));
        assert_eq!(read::<u64>(&store, num), Some(7));
        assert_eq!(read::<String>(&store, text), Some(String::from("ctx")));
        assert_eq!(store.len(), 2);
    }
}

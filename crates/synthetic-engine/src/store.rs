//! Per-instance property storage.
//!
//! [`PropertyStore`] is an insertion-ordered `PropertyKey → Value` mapping
//! with one protocol-level quirk: writing the absent sentinel
//! (`Value::Undefined`) removes the key instead of storing it, so a store
//! never holds an "explicitly absent" entry.
//!
//! Store methods are pure data operations. Lifecycle gating (locks,
//! revocation) belongs to the dispatcher; nothing here reenters the
//! protocol or observes handle state.

use indexmap::IndexMap;

use crate::value::{PropertyKey, Value};

/// Insertion-ordered key → value storage for one handle.
///
/// Re-writing an existing key keeps its original position; deleting keeps
/// the relative order of the remaining keys (`shift_remove`, O(n) worst
/// case — order stability is the contract).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyStore {
    entries: IndexMap<PropertyKey, Value>,
}

impl PropertyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a key. Absent keys read as `None`; callers surface that as the
    /// absent sentinel.
    pub fn read(&self, key: &PropertyKey) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Write a key. Writing the absent sentinel removes the key.
    pub fn write(&mut self, key: PropertyKey, value: Value) {
        if value.is_undefined() {
            self.entries.shift_remove(&key);
        } else {
            self.entries.insert(key, value);
        }
    }

    /// Remove a key, reporting whether it was present.
    pub fn delete(&mut self, key: &PropertyKey) -> bool {
        self.entries.shift_remove(key).is_some()
    }

    /// Existence check.
    pub fn has(&self, key: &PropertyKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &PropertyKey> {
        self.entries.keys()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry (revocation cleanup path).
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

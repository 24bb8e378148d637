//! Fixed-cardinality ordinal index.

use crate::value::IndexValue;
use std::collections::HashSet;
use std::hash::Hash;

/// Index over the ordinals of a small fixed-cardinality enum: one id set
/// per ordinal, resolved by array lookup.
///
/// Built for severity statuses, where a sorted tree would pay a log
/// factor to order six known keys. Lookups with out-of-range ordinals
/// return empty sets; only `insert` treats them as a programming error.
#[derive(Debug)]
pub struct EnumIndex<K> {
    name: String,
    slots: Vec<HashSet<K>>,
}

impl<K: Clone + Eq + Hash> EnumIndex<K> {
    /// Creates an empty index over `cardinality` ordinals.
    pub fn new(name: impl Into<String>, cardinality: usize) -> Self {
        Self {
            name: name.into(),
            slots: (0..cardinality).map(|_| HashSet::new()).collect(),
        }
    }

    /// Returns the index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of ordinals.
    pub fn cardinality(&self) -> usize {
        self.slots.len()
    }

    /// Maps `ordinal` to `id`.
    ///
    /// # Panics
    ///
    /// Panics if `ordinal` is outside the declared cardinality.
    pub fn insert(&mut self, ordinal: usize, id: K) {
        assert!(
            ordinal < self.slots.len(),
            "enum index {} ordinal {ordinal} out of range",
            self.name
        );
        self.slots[ordinal].insert(id);
    }

    /// Unmaps `ordinal` from `id`.
    pub fn remove(&mut self, ordinal: usize, id: &K) {
        if let Some(ids) = self.slots.get_mut(ordinal) {
            ids.remove(id);
        }
    }

    /// Returns the ids at `ordinal`.
    pub fn get(&self, ordinal: usize) -> HashSet<K> {
        self.slots.get(ordinal).cloned().unwrap_or_default()
    }

    /// Returns the ids of every ordinal strictly less than `ordinal`.
    pub fn before(&self, ordinal: usize) -> HashSet<K> {
        self.collect(0..ordinal.min(self.slots.len()))
    }

    /// Returns the ids of every ordinal greater than or equal to
    /// `ordinal`.
    pub fn after_equal(&self, ordinal: usize) -> HashSet<K> {
        self.collect(ordinal.min(self.slots.len())..self.slots.len())
    }

    /// Returns the ids of every ordinal strictly greater than `ordinal`.
    pub fn after(&self, ordinal: usize) -> HashSet<K> {
        self.collect(ordinal.saturating_add(1).min(self.slots.len())..self.slots.len())
    }

    /// Returns the ids of the smallest populated ordinal strictly greater
    /// than `ordinal`.
    pub fn after_first_greater(&self, ordinal: usize) -> HashSet<K> {
        self.slots
            .iter()
            .skip(ordinal.saturating_add(1))
            .find(|ids| !ids.is_empty())
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the ids of every ordinal accepted by `accept`, offered in
    /// its [`IndexValue`] form.
    pub fn keys_matching(&self, accept: &dyn Fn(&IndexValue) -> bool) -> HashSet<K> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(ordinal, _)| accept(&IndexValue::ordinal(*ordinal)))
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }

    /// Returns every id present in the index.
    pub fn ids(&self) -> HashSet<K> {
        self.collect(0..self.slots.len())
    }

    /// Returns the total number of mapped ids.
    pub fn len(&self) -> usize {
        self.slots.iter().map(HashSet::len).sum()
    }

    /// Returns `true` if no id is mapped.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(HashSet::is_empty)
    }

    fn collect(&self, range: std::ops::Range<usize>) -> HashSet<K> {
        self.slots[range]
            .iter()
            .flat_map(|ids| ids.iter().cloned())
            .collect()
    }
}

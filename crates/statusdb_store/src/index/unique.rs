//! Unique ordered indexes.
//!
//! Both variants map each key to exactly one id and treat a duplicate
//! `insert` as a programming error: the only unique keys in the system
//! are allocator-issued versions, so a collision means the allocator is
//! broken and silently overwriting would hide corruption.

use crate::value::IndexValue;
use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;
use std::ops::Bound;

/// Ordered index over [`IndexValue`] keys with one id per key.
#[derive(Debug)]
pub struct UniqueSortedIndex<K> {
    name: String,
    entries: BTreeMap<IndexValue, K>,
}

impl<K: Clone + Eq + Hash> UniqueSortedIndex<K> {
    /// Creates an empty index.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Returns the index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maps `key` to `id`.
    ///
    /// # Panics
    ///
    /// Panics if `key` is already mapped.
    pub fn insert(&mut self, key: IndexValue, id: K) {
        if self.entries.contains_key(&key) {
            panic!("unique index {} already contains key {key}", self.name);
        }
        self.entries.insert(key, id);
    }

    /// Unmaps `key`.
    pub fn remove(&mut self, key: &IndexValue) {
        self.entries.remove(key);
    }

    /// Returns the id mapped to `key`.
    pub fn get(&self, key: &IndexValue) -> Option<K> {
        self.entries.get(key).cloned()
    }

    /// Returns the ids of every key strictly less than `key`.
    pub fn before(&self, key: &IndexValue) -> HashSet<K> {
        self.collect_range((Bound::Unbounded, Bound::Excluded(key)))
    }

    /// Returns the ids of every key greater than or equal to `key`.
    pub fn after_equal(&self, key: &IndexValue) -> HashSet<K> {
        self.collect_range((Bound::Included(key), Bound::Unbounded))
    }

    /// Returns the ids of every key strictly greater than `key`.
    pub fn after(&self, key: &IndexValue) -> HashSet<K> {
        self.collect_range((Bound::Excluded(key), Bound::Unbounded))
    }

    /// Returns the id of the smallest key strictly greater than `key`.
    pub fn after_first_greater(&self, key: &IndexValue) -> Option<K> {
        self.entries
            .range::<IndexValue, _>((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .map(|(_, id)| id.clone())
    }

    /// Returns the ids of every key accepted by `accept`.
    pub fn keys_matching(&self, accept: &dyn Fn(&IndexValue) -> bool) -> HashSet<K> {
        self.entries
            .iter()
            .filter(|(key, _)| accept(key))
            .map(|(_, id)| id.clone())
            .collect()
    }

    /// Returns every id present in the index.
    pub fn ids(&self) -> HashSet<K> {
        self.entries.values().cloned().collect()
    }

    /// Returns the number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the index holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn collect_range(&self, bounds: (Bound<&IndexValue>, Bound<&IndexValue>)) -> HashSet<K> {
        self.entries
            .range::<IndexValue, _>(bounds)
            .map(|(_, id)| id.clone())
            .collect()
    }
}

/// Ordered index over raw `i64` keys with one id per key.
///
/// This is the version index: versions are dense, totally ordered and
/// unique, so the key type is fixed to the scalar instead of paying for
/// the [`IndexValue`] wrapper on the hottest index in the store.
#[derive(Debug)]
pub struct UniqueScalarIndex<K> {
    name: String,
    entries: BTreeMap<i64, K>,
}

impl<K: Clone + Eq + Hash> UniqueScalarIndex<K> {
    /// Creates an empty index.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Returns the index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maps `key` to `id`.
    ///
    /// # Panics
    ///
    /// Panics if `key` is already mapped.
    pub fn insert(&mut self, key: i64, id: K) {
        if self.entries.contains_key(&key) {
            panic!("unique index {} already contains key {key}", self.name);
        }
        self.entries.insert(key, id);
    }

    /// Unmaps `key`.
    pub fn remove(&mut self, key: i64) {
        self.entries.remove(&key);
    }

    /// Returns the id mapped to `key`.
    pub fn get(&self, key: i64) -> Option<K> {
        self.entries.get(&key).cloned()
    }

    /// Returns the ids of every key strictly less than `key`.
    pub fn before(&self, key: i64) -> HashSet<K> {
        self.entries.range(..key).map(|(_, id)| id.clone()).collect()
    }

    /// Returns the ids of every key greater than or equal to `key`.
    pub fn after_equal(&self, key: i64) -> HashSet<K> {
        self.entries.range(key..).map(|(_, id)| id.clone()).collect()
    }

    /// Returns the ids of every key strictly greater than `key`.
    pub fn after(&self, key: i64) -> HashSet<K> {
        self.entries
            .range((Bound::Excluded(key), Bound::Unbounded))
            .map(|(_, id)| id.clone())
            .collect()
    }

    /// Returns the id of the smallest key strictly greater than `key`.
    pub fn after_first_greater(&self, key: i64) -> Option<K> {
        self.entries
            .range((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .map(|(_, id)| id.clone())
    }

    /// Returns the ids of every key accepted by `accept`, offered the
    /// key in its [`IndexValue`] form.
    pub fn keys_matching(&self, accept: &dyn Fn(&IndexValue) -> bool) -> HashSet<K> {
        self.entries
            .iter()
            .filter(|(key, _)| accept(&IndexValue::int(**key)))
            .map(|(_, id)| id.clone())
            .collect()
    }

    /// Returns every id present in the index.
    pub fn ids(&self) -> HashSet<K> {
        self.entries.values().cloned().collect()
    }

    /// Returns the largest key, if any.
    pub fn max_key(&self) -> Option<i64> {
        self.entries.keys().next_back().copied()
    }

    /// Returns the number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the index holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

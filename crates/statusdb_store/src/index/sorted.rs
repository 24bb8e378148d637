//! Ordered range index.

use crate::value::IndexValue;
use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;
use std::ops::Bound;

/// Ordered index: projected value to the set of ids carrying it, with
/// range lookups in O(log n + k).
#[derive(Debug)]
pub struct SortedIndex<K> {
    name: String,
    entries: BTreeMap<IndexValue, HashSet<K>>,
}

impl<K: Clone + Eq + Hash> SortedIndex<K> {
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
    pub fn insert(&mut self, key: IndexValue, id: K) {
        self.entries.entry(key).or_default().insert(id);
    }

    /// Unmaps `key` from `id`, dropping the key once no id carries it.
    pub fn remove(&mut self, key: &IndexValue, id: &K) {
        if let Some(ids) = self.entries.get_mut(key) {
            ids.remove(id);
            if ids.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    /// Returns the ids mapped to `key`.
    pub fn get(&self, key: &IndexValue) -> HashSet<K> {
        self.entries.get(key).cloned().unwrap_or_default()
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

    /// Returns the ids of the smallest key strictly greater than `key`.
    pub fn after_first_greater(&self, key: &IndexValue) -> HashSet<K> {
        self.entries
            .range::<IndexValue, _>((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .map(|(_, ids)| ids.clone())
            .unwrap_or_default()
    }

    /// Returns the ids of every key accepted by `accept`. Linear in the
    /// number of distinct keys.
    pub fn keys_matching(&self, accept: &dyn Fn(&IndexValue) -> bool) -> HashSet<K> {
        self.entries
            .iter()
            .filter(|(key, _)| accept(key))
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }

    /// Returns every id present in the index.
    pub fn ids(&self) -> HashSet<K> {
        self.entries.values().flatten().cloned().collect()
    }

    /// Returns the number of distinct keys.
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
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }
}

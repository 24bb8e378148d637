//! Hash-based equality index.

use crate::value::IndexValue;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Point-lookup index: projected value to the set of ids carrying it.
///
/// Range and containment operators are served by a linear scan over the
/// distinct keys; an access path that needs those cheaply should be a
/// [`SortedIndex`](crate::SortedIndex) instead.
#[derive(Debug)]
pub struct EqualIndex<K> {
    name: String,
    entries: HashMap<IndexValue, HashSet<K>>,
}

impl<K: Clone + Eq + Hash> EqualIndex<K> {
    /// Creates an empty index.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: HashMap::new(),
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

    /// Returns the ids of every key accepted by `accept`. Linear in the
    /// number of distinct keys.
    pub fn keys_matching(&self, accept: &dyn Fn(&IndexValue) -> bool) -> HashSet<K> {
        self.entries
            .iter()
            .filter(|(key, _)| accept(key))
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }

    /// Returns the smallest key strictly greater than `key`, by linear
    /// scan; a hash index keeps no key order to exploit.
    pub fn first_key_after(&self, key: &IndexValue) -> Option<IndexValue> {
        self.entries.keys().filter(|k| *k > key).min().cloned()
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
}

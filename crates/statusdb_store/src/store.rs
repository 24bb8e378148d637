//! The indexed concurrent entity map.

use crate::error::{StoreError, StoreResult};
use crate::index::{IndexKind, IndexSlot, ValuesFn};
use crate::lock::StoreLock;
use crate::predicate::{Operator, Predicate};
use crate::value::IndexValue;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

/// Declares the indexes and query fields of an [`IndexedMap`].
///
/// Index names are unique; declaring one twice is a programming error.
/// A `query_field` registers a plain accessor for predicate evaluation
/// without an index: lookups on it fall back to a full scan.
pub struct IndexedMapBuilder<K, T> {
    slots: Vec<IndexSlot<K, T>>,
    accessors: HashMap<String, ValuesFn<T>>,
}

impl<K: Clone + Eq + Hash, T> IndexedMapBuilder<K, T> {
    /// Creates a builder with no indexes.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            accessors: HashMap::new(),
        }
    }

    /// Declares a hash index over the values of `keys`.
    #[must_use]
    pub fn equal_index(
        self,
        name: &str,
        keys: impl Fn(&T) -> BTreeSet<IndexValue> + Send + Sync + 'static,
    ) -> Self {
        self.push(IndexSlot::equal(name, Box::new(keys)))
    }

    /// Declares an ordered index over the values of `keys`.
    #[must_use]
    pub fn sorted_index(
        self,
        name: &str,
        keys: impl Fn(&T) -> BTreeSet<IndexValue> + Send + Sync + 'static,
    ) -> Self {
        self.push(IndexSlot::sorted(name, Box::new(keys)))
    }

    /// Declares an ordered unique index over the values of `keys`.
    #[must_use]
    pub fn unique_sorted_index(
        self,
        name: &str,
        keys: impl Fn(&T) -> BTreeSet<IndexValue> + Send + Sync + 'static,
    ) -> Self {
        self.push(IndexSlot::unique_sorted(name, Box::new(keys)))
    }

    /// Declares an ordered unique index over a single `i64` key.
    #[must_use]
    pub fn unique_scalar_index(
        self,
        name: &str,
        key: impl Fn(&T) -> i64 + Send + Sync + 'static,
    ) -> Self {
        self.push(IndexSlot::unique_scalar(name, Box::new(key)))
    }

    /// Declares a fixed-cardinality ordinal index over a single ordinal.
    #[must_use]
    pub fn enum_index(
        self,
        name: &str,
        cardinality: usize,
        key: impl Fn(&T) -> usize + Send + Sync + 'static,
    ) -> Self {
        self.push(IndexSlot::fixed_enum(name, cardinality, Box::new(key)))
    }

    /// Registers a scan-only accessor for predicate evaluation on an
    /// unindexed field.
    #[must_use]
    pub fn query_field(
        mut self,
        name: &str,
        accessor: impl Fn(&T) -> BTreeSet<IndexValue> + Send + Sync + 'static,
    ) -> Self {
        let replaced = self
            .accessors
            .insert(name.to_string(), Box::new(accessor));
        assert!(replaced.is_none(), "query field {name} already declared");
        self
    }

    /// Builds the map.
    pub fn build(self) -> IndexedMap<K, T> {
        let by_name = self
            .slots
            .iter()
            .enumerate()
            .map(|(position, slot)| (slot.name().to_string(), position))
            .collect();
        IndexedMap {
            entries: DashMap::new(),
            slots: self.slots,
            by_name,
            accessors: self.accessors,
            lock: StoreLock::new(),
        }
    }

    fn push(mut self, slot: IndexSlot<K, T>) -> Self {
        assert!(
            !self.slots.iter().any(|s| s.name() == slot.name()),
            "index {} already declared",
            slot.name()
        );
        self.slots.push(slot);
        self
    }
}

impl<K: Clone + Eq + Hash, T> Default for IndexedMapBuilder<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A keyed map of immutable entity snapshots with named secondary
/// indexes.
///
/// The map owns the canonical id-to-entity table; every index is derived
/// from it by a projection declared at build time. All mutation goes
/// through [`compute`](Self::compute) or [`remove`](Self::remove), which
/// keep the indexes in lockstep. Values are handed out as `Arc`
/// snapshots and never mutated in place.
///
/// Concurrency: `compute` is atomic per id. A mutation updates each
/// covering index in its own critical section, so a reader may observe
/// one index already updated and another not yet; a reader needing a
/// stable multi-index view runs inside [`transaction`](Self::transaction),
/// which keeps all other threads' mutations out.
///
/// Mutation closures must not call back into the same map; the entry
/// they run under is locked.
pub struct IndexedMap<K, T> {
    entries: DashMap<K, Arc<T>>,
    slots: Vec<IndexSlot<K, T>>,
    by_name: HashMap<String, usize>,
    accessors: HashMap<String, ValuesFn<T>>,
    lock: StoreLock,
}

impl<K, T> IndexedMap<K, T>
where
    K: Clone + Eq + Hash,
{
    /// Atomically inserts or updates the entity at `id`.
    ///
    /// When `id` is absent, `insert` runs; `None` means decline and leave
    /// the map untouched. When `id` is present, `update` runs on the
    /// current snapshot; returning `None` or the same `Arc` declines the
    /// update. A declined operation touches no index.
    ///
    /// Returns the newly stored snapshot, or `None` when the operation
    /// declined.
    pub fn compute<I, U>(&self, id: K, insert: I, update: U) -> Option<Arc<T>>
    where
        I: FnOnce() -> Option<T>,
        U: FnOnce(&Arc<T>) -> Option<Arc<T>>,
    {
        let _shared = self.lock.shared();
        match self.entries.entry(id) {
            Entry::Occupied(mut occupied) => {
                let old = Arc::clone(occupied.get());
                match update(&old) {
                    Some(new) if !Arc::ptr_eq(&new, &old) => {
                        let id = occupied.key().clone();
                        occupied.insert(Arc::clone(&new));
                        for slot in &self.slots {
                            slot.replace(&id, &old, &new);
                        }
                        Some(new)
                    }
                    _ => None,
                }
            }
            Entry::Vacant(vacant) => match insert() {
                Some(value) => {
                    let id = vacant.key().clone();
                    let new = Arc::new(value);
                    let _stored = vacant.insert(Arc::clone(&new));
                    for slot in &self.slots {
                        slot.append(&id, &new);
                    }
                    Some(new)
                }
                None => None,
            },
        }
    }

    /// Removes the entity at `id` from the map and every index.
    pub fn remove(&self, id: &K) -> Option<Arc<T>> {
        let _shared = self.lock.shared();
        match self.entries.entry(id.clone()) {
            Entry::Occupied(occupied) => {
                let old = Arc::clone(occupied.get());
                for slot in &self.slots {
                    slot.remove(occupied.key(), &old);
                }
                occupied.remove();
                Some(old)
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Returns the current snapshot at `id`.
    pub fn get(&self, id: &K) -> Option<Arc<T>> {
        self.entries.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns `true` if `id` is present.
    pub fn contains(&self, id: &K) -> bool {
        self.entries.contains_key(id)
    }

    /// Runs `body` while holding the store's exclusive lock, keeping all
    /// other threads' mutations out. Re-entrant: the body may open nested
    /// transactions and issue its own mutations.
    pub fn transaction<R>(&self, body: impl FnOnce() -> R) -> R {
        let _exclusive = self.lock.exclusive();
        body()
    }

    /// Evaluates one predicate to a set of ids.
    ///
    /// Dispatches to the index covering `predicate.field` when one
    /// exists; otherwise scans over the registered accessor. The two
    /// paths agree: `Nc` and `Ni` complement against the canonical id
    /// set, so entities projecting no value at all are matched.
    pub fn key_set(&self, predicate: &Predicate, limit: Option<usize>) -> StoreResult<HashSet<K>> {
        let hits = if let Some(slot) = self.named_slot(&predicate.field) {
            match predicate.op {
                Operator::Eq => slot.get(&predicate.value),
                Operator::Ne => slot.keys_matching(&|key| *key != predicate.value),
                Operator::Lt => slot.before(&predicate.value),
                Operator::Gt => slot.after(&predicate.value),
                Operator::Ge => slot.after_equal(&predicate.value),
                Operator::Co => slot.keys_matching(&|key| key.contains_text(&predicate.value)),
                Operator::Nc => {
                    let containing =
                        slot.keys_matching(&|key| key.contains_text(&predicate.value));
                    self.ids_except(&containing)
                }
                Operator::Ni => {
                    let equal = slot.get(&predicate.value);
                    self.ids_except(&equal)
                }
            }
        } else if let Some(accessor) = self.accessors.get(&predicate.field) {
            self.entries
                .iter()
                .filter(|entry| predicate.matches(&accessor(entry.value())))
                .map(|entry| entry.key().clone())
                .collect()
        } else {
            return Err(StoreError::unknown_field(&predicate.field));
        };
        Ok(truncate(hits, limit))
    }

    /// Evaluates a conjunction of predicates by intersecting their id
    /// sets. No predicates means every id.
    pub fn query(&self, predicates: &[Predicate], limit: Option<usize>) -> StoreResult<HashSet<K>> {
        if predicates.is_empty() {
            return Ok(truncate(self.ids(), limit));
        }
        let mut result: Option<HashSet<K>> = None;
        for predicate in predicates {
            let hits = self.key_set(predicate, None)?;
            result = Some(match result.take() {
                None => hits,
                Some(acc) => acc.intersection(&hits).cloned().collect(),
            });
            if result.as_ref().is_some_and(HashSet::is_empty) {
                break;
            }
        }
        Ok(truncate(result.unwrap_or_default(), limit))
    }

    /// Point lookup on a named index.
    pub fn index_get(&self, index: &str, key: &IndexValue) -> StoreResult<HashSet<K>> {
        Ok(self.slot(index)?.get(key))
    }

    /// Ids with an index key strictly less than `key`.
    pub fn index_before(&self, index: &str, key: &IndexValue) -> StoreResult<HashSet<K>> {
        Ok(self.slot(index)?.before(key))
    }

    /// Ids with an index key greater than or equal to `key`.
    pub fn index_after_equal(&self, index: &str, key: &IndexValue) -> StoreResult<HashSet<K>> {
        Ok(self.slot(index)?.after_equal(key))
    }

    /// Ids with an index key strictly greater than `key`.
    pub fn index_after(&self, index: &str, key: &IndexValue) -> StoreResult<HashSet<K>> {
        Ok(self.slot(index)?.after(key))
    }

    /// Ids at the smallest index key strictly greater than `key`.
    pub fn index_after_first_greater(
        &self,
        index: &str,
        key: &IndexValue,
    ) -> StoreResult<HashSet<K>> {
        Ok(self.slot(index)?.after_first_greater(key))
    }

    /// Returns the declared kind of a named index.
    pub fn index_kind(&self, index: &str) -> StoreResult<IndexKind> {
        Ok(self.slot(index)?.kind())
    }

    /// Returns every id in the map.
    pub fn ids(&self) -> HashSet<K> {
        self.entries
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Returns the number of entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the map holds no entities.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn slot(&self, name: &str) -> StoreResult<&IndexSlot<K, T>> {
        self.named_slot(name)
            .ok_or_else(|| StoreError::unknown_index(name))
    }

    fn named_slot(&self, name: &str) -> Option<&IndexSlot<K, T>> {
        self.by_name.get(name).map(|&position| &self.slots[position])
    }

    fn ids_except(&self, excluded: &HashSet<K>) -> HashSet<K> {
        self.entries
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|id| !excluded.contains(id))
            .collect()
    }
}

fn truncate<K: Eq + Hash>(set: HashSet<K>, limit: Option<usize>) -> HashSet<K> {
    match limit {
        Some(limit) if set.len() > limit => set.into_iter().take(limit).collect(),
        _ => set,
    }
}

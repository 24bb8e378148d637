//! Secondary index variants and the slot wrapper the store keeps them in.
//!
//! Indexes are internal access paths: they are declared once on the
//! [`IndexedMapBuilder`](crate::IndexedMapBuilder), maintained by the
//! store on every mutation, and never read or written outside it. Each
//! index serializes its own mutations behind a slot mutex; one entity
//! mutation updates each covering index in a single critical section, so
//! readers of that index never observe the entity half-moved.

mod enum_map;
mod equal;
mod sorted;
mod unique;

pub use enum_map::EnumIndex;
pub use equal::EqualIndex;
pub use sorted::SortedIndex;
pub use unique::{UniqueScalarIndex, UniqueSortedIndex};

use crate::value::IndexValue;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::hash::Hash;

/// The shape of a declared index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// Hash map for point lookups.
    Equal,
    /// Ordered map for range lookups.
    Sorted,
    /// Ordered map, one id per key.
    UniqueSorted,
    /// Ordered map over raw `i64` keys, one id per key.
    UniqueScalar,
    /// Ordinal buckets of a fixed-cardinality enum.
    FixedEnum,
}

pub(crate) type ValuesFn<T> = Box<dyn Fn(&T) -> BTreeSet<IndexValue> + Send + Sync>;
pub(crate) type ScalarFn<T> = Box<dyn Fn(&T) -> i64 + Send + Sync>;
pub(crate) type OrdinalFn<T> = Box<dyn Fn(&T) -> usize + Send + Sync>;

/// A backend paired with the projection that feeds it. The pairing is
/// fixed at construction, so key and backend types always agree.
enum SlotState<K, T> {
    Equal {
        keys: ValuesFn<T>,
        index: EqualIndex<K>,
    },
    Sorted {
        keys: ValuesFn<T>,
        index: SortedIndex<K>,
    },
    UniqueSorted {
        keys: ValuesFn<T>,
        index: UniqueSortedIndex<K>,
    },
    UniqueScalar {
        key: ScalarFn<T>,
        index: UniqueScalarIndex<K>,
    },
    FixedEnum {
        key: OrdinalFn<T>,
        index: EnumIndex<K>,
    },
}

/// One named index registered on a store.
///
/// Probes against `UniqueScalar` and `FixedEnum` slots must use the
/// matching [`IndexValue`] variant (`Int`, `Ordinal`); other variants
/// yield empty results.
pub(crate) struct IndexSlot<K, T> {
    name: String,
    kind: IndexKind,
    state: Mutex<SlotState<K, T>>,
}

impl<K: Clone + Eq + Hash, T> IndexSlot<K, T> {
    pub(crate) fn equal(name: impl Into<String>, keys: ValuesFn<T>) -> Self {
        let name = name.into();
        Self {
            kind: IndexKind::Equal,
            state: Mutex::new(SlotState::Equal {
                keys,
                index: EqualIndex::new(name.clone()),
            }),
            name,
        }
    }

    pub(crate) fn sorted(name: impl Into<String>, keys: ValuesFn<T>) -> Self {
        let name = name.into();
        Self {
            kind: IndexKind::Sorted,
            state: Mutex::new(SlotState::Sorted {
                keys,
                index: SortedIndex::new(name.clone()),
            }),
            name,
        }
    }

    pub(crate) fn unique_sorted(name: impl Into<String>, keys: ValuesFn<T>) -> Self {
        let name = name.into();
        Self {
            kind: IndexKind::UniqueSorted,
            state: Mutex::new(SlotState::UniqueSorted {
                keys,
                index: UniqueSortedIndex::new(name.clone()),
            }),
            name,
        }
    }

    pub(crate) fn unique_scalar(name: impl Into<String>, key: ScalarFn<T>) -> Self {
        let name = name.into();
        Self {
            kind: IndexKind::UniqueScalar,
            state: Mutex::new(SlotState::UniqueScalar {
                key,
                index: UniqueScalarIndex::new(name.clone()),
            }),
            name,
        }
    }

    pub(crate) fn fixed_enum(
        name: impl Into<String>,
        cardinality: usize,
        key: OrdinalFn<T>,
    ) -> Self {
        let name = name.into();
        Self {
            kind: IndexKind::FixedEnum,
            state: Mutex::new(SlotState::FixedEnum {
                key,
                index: EnumIndex::new(name.clone(), cardinality),
            }),
            name,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn kind(&self) -> IndexKind {
        self.kind
    }

    pub(crate) fn append(&self, id: &K, entity: &T) {
        self.state.lock().append(id, entity);
    }

    pub(crate) fn remove(&self, id: &K, entity: &T) {
        self.state.lock().remove(id, entity);
    }

    /// Swaps the projections of `old` for those of `new` in one critical
    /// section, so readers of this index never see the id absent.
    pub(crate) fn replace(&self, id: &K, old: &T, new: &T) {
        let mut state = self.state.lock();
        state.remove(id, old);
        state.append(id, new);
    }

    pub(crate) fn get(&self, probe: &IndexValue) -> HashSet<K> {
        self.state.lock().get(probe)
    }

    pub(crate) fn before(&self, probe: &IndexValue) -> HashSet<K> {
        self.state.lock().before(probe)
    }

    pub(crate) fn after_equal(&self, probe: &IndexValue) -> HashSet<K> {
        self.state.lock().after_equal(probe)
    }

    pub(crate) fn after(&self, probe: &IndexValue) -> HashSet<K> {
        self.state.lock().after(probe)
    }

    pub(crate) fn after_first_greater(&self, probe: &IndexValue) -> HashSet<K> {
        self.state.lock().after_first_greater(probe)
    }

    pub(crate) fn keys_matching(&self, accept: &dyn Fn(&IndexValue) -> bool) -> HashSet<K> {
        self.state.lock().keys_matching(accept)
    }

    pub(crate) fn ids(&self) -> HashSet<K> {
        self.state.lock().ids()
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().len()
    }
}

impl<K: Clone + Eq + Hash, T> SlotState<K, T> {
    fn append(&mut self, id: &K, entity: &T) {
        match self {
            Self::Equal { keys, index } => {
                for key in keys(entity) {
                    index.insert(key, id.clone());
                }
            }
            Self::Sorted { keys, index } => {
                for key in keys(entity) {
                    index.insert(key, id.clone());
                }
            }
            Self::UniqueSorted { keys, index } => {
                for key in keys(entity) {
                    index.insert(key, id.clone());
                }
            }
            Self::UniqueScalar { key, index } => index.insert(key(entity), id.clone()),
            Self::FixedEnum { key, index } => index.insert(key(entity), id.clone()),
        }
    }

    fn remove(&mut self, id: &K, entity: &T) {
        match self {
            Self::Equal { keys, index } => {
                for key in keys(entity) {
                    index.remove(&key, id);
                }
            }
            Self::Sorted { keys, index } => {
                for key in keys(entity) {
                    index.remove(&key, id);
                }
            }
            Self::UniqueSorted { keys, index } => {
                for key in keys(entity) {
                    index.remove(&key);
                }
            }
            Self::UniqueScalar { key, index } => index.remove(key(entity)),
            Self::FixedEnum { key, index } => index.remove(key(entity), id),
        }
    }

    fn get(&self, probe: &IndexValue) -> HashSet<K> {
        match self {
            Self::Equal { index, .. } => index.get(probe),
            Self::Sorted { index, .. } => index.get(probe),
            Self::UniqueSorted { index, .. } => index.get(probe).into_iter().collect(),
            Self::UniqueScalar { index, .. } => match probe {
                IndexValue::Int(key) => index.get(*key).into_iter().collect(),
                _ => HashSet::new(),
            },
            Self::FixedEnum { index, .. } => match probe {
                IndexValue::Ordinal(ordinal) => index.get(*ordinal),
                _ => HashSet::new(),
            },
        }
    }

    fn before(&self, probe: &IndexValue) -> HashSet<K> {
        match self {
            Self::Equal { index, .. } => index.keys_matching(&|key| key < probe),
            Self::Sorted { index, .. } => index.before(probe),
            Self::UniqueSorted { index, .. } => index.before(probe),
            Self::UniqueScalar { index, .. } => match probe {
                IndexValue::Int(key) => index.before(*key),
                _ => HashSet::new(),
            },
            Self::FixedEnum { index, .. } => match probe {
                IndexValue::Ordinal(ordinal) => index.before(*ordinal),
                _ => HashSet::new(),
            },
        }
    }

    fn after_equal(&self, probe: &IndexValue) -> HashSet<K> {
        match self {
            Self::Equal { index, .. } => index.keys_matching(&|key| key >= probe),
            Self::Sorted { index, .. } => index.after_equal(probe),
            Self::UniqueSorted { index, .. } => index.after_equal(probe),
            Self::UniqueScalar { index, .. } => match probe {
                IndexValue::Int(key) => index.after_equal(*key),
                _ => HashSet::new(),
            },
            Self::FixedEnum { index, .. } => match probe {
                IndexValue::Ordinal(ordinal) => index.after_equal(*ordinal),
                _ => HashSet::new(),
            },
        }
    }

    fn after(&self, probe: &IndexValue) -> HashSet<K> {
        match self {
            Self::Equal { index, .. } => index.keys_matching(&|key| key > probe),
            Self::Sorted { index, .. } => index.after(probe),
            Self::UniqueSorted { index, .. } => index.after(probe),
            Self::UniqueScalar { index, .. } => match probe {
                IndexValue::Int(key) => index.after(*key),
                _ => HashSet::new(),
            },
            Self::FixedEnum { index, .. } => match probe {
                IndexValue::Ordinal(ordinal) => index.after(*ordinal),
                _ => HashSet::new(),
            },
        }
    }

    fn after_first_greater(&self, probe: &IndexValue) -> HashSet<K> {
        match self {
            Self::Equal { index, .. } => index
                .first_key_after(probe)
                .map(|key| index.get(&key))
                .unwrap_or_default(),
            Self::Sorted { index, .. } => index.after_first_greater(probe),
            Self::UniqueSorted { index, .. } => {
                index.after_first_greater(probe).into_iter().collect()
            }
            Self::UniqueScalar { index, .. } => match probe {
                IndexValue::Int(key) => index.after_first_greater(*key).into_iter().collect(),
                _ => HashSet::new(),
            },
            Self::FixedEnum { index, .. } => match probe {
                IndexValue::Ordinal(ordinal) => index.after_first_greater(*ordinal),
                _ => HashSet::new(),
            },
        }
    }

    fn keys_matching(&self, accept: &dyn Fn(&IndexValue) -> bool) -> HashSet<K> {
        match self {
            Self::Equal { index, .. } => index.keys_matching(accept),
            Self::Sorted { index, .. } => index.keys_matching(accept),
            Self::UniqueSorted { index, .. } => index.keys_matching(accept),
            Self::UniqueScalar { index, .. } => index.keys_matching(accept),
            Self::FixedEnum { index, .. } => index.keys_matching(accept),
        }
    }

    fn ids(&self) -> HashSet<K> {
        match self {
            Self::Equal { index, .. } => index.ids(),
            Self::Sorted { index, .. } => index.ids(),
            Self::UniqueSorted { index, .. } => index.ids(),
            Self::UniqueScalar { index, .. } => index.ids(),
            Self::FixedEnum { index, .. } => index.ids(),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Equal { index, .. } => index.len(),
            Self::Sorted { index, .. } => index.len(),
            Self::UniqueSorted { index, .. } => index.len(),
            Self::UniqueScalar { index, .. } => index.len(),
            Self::FixedEnum { index, .. } => index.len(),
        }
    }
}

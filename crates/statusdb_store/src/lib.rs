//! # StatusDB Store
//!
//! Indexed concurrent entity map for StatusDB.
//!
//! This crate provides the generic storage layer the entity services are
//! built on: a keyed map of immutable entity snapshots plus a registry of
//! named secondary indexes kept in lockstep with every mutation.
//!
//! ## Design Principles
//!
//! - The map owns entity values; callers only ever see `Arc` snapshots
//! - All mutation goes through [`IndexedMap::compute`], which is atomic
//!   per id and updates every index as a unit
//! - Indexes are internal access paths, declared once at build time and
//!   never mutated outside the store
//! - Query predicates degrade to a full scan over registered field
//!   accessors when no index covers the field
//!
//! ## Index Variants
//!
//! - [`EqualIndex`] - O(1) point lookup by projected value
//! - [`SortedIndex`] - ordered map supporting range queries
//! - [`UniqueSortedIndex`] - ordered, one id per key, loud on collision
//! - [`UniqueScalarIndex`] - ordered over `i64`, one id per key (versions)
//! - [`EnumIndex`] - fixed-cardinality ordinal buckets (severities)
//!
//! ## Example
//!
//! ```rust
//! use std::collections::BTreeSet;
//! use statusdb_store::{IndexedMapBuilder, IndexValue, Predicate};
//!
//! struct Row {
//!     id: u32,
//!     name: String,
//! }
//!
//! let store = IndexedMapBuilder::new()
//!     .equal_index("name", |row: &Row| {
//!         BTreeSet::from([IndexValue::str(&row.name)])
//!     })
//!     .build();
//!
//! store.compute(1u32, || Some(Row { id: 1, name: "db".into() }), |_| None);
//! let hits = store
//!     .key_set(&Predicate::equal("name", IndexValue::str("db")), None)
//!     .unwrap();
//! assert!(hits.contains(&1));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod index;
mod lock;
mod predicate;
mod store;
mod value;

pub use error::{StoreError, StoreResult};
pub use index::{EnumIndex, EqualIndex, IndexKind, SortedIndex, UniqueScalarIndex, UniqueSortedIndex};
pub use lock::{ExclusiveGuard, SharedGuard, StoreLock};
pub use predicate::{Operator, Predicate};
pub use store::{IndexedMap, IndexedMapBuilder};
pub use value::IndexValue;

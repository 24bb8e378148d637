//! Common metadata carried by every replicated entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statusdb_store::IndexValue;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::Hash;

/// Builds the `key=value` pair projection of a field map.
pub(crate) fn pairs_of(fields: &BTreeMap<String, String>) -> BTreeSet<IndexValue> {
    fields
        .iter()
        .map(|(key, value)| IndexValue::pair(key.clone(), value.clone()))
        .collect()
}

/// Bookkeeping shared by [`crate::Event`] and [`crate::Item`].
///
/// `version` and the three timestamps are owned by the service that
/// stores the entity; callers supply `source`, `source_key`, `fields`,
/// and optionally `from_history` and `deleted_on`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    /// Node-local modification counter, unique per service.
    pub version: i64,

    /// Producer that emitted the entity.
    pub source: String,

    /// Producer-scoped key, used for producer sweeps.
    pub source_key: String,

    /// Free-form attributes; drive filter matching and field queries.
    pub fields: BTreeMap<String, String>,

    /// Names of the nodes that have already seen this revision.
    pub from_history: BTreeSet<String>,

    /// When the entity was first stored.
    pub created_on: DateTime<Utc>,

    /// When the stored content last changed.
    pub updated_on: DateTime<Utc>,

    /// Soft-delete marker; `Some` makes the entity a tombstone.
    pub deleted_on: Option<DateTime<Utc>>,
}

impl Meta {
    /// Creates metadata for a new entity from `source` with `source_key`.
    pub fn new(source: impl Into<String>, source_key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            version: 0,
            source: source.into(),
            source_key: source_key.into(),
            fields: BTreeMap::new(),
            from_history: BTreeSet::new(),
            created_on: now,
            updated_on: now,
            deleted_on: None,
        }
    }

    /// Whether this entity is a tombstone.
    pub const fn is_deleted(&self) -> bool {
        self.deleted_on.is_some()
    }

    /// The `key=value` index projection of [`Meta::fields`].
    pub fn field_pairs(&self) -> BTreeSet<IndexValue> {
        pairs_of(&self.fields)
    }

    /// Compares the caller-supplied content of two revisions.
    ///
    /// Version, timestamps, and `from_history` are excluded: they
    /// describe the revision, not the content. Deletion is compared
    /// by presence so that replicated tombstones with differing
    /// timestamps still count as the same revision.
    pub fn same_content(&self, other: &Meta) -> bool {
        self.source == other.source
            && self.source_key == other.source_key
            && self.fields == other.fields
            && self.deleted_on.is_some() == other.deleted_on.is_some()
    }
}

/// A replicated entity managed by an [`crate::EntityService`].
pub trait Entity: Clone + Send + Sync + 'static {
    /// Primary key type.
    type Id: Clone + Eq + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// The entity's primary key.
    fn id(&self) -> &Self::Id;

    /// Shared metadata.
    fn meta(&self) -> &Meta;

    /// Mutable shared metadata.
    fn meta_mut(&mut self) -> &mut Meta;

    /// Whether `incoming` carries the same content as this revision.
    ///
    /// Used to suppress no-op writes: when true, the stored revision
    /// keeps its version and timestamps.
    fn same_content(&self, incoming: &Self) -> bool;
}

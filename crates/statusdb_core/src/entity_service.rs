//! The generic storage service shared by events and items.
//!
//! An [`EntityService`] owns one [`IndexedMap`] plus the write
//! discipline every entity type shares: version allocation, no-op
//! suppression, `from_history` tagging, soft deletion, producer
//! sweeps, replication slices, and change notices.

use crate::config::CoreConfig;
use crate::entity::Entity;
use crate::error::CoreResult;
use crate::history::{ChangeNotice, ChangeQueue};
use chrono::{DateTime, Utc};
use statusdb_store::{IndexValue, IndexedMap, IndexedMapBuilder, Operator, Predicate};
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

pub(crate) const INDEX_VERSION: &str = "version";
pub(crate) const INDEX_SOURCE: &str = "source";
pub(crate) const INDEX_SOURCE_KEY: &str = "sourceKey";
pub(crate) const INDEX_DELETED_ON: &str = "deletedOn";
pub(crate) const INDEX_FIELDS: &str = "fields";
pub(crate) const FIELD_FROM_HISTORY: &str = "fromHistory";

/// Versioned storage for one entity type.
///
/// Every entity gets the standard indexes `version`, `source`,
/// `sourceKey`, `deletedOn`, and `fields`, plus a `fromHistory` scan
/// accessor; callers add type-specific indexes through the builder
/// they pass in.
///
/// Writes are per-id atomic. A write whose content matches the stored
/// revision is suppressed entirely: no version, no timestamp change,
/// no change notice.
pub struct EntityService<T: Entity> {
    store: IndexedMap<T::Id, T>,
    node_name: String,
    versions: AtomicI64,
    changes: ChangeQueue<ChangeNotice<T::Id>>,
}

impl<T: Entity> EntityService<T> {
    /// Creates a service around `builder`, adding the standard indexes.
    pub fn new(config: &CoreConfig, builder: IndexedMapBuilder<T::Id, T>) -> Self {
        let store = builder
            .unique_scalar_index(INDEX_VERSION, |entity: &T| entity.meta().version)
            .equal_index(INDEX_SOURCE, |entity: &T| {
                BTreeSet::from([IndexValue::str(entity.meta().source.clone())])
            })
            .equal_index(INDEX_SOURCE_KEY, |entity: &T| {
                BTreeSet::from([IndexValue::str(entity.meta().source_key.clone())])
            })
            .sorted_index(INDEX_DELETED_ON, |entity: &T| {
                entity
                    .meta()
                    .deleted_on
                    .into_iter()
                    .map(IndexValue::time)
                    .collect()
            })
            .equal_index(INDEX_FIELDS, |entity: &T| entity.meta().field_pairs())
            .query_field(FIELD_FROM_HISTORY, |entity: &T| {
                entity
                    .meta()
                    .from_history
                    .iter()
                    .cloned()
                    .map(IndexValue::str)
                    .collect()
            })
            .build();
        Self {
            store,
            node_name: config.node_name.clone(),
            versions: AtomicI64::new(1),
            changes: ChangeQueue::new(config.history_capacity, config.history_batch_limit),
        }
    }

    /// The node name stamped into `from_history`.
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Allocates the next version.
    fn next_version(&self) -> i64 {
        self.versions.fetch_add(1, Ordering::Relaxed)
    }

    /// The underlying indexed map, for type-specific lookups.
    pub(crate) fn store(&self) -> &IndexedMap<T::Id, T> {
        &self.store
    }

    /// Stores `incoming` unless the stored revision has the same
    /// content.
    ///
    /// On insert the incoming timestamps are kept (replicated rows
    /// carry their origin's `created_on`); on update `created_on` is
    /// preserved from the stored revision. Both arms allocate a fresh
    /// version, stamp `updated_on`, and tag this node into
    /// `from_history`. The hooks run last and adjust type-specific
    /// state; `on_update` sees the previous revision.
    ///
    /// Returns the stored snapshot, or `None` when suppressed.
    pub fn add_or_update_with(
        &self,
        incoming: T,
        on_insert: impl FnOnce(&mut T),
        on_update: impl FnOnce(&mut T, &T),
    ) -> Option<Arc<T>> {
        let id = incoming.id().clone();
        let now = Utc::now();
        let stored = self.store.compute(
            id.clone(),
            || {
                let mut row = incoming.clone();
                let meta = row.meta_mut();
                meta.version = self.next_version();
                meta.from_history.insert(self.node_name.clone());
                meta.updated_on = now;
                on_insert(&mut row);
                Some(row)
            },
            |old| {
                if old.same_content(&incoming) {
                    return None;
                }
                let mut row = incoming.clone();
                let meta = row.meta_mut();
                meta.version = self.next_version();
                meta.from_history.insert(self.node_name.clone());
                meta.created_on = old.meta().created_on;
                meta.updated_on = now;
                on_update(&mut row, old);
                Some(Arc::new(row))
            },
        );
        if stored.is_some() {
            self.changes.push(ChangeNotice::updated(id));
        }
        stored
    }

    /// Soft-deletes the entity at `id`.
    ///
    /// The tombstone keeps the stored content, takes a fresh version
    /// with `deleted_on` and `updated_on` stamped, and resets
    /// `from_history` to this node so peers pull the deletion. Already
    /// deleted or missing ids are left untouched.
    pub fn delete_by_id_with(
        &self,
        id: &T::Id,
        adjust: impl FnOnce(&mut T),
    ) -> Option<Arc<T>> {
        let now = Utc::now();
        let stored = self.store.compute(
            id.clone(),
            || None,
            |old| {
                if old.meta().is_deleted() {
                    return None;
                }
                let mut row = (**old).clone();
                let meta = row.meta_mut();
                meta.version = self.next_version();
                meta.from_history = BTreeSet::from([self.node_name.clone()]);
                meta.updated_on = now;
                meta.deleted_on = Some(now);
                adjust(&mut row);
                Some(Arc::new(row))
            },
        );
        if stored.is_some() {
            self.changes.push(ChangeNotice::updated(id.clone()));
        }
        stored
    }

    /// Soft-deletes everything from `source` whose `source_key` is not
    /// in `keep`.
    ///
    /// Runs inside a store transaction so the candidate set cannot
    /// shift between the index read and the deletions.
    pub fn delete_by_source_and_source_key_not_with(
        &self,
        source: &str,
        keep: &BTreeSet<String>,
        adjust: impl Fn(&mut T),
    ) -> CoreResult<Vec<Arc<T>>> {
        self.store.transaction(|| {
            let mut ids = self
                .store
                .index_get(INDEX_SOURCE, &IndexValue::str(source))?;
            for key in keep {
                for kept in self
                    .store
                    .index_get(INDEX_SOURCE_KEY, &IndexValue::str(key.clone()))?
                {
                    ids.remove(&kept);
                }
            }
            Ok(ids
                .iter()
                .filter_map(|id| self.delete_by_id_with(id, &adjust))
                .collect())
        })
    }

    /// Rewrites the entity at `id` with recomputed derived state.
    ///
    /// `rebuild` sees the current revision and returns the adjusted
    /// row, or `None` to decline. A persisted row takes a fresh
    /// version with `from_history` reset to this node (derived state
    /// is new local information) but keeps both timestamps: a
    /// recompute is not a content update.
    pub(crate) fn rewrite_derived(
        &self,
        id: &T::Id,
        rebuild: impl FnOnce(&Arc<T>) -> Option<T>,
    ) -> Option<Arc<T>> {
        let stored = self.store.compute(
            id.clone(),
            || None,
            |old| {
                rebuild(old).map(|mut row| {
                    let meta = row.meta_mut();
                    meta.version = self.next_version();
                    meta.from_history = BTreeSet::from([self.node_name.clone()]);
                    Arc::new(row)
                })
            },
        );
        if stored.is_some() {
            self.changes.push(ChangeNotice::updated(id.clone()));
        }
        stored
    }

    /// Physically removes tombstones deleted before `older_than`.
    ///
    /// Removal is final: no new tombstone is synthesized, and the
    /// change notice carries [`crate::ChangeKind::Removed`].
    pub fn sweep_tombstones(&self, older_than: DateTime<Utc>) -> CoreResult<Vec<Arc<T>>> {
        self.store.transaction(|| {
            let ids = self
                .store
                .index_before(INDEX_DELETED_ON, &IndexValue::time(older_than))?;
            let mut removed = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(row) = self.store.remove(&id) {
                    self.changes.push(ChangeNotice::removed(id));
                    removed.push(row);
                }
            }
            Ok(removed)
        })
    }

    /// The stored revision at `id`.
    pub fn find_by_id(&self, id: &T::Id) -> Option<Arc<T>> {
        self.store.get(id)
    }

    /// The stored revisions for `ids`, skipping missing ones.
    pub fn find_by_ids<'a>(&self, ids: impl IntoIterator<Item = &'a T::Id>) -> Vec<Arc<T>>
    where
        T::Id: 'a,
    {
        ids.into_iter().filter_map(|id| self.store.get(id)).collect()
    }

    /// Entities matching every predicate.
    pub fn query(&self, predicates: &[Predicate], limit: Option<usize>) -> CoreResult<Vec<Arc<T>>> {
        let ids = self.store.query(predicates, limit)?;
        Ok(ids.iter().filter_map(|id| self.store.get(id)).collect())
    }

    /// Entities carrying every `key=value` field in `fields`.
    pub fn find_by_fields<'a>(
        &self,
        fields: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> CoreResult<Vec<Arc<T>>> {
        let predicates: Vec<Predicate> = fields
            .into_iter()
            .map(|(key, value)| Predicate::equal(INDEX_FIELDS, IndexValue::pair(key, value)))
            .collect();
        if predicates.is_empty() {
            return Ok(Vec::new());
        }
        self.query(&predicates, None)
    }

    /// Entities above `after_version` not yet seen by `exclude_node`,
    /// lowest versions first.
    ///
    /// Exclusion is exact `from_history` membership, so a puller named
    /// `node1` still receives rows tagged only with `node10`.
    pub fn replication_slice(
        &self,
        after_version: i64,
        exclude_node: &str,
        limit: Option<usize>,
    ) -> CoreResult<Vec<Arc<T>>> {
        let predicates = [
            Predicate::new(INDEX_VERSION, Operator::Gt, IndexValue::int(after_version)),
            Predicate::new(
                FIELD_FROM_HISTORY,
                Operator::Ni,
                IndexValue::str(exclude_node),
            ),
        ];
        let ids = self.store.query(&predicates, None)?;
        Ok(self.rows_by_version(ids, limit))
    }

    /// Entities at or above `version`, lowest versions first. Used by
    /// the history exporter for catch-up scans.
    pub fn find_from_version(
        &self,
        version: i64,
        limit: Option<usize>,
    ) -> CoreResult<Vec<Arc<T>>> {
        let ids = self
            .store
            .index_after_equal(INDEX_VERSION, &IndexValue::int(version))?;
        Ok(self.rows_by_version(ids, limit))
    }

    fn rows_by_version(&self, ids: HashSet<T::Id>, limit: Option<usize>) -> Vec<Arc<T>> {
        let mut rows: Vec<Arc<T>> = ids.iter().filter_map(|id| self.store.get(id)).collect();
        rows.sort_by_key(|row| row.meta().version);
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        rows
    }

    /// Drains buffered change notices in bounded batches.
    pub fn poll_changes(&self, consumer: impl FnMut(Vec<ChangeNotice<T::Id>>)) {
        self.changes.poll(consumer);
    }

    /// Every stored id.
    pub fn ids(&self) -> HashSet<T::Id> {
        self.store.ids()
    }

    /// Number of stored entities, tombstones included.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::history::ChangeKind;
    use crate::status::BaseStatus;

    fn service() -> EntityService<Event> {
        let config = CoreConfig::new().node_name("node1");
        EntityService::new(&config, IndexedMapBuilder::new())
    }

    fn put(service: &EntityService<Event>, event: Event) -> Arc<Event> {
        service
            .add_or_update_with(event, |_| {}, |_, _| {})
            .expect("write should not be suppressed")
    }

    fn drain(service: &EntityService<Event>) -> Vec<ChangeNotice<String>> {
        let mut notices = Vec::new();
        service.poll_changes(|batch| notices.extend(batch));
        notices
    }

    #[test]
    fn unchanged_content_is_suppressed() {
        let service = service();
        let stored = put(&service, Event::new("e1", "zabbix", "k1").field("host", "db1"));
        assert_eq!(stored.meta.version, 1);
        drain(&service);

        let mut replay = Event::new("e1", "zabbix", "k1").field("host", "db1");
        replay.meta.version = 99;
        assert!(service.add_or_update_with(replay, |_| {}, |_, _| {}).is_none());

        let current = service.find_by_id(&"e1".to_owned()).unwrap();
        assert_eq!(current.meta.version, 1);
        assert_eq!(current.meta.updated_on, stored.meta.updated_on);
        assert!(drain(&service).is_empty());
    }

    #[test]
    fn updates_bump_versions_and_keep_created_on() {
        let service = service();
        let first = put(&service, Event::new("e1", "zabbix", "k1"));
        let second = put(
            &service,
            Event::new("e1", "zabbix", "k1").status(BaseStatus::Major),
        );
        assert_eq!(second.meta.version, 2);
        assert_eq!(second.meta.created_on, first.meta.created_on);
        assert!(second.meta.from_history.contains("node1"));
    }

    #[test]
    fn history_merges_on_update() {
        let service = service();
        let mut incoming = Event::new("e1", "peer-origin", "k1");
        incoming.meta.from_history.insert("node7".to_owned());
        let stored = put(&service, incoming);
        assert!(stored.meta.from_history.contains("node7"));
        assert!(stored.meta.from_history.contains("node1"));
    }

    #[test]
    fn delete_is_idempotent_and_resets_history() {
        let service = service();
        let mut incoming = Event::new("e1", "zabbix", "k1");
        incoming.meta.from_history.insert("node7".to_owned());
        put(&service, incoming);

        let tombstone = service.delete_by_id_with(&"e1".to_owned(), |_| {}).unwrap();
        assert!(tombstone.meta.is_deleted());
        assert_eq!(tombstone.meta.version, 2);
        assert_eq!(
            tombstone.meta.from_history,
            BTreeSet::from(["node1".to_owned()])
        );

        assert!(service.delete_by_id_with(&"e1".to_owned(), |_| {}).is_none());
        assert!(service.delete_by_id_with(&"ghost".to_owned(), |_| {}).is_none());
    }

    #[test]
    fn producer_sweep_keeps_listed_keys() {
        let service = service();
        put(&service, Event::new("e1", "zabbix", "k1"));
        put(&service, Event::new("e2", "zabbix", "k2"));
        put(&service, Event::new("e3", "nagios", "k3"));

        let deleted = service
            .delete_by_source_and_source_key_not_with(
                "zabbix",
                &BTreeSet::from(["k1".to_owned()]),
                |_| {},
            )
            .unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].id, "e2");
        assert!(!service.find_by_id(&"e1".to_owned()).unwrap().meta.is_deleted());
        assert!(!service.find_by_id(&"e3".to_owned()).unwrap().meta.is_deleted());
    }

    #[test]
    fn tombstone_sweep_removes_only_old_tombstones() {
        let service = service();
        put(&service, Event::new("live", "zabbix", "k1"));
        put(&service, Event::new("gone", "zabbix", "k2"));
        service.delete_by_id_with(&"gone".to_owned(), |_| {});
        drain(&service);

        let removed = service
            .sweep_tombstones(Utc::now() + chrono::Duration::seconds(1))
            .unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, "gone");
        assert!(service.find_by_id(&"gone".to_owned()).is_none());
        assert!(service.find_by_id(&"live".to_owned()).is_some());

        let notices = drain(&service);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, ChangeKind::Removed);

        // Fresh tombstones survive the same sweep cutoff.
        service.delete_by_id_with(&"live".to_owned(), |_| {});
        let removed = service
            .sweep_tombstones(Utc::now() - chrono::Duration::seconds(60))
            .unwrap();
        assert!(removed.is_empty());
    }

    #[test]
    fn replication_slice_orders_and_excludes() {
        let service = service();
        for key in ["a", "b", "c", "d"] {
            put(&service, Event::new(key, "zabbix", key));
        }
        let mut tagged = Event::new("b", "zabbix", "b").status(BaseStatus::Warning);
        tagged.meta.from_history.insert("node9".to_owned());
        put(&service, tagged);

        let slice = service.replication_slice(0, "node9", None).unwrap();
        let ids: Vec<&str> = slice.iter().map(|event| event.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "d"]);

        let limited = service.replication_slice(0, "node9", Some(2)).unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].id, "a");

        // A node whose name shares a prefix is still excluded exactly.
        let for_prefix = service.replication_slice(0, "node", None).unwrap();
        assert_eq!(for_prefix.len(), 4);
    }

    #[test]
    fn catch_up_scans_start_at_the_requested_version() {
        let service = service();
        for key in ["a", "b", "c"] {
            put(&service, Event::new(key, "zabbix", key));
        }
        let rows = service.find_from_version(2, None).unwrap();
        let versions: Vec<i64> = rows.iter().map(|row| row.meta.version).collect();
        assert_eq!(versions, vec![2, 3]);
    }

    #[test]
    fn field_lookups_require_every_pair() {
        let service = service();
        put(
            &service,
            Event::new("e1", "zabbix", "k1")
                .field("host", "db1")
                .field("role", "primary"),
        );
        put(&service, Event::new("e2", "zabbix", "k2").field("host", "db1"));

        let both = service
            .find_by_fields([("host", "db1"), ("role", "primary")])
            .unwrap();
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].id, "e1");

        let none = service.find_by_fields([]).unwrap();
        assert!(none.is_empty());
    }
}

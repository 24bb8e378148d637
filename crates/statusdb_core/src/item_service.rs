//! Storage service for items and hierarchy lookups.

use crate::aggregate::AggregateEventsStatus;
use crate::config::CoreConfig;
use crate::entity_service::EntityService;
use crate::error::CoreResult;
use crate::event::EventId;
use crate::history::ChangeNotice;
use crate::item::{Item, ItemId};
use crate::status::BaseStatus;
use chrono::{DateTime, Utc};
use statusdb_store::{IndexValue, IndexedMapBuilder, Predicate};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

pub(crate) const INDEX_STATUS: &str = "status";
pub(crate) const INDEX_NAME: &str = "name";
const INDEX_FILTER_FIELDS: &str = "filterFields";
const INDEX_PARENTS: &str = "parents";
const INDEX_EVENTS: &str = "events";
const INDEX_DECAY: &str = "decay";

/// Stores items and resolves hierarchy and filter lookups.
///
/// Beyond the standard indexes this adds `status` (enum), `name`,
/// `filterFields` (every filter's required `key=value` pairs, for
/// candidate lookup), `parents` (reverse child links), `events`
/// (active attached event ids), and `decay` (expiry instants of
/// frozen attached events).
pub struct ItemService {
    entities: EntityService<Item>,
}

impl ItemService {
    /// Creates an empty item store.
    pub fn new(config: &CoreConfig) -> Self {
        let grace = config.event_grace;
        let builder = IndexedMapBuilder::new()
            .enum_index(INDEX_STATUS, BaseStatus::CARDINALITY, |item: &Item| {
                item.status.ordinal()
            })
            .equal_index(INDEX_NAME, |item: &Item| {
                BTreeSet::from([IndexValue::str(item.name.clone())])
            })
            .equal_index(INDEX_FILTER_FIELDS, Item::filter_pair_values)
            .equal_index(INDEX_PARENTS, |item: &Item| {
                item.children
                    .iter()
                    .cloned()
                    .map(IndexValue::str)
                    .collect()
            })
            .equal_index(INDEX_EVENTS, |item: &Item| {
                item.events_status.active_id_values()
            })
            .sorted_index(INDEX_DECAY, move |item: &Item| {
                item.events_status.decay_deadline_values(grace)
            });
        Self {
            entities: EntityService::new(config, builder),
        }
    }

    /// Stores `incoming` unless its content matches the stored
    /// revision.
    ///
    /// Derived state is protected: an insert starts at
    /// [`BaseStatus::Clear`] (keeping an incoming event map as a
    /// replication seed), and an update carries the stored status and
    /// event map forward. The engine recomputes both afterwards.
    pub fn add_or_update(&self, incoming: Item) -> Option<Arc<Item>> {
        self.entities.add_or_update_with(
            incoming,
            |row| row.status = BaseStatus::Clear,
            |row, old| {
                row.status = old.status;
                row.events_status = old.events_status.clone();
            },
        )
    }

    /// Soft-deletes the item at `id`.
    ///
    /// The tombstone drops to [`BaseStatus::Clear`] and detaches its
    /// events; rules, filters, and children are kept for peers that
    /// still need the content.
    pub fn delete_by_id(&self, id: &ItemId) -> Option<Arc<Item>> {
        self.entities.delete_by_id_with(id, |row| {
            row.status = BaseStatus::Clear;
            row.events_status = AggregateEventsStatus::default();
        })
    }

    /// Soft-deletes every item from `source` whose key is not kept.
    pub fn delete_by_source_and_source_key_not(
        &self,
        source: &str,
        keep: &BTreeSet<String>,
    ) -> CoreResult<Vec<Arc<Item>>> {
        self.entities
            .delete_by_source_and_source_key_not_with(source, keep, |row| {
                row.status = BaseStatus::Clear;
                row.events_status = AggregateEventsStatus::default();
            })
    }

    /// Physically removes tombstones deleted before `older_than`.
    pub fn sweep_tombstones(&self, older_than: DateTime<Utc>) -> CoreResult<Vec<Arc<Item>>> {
        self.entities.sweep_tombstones(older_than)
    }

    /// Persists the outcome of a recompute.
    ///
    /// `rebuild` sees the current revision and returns the adjusted
    /// row, or `None` to leave the item untouched.
    pub(crate) fn recompute_persist(
        &self,
        id: &ItemId,
        rebuild: impl FnOnce(&Arc<Item>) -> Option<Item>,
    ) -> Option<Arc<Item>> {
        self.entities.rewrite_derived(id, rebuild)
    }

    /// The stored item at `id`.
    pub fn find_by_id(&self, id: &ItemId) -> Option<Arc<Item>> {
        self.entities.find_by_id(id)
    }

    /// The stored items for `ids`, skipping missing ones.
    pub fn find_by_ids<'a>(&self, ids: impl IntoIterator<Item = &'a ItemId>) -> Vec<Arc<Item>> {
        self.entities.find_by_ids(ids)
    }

    /// Non-deleted items listing `id` as a child.
    pub fn find_parents(&self, id: &ItemId) -> CoreResult<Vec<Arc<Item>>> {
        let ids = self
            .entities
            .store()
            .index_get(INDEX_PARENTS, &IndexValue::str(id.clone()))?;
        Ok(self
            .entities
            .find_by_ids(ids.iter())
            .into_iter()
            .filter(|item| !item.meta.is_deleted())
            .collect())
    }

    /// The stored children of `item`, deleted ones included.
    pub fn find_children(&self, item: &Item) -> Vec<Arc<Item>> {
        self.entities.find_by_ids(item.children.iter())
    }

    /// Ids of items whose event map actively references `event_id`.
    pub fn find_referencing(&self, event_id: &EventId) -> CoreResult<HashSet<ItemId>> {
        Ok(self
            .entities
            .store()
            .index_get(INDEX_EVENTS, &IndexValue::str(event_id.clone()))?)
    }

    /// Non-deleted items with a filter satisfied by `fields`.
    ///
    /// Candidates come from the `filterFields` index, so only filters
    /// with at least one required pair can ever match.
    pub fn find_matching_items(
        &self,
        fields: &BTreeMap<String, String>,
    ) -> CoreResult<Vec<Arc<Item>>> {
        let mut candidates: HashSet<ItemId> = HashSet::new();
        for (key, value) in fields {
            let ids = self
                .entities
                .store()
                .index_get(INDEX_FILTER_FIELDS, &IndexValue::pair(key.clone(), value.clone()))?;
            candidates.extend(ids);
        }
        Ok(self
            .entities
            .find_by_ids(candidates.iter())
            .into_iter()
            .filter(|item| !item.meta.is_deleted())
            .filter(|item| item.find_matching_filter(fields).is_some())
            .collect())
    }

    /// Ids of items holding a frozen event whose grace window ends
    /// before `now`.
    pub fn expired_decay_ids(&self, now: DateTime<Utc>) -> CoreResult<HashSet<ItemId>> {
        Ok(self
            .entities
            .store()
            .index_before(INDEX_DECAY, &IndexValue::time(now))?)
    }

    /// The non-deleted subtree rooted at `root`, root first.
    ///
    /// The traversal refuses to re-enter an id already visited and
    /// logs the cycle instead of failing.
    pub fn find_subtree(&self, root: &ItemId) -> Vec<Arc<Item>> {
        let mut visited: HashSet<ItemId> = HashSet::new();
        let mut result = Vec::new();
        let mut pending = VecDeque::from([root.clone()]);
        while let Some(id) = pending.pop_front() {
            if !visited.insert(id.clone()) {
                tracing::warn!(item = %id, "cycle detected in item hierarchy");
                continue;
            }
            let Some(item) = self.entities.find_by_id(&id) else {
                continue;
            };
            if item.meta.is_deleted() {
                continue;
            }
            pending.extend(item.children.iter().cloned());
            result.push(item);
        }
        result
    }

    /// Items matching every predicate.
    pub fn query(
        &self,
        predicates: &[Predicate],
        limit: Option<usize>,
    ) -> CoreResult<Vec<Arc<Item>>> {
        self.entities.query(predicates, limit)
    }

    /// Items above `after_version` not yet seen by `exclude_node`.
    pub fn replication_slice(
        &self,
        after_version: i64,
        exclude_node: &str,
        limit: Option<usize>,
    ) -> CoreResult<Vec<Arc<Item>>> {
        self.entities
            .replication_slice(after_version, exclude_node, limit)
    }

    /// Items at or above `version`, for catch-up scans.
    pub fn find_from_version(
        &self,
        version: i64,
        limit: Option<usize>,
    ) -> CoreResult<Vec<Arc<Item>>> {
        self.entities.find_from_version(version, limit)
    }

    /// Drains buffered change notices in bounded batches.
    pub fn poll_changes(&self, consumer: impl FnMut(Vec<ChangeNotice<ItemId>>)) {
        self.entities.poll_changes(consumer);
    }

    /// Number of stored items, tombstones included.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether no items are stored.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemFilter;
    use chrono::Duration;

    const GRACE: Duration = Duration::seconds(300);

    fn service() -> ItemService {
        ItemService::new(&CoreConfig::new().node_name("node1"))
    }

    fn attach(service: &ItemService, item_id: &str, event_id: &str, status: BaseStatus) {
        service
            .recompute_persist(&item_id.to_owned(), |old| {
                let mut row = (**old).clone();
                row.events_status =
                    row.events_status
                        .with_event(event_id, status, Utc::now(), GRACE);
                row.status = status;
                Some(row)
            })
            .expect("attach should persist");
    }

    #[test]
    fn inserts_start_clear_and_updates_keep_derived_state() {
        let service = service();
        let mut seeded = Item::new("a", "cfg", "a");
        seeded.status = BaseStatus::Critical;
        let stored = service.add_or_update(seeded).unwrap();
        assert_eq!(stored.status, BaseStatus::Clear);

        attach(&service, "a", "ev1", BaseStatus::Major);

        let edited = service
            .add_or_update(Item::new("a", "cfg", "a").name("renamed"))
            .unwrap();
        assert_eq!(edited.status, BaseStatus::Major);
        assert!(edited.events_status.get("ev1").is_some());
    }

    #[test]
    fn recompute_persist_resets_history_but_not_updated_on() {
        let service = service();
        let mut incoming = Item::new("a", "cfg", "a");
        incoming.meta.from_history.insert("node7".to_owned());
        let stored = service.add_or_update(incoming).unwrap();

        let recomputed = service
            .recompute_persist(&"a".to_owned(), |old| {
                let mut row = (**old).clone();
                row.status = BaseStatus::Warning;
                Some(row)
            })
            .unwrap();
        assert_eq!(recomputed.meta.version, stored.meta.version + 1);
        assert_eq!(recomputed.meta.updated_on, stored.meta.updated_on);
        assert_eq!(
            recomputed.meta.from_history,
            BTreeSet::from(["node1".to_owned()])
        );

        let declined = service.recompute_persist(&"a".to_owned(), |_| None);
        assert!(declined.is_none());
    }

    #[test]
    fn parents_exclude_deleted_items() {
        let service = service();
        service.add_or_update(Item::new("child", "cfg", "child"));
        service.add_or_update(Item::new("p1", "cfg", "p1").child("child"));
        service.add_or_update(Item::new("p2", "cfg", "p2").child("child"));

        service.delete_by_id(&"p2".to_owned());

        let parents = service.find_parents(&"child".to_owned()).unwrap();
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].id, "p1");
    }

    #[test]
    fn matching_requires_every_filter_field() {
        let service = service();
        service.add_or_update(Item::new("svc", "cfg", "svc").filter(
            "f1",
            ItemFilter::new()
                .equal_field("host", "db1")
                .equal_field("sev", "5"),
        ));

        let mut partial = BTreeMap::new();
        partial.insert("host".to_owned(), "db1".to_owned());
        assert!(service.find_matching_items(&partial).unwrap().is_empty());

        let mut full = partial.clone();
        full.insert("sev".to_owned(), "5".to_owned());
        full.insert("extra".to_owned(), "ignored".to_owned());
        let matched = service.find_matching_items(&full).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "svc");

        service.delete_by_id(&"svc".to_owned());
        assert!(service.find_matching_items(&full).unwrap().is_empty());
    }

    #[test]
    fn referencing_follows_active_entries_only() {
        let service = service();
        service.add_or_update(Item::new("svc", "cfg", "svc"));
        attach(&service, "svc", "ev1", BaseStatus::Major);

        let referencing = service.find_referencing(&"ev1".to_owned()).unwrap();
        assert!(referencing.contains("svc"));

        let frozen_at = Utc::now();
        service.recompute_persist(&"svc".to_owned(), |old| {
            let mut row = (**old).clone();
            row.events_status = row.events_status.without_event("ev1", frozen_at, GRACE);
            Some(row)
        });

        assert!(service.find_referencing(&"ev1".to_owned()).unwrap().is_empty());

        // The frozen entry surfaces for decay once its window elapses.
        let before = service.expired_decay_ids(frozen_at + GRACE).unwrap();
        assert!(before.is_empty());
        let after = service
            .expired_decay_ids(frozen_at + GRACE + Duration::seconds(1))
            .unwrap();
        assert!(after.contains("svc"));
    }

    #[test]
    fn subtree_tolerates_cycles() {
        let service = service();
        service.add_or_update(Item::new("a", "cfg", "a").child("b"));
        service.add_or_update(Item::new("b", "cfg", "b").child("a"));

        let subtree = service.find_subtree(&"a".to_owned());
        let ids: Vec<&str> = subtree.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn name_queries_support_contains() {
        let service = service();
        service.add_or_update(Item::new("a", "cfg", "a").name("payments-core"));
        service.add_or_update(Item::new("b", "cfg", "b").name("billing"));

        let matched = service
            .query(&[Predicate::from_param(INDEX_NAME, "co:PAY")], None)
            .unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "a");
    }
}

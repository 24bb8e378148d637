//! Storage service for events.

use crate::config::CoreConfig;
use crate::entity_service::EntityService;
use crate::error::CoreResult;
use crate::event::{Event, EventId};
use crate::history::ChangeNotice;
use crate::status::BaseStatus;
use chrono::{DateTime, Utc};
use statusdb_store::{IndexValue, IndexedMapBuilder, Predicate};
use std::collections::BTreeSet;
use std::sync::Arc;

pub(crate) const INDEX_STATUS: &str = "status";
pub(crate) const INDEX_ENDS_ON: &str = "endsOn";
pub(crate) const INDEX_NODE: &str = "node";
const FIELD_SUMMARY: &str = "summary";

/// Stores events and applies event-specific write rules.
///
/// Beyond the standard indexes this adds `status` (enum), `endsOn`
/// (sorted, for expiry sweeps) and `node` (equal), plus `summary` as a
/// scan-only query field.
pub struct EventService {
    entities: EntityService<Event>,
}

impl EventService {
    /// Creates an empty event store.
    pub fn new(config: &CoreConfig) -> Self {
        let builder = IndexedMapBuilder::new()
            .enum_index(INDEX_STATUS, BaseStatus::CARDINALITY, |event: &Event| {
                event.status.ordinal()
            })
            .sorted_index(INDEX_ENDS_ON, Event::ends_on_values)
            .equal_index(INDEX_NODE, |event: &Event| {
                BTreeSet::from([IndexValue::str(event.node.clone())])
            })
            .query_field(FIELD_SUMMARY, |event: &Event| {
                BTreeSet::from([IndexValue::str(event.summary.clone())])
            });
        Self {
            entities: EntityService::new(config, builder),
        }
    }

    /// Stores `incoming` unless its content matches the stored
    /// revision.
    ///
    /// An incoming deletion marker is restamped with local time, so
    /// replicated tombstones age on this node's clock.
    pub fn add_or_update(&self, incoming: Event) -> Option<Arc<Event>> {
        let restamp = |row: &mut Event| {
            if row.meta.deleted_on.is_some() {
                row.meta.deleted_on = Some(Utc::now());
            }
        };
        self.entities
            .add_or_update_with(incoming, restamp, |row, _| restamp(row))
    }

    /// Soft-deletes the event at `id`, keeping its stored content.
    pub fn delete_by_id(&self, id: &EventId) -> Option<Arc<Event>> {
        self.entities.delete_by_id_with(id, |_| {})
    }

    /// Soft-deletes every event from `source` whose key is not kept.
    pub fn delete_by_source_and_source_key_not(
        &self,
        source: &str,
        keep: &BTreeSet<String>,
    ) -> CoreResult<Vec<Arc<Event>>> {
        self.entities
            .delete_by_source_and_source_key_not_with(source, keep, |_| {})
    }

    /// Soft-deletes events whose `ends_on` lies before `now`.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> CoreResult<Vec<Arc<Event>>> {
        let ids = self
            .entities
            .store()
            .index_before(INDEX_ENDS_ON, &IndexValue::time(now))?;
        Ok(ids
            .iter()
            .filter_map(|id| self.delete_by_id(id))
            .collect())
    }

    /// Physically removes tombstones deleted before `older_than`.
    pub fn sweep_tombstones(&self, older_than: DateTime<Utc>) -> CoreResult<Vec<Arc<Event>>> {
        self.entities.sweep_tombstones(older_than)
    }

    /// The stored event at `id`.
    pub fn find_by_id(&self, id: &EventId) -> Option<Arc<Event>> {
        self.entities.find_by_id(id)
    }

    /// The stored events for `ids`, skipping missing ones.
    pub fn find_by_ids<'a>(&self, ids: impl IntoIterator<Item = &'a EventId>) -> Vec<Arc<Event>> {
        self.entities.find_by_ids(ids)
    }

    /// Events matching every predicate.
    pub fn query(
        &self,
        predicates: &[Predicate],
        limit: Option<usize>,
    ) -> CoreResult<Vec<Arc<Event>>> {
        self.entities.query(predicates, limit)
    }

    /// Events above `after_version` not yet seen by `exclude_node`.
    pub fn replication_slice(
        &self,
        after_version: i64,
        exclude_node: &str,
        limit: Option<usize>,
    ) -> CoreResult<Vec<Arc<Event>>> {
        self.entities
            .replication_slice(after_version, exclude_node, limit)
    }

    /// Events at or above `version`, for catch-up scans.
    pub fn find_from_version(
        &self,
        version: i64,
        limit: Option<usize>,
    ) -> CoreResult<Vec<Arc<Event>>> {
        self.entities.find_from_version(version, limit)
    }

    /// Drains buffered change notices in bounded batches.
    pub fn poll_changes(&self, consumer: impl FnMut(Vec<ChangeNotice<EventId>>)) {
        self.entities.poll_changes(consumer);
    }

    /// Number of stored events, tombstones included.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether no events are stored.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statusdb_store::Operator;

    fn service() -> EventService {
        EventService::new(&CoreConfig::new().node_name("node1"))
    }

    #[test]
    fn incoming_deletions_are_restamped_locally() {
        let service = service();
        let mut incoming = Event::new("e1", "zabbix", "k1");
        let peer_stamp = Utc::now() - chrono::Duration::seconds(900);
        incoming.meta.deleted_on = Some(peer_stamp);

        let stored = service.add_or_update(incoming).unwrap();
        let local_stamp = stored.meta.deleted_on.unwrap();
        assert!(local_stamp > peer_stamp + chrono::Duration::seconds(600));
    }

    #[test]
    fn a_new_revision_resurrects_a_tombstone() {
        let service = service();
        service.add_or_update(Event::new("e1", "zabbix", "k1"));
        service.delete_by_id(&"e1".to_owned());

        let revived = service
            .add_or_update(Event::new("e1", "zabbix", "k1").status(BaseStatus::Major))
            .unwrap();
        assert!(!revived.meta.is_deleted());
        assert_eq!(revived.status, BaseStatus::Major);
    }

    #[test]
    fn expiry_sweep_deletes_overdue_events_only() {
        let service = service();
        let now = Utc::now();
        service.add_or_update(
            Event::new("overdue", "zabbix", "k1").ends_on(now - chrono::Duration::seconds(5)),
        );
        service.add_or_update(
            Event::new("pending", "zabbix", "k2").ends_on(now + chrono::Duration::seconds(60)),
        );
        service.add_or_update(Event::new("open-ended", "zabbix", "k3"));

        let expired = service.sweep_expired(now).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, "overdue");
        assert!(expired[0].meta.is_deleted());
        assert!(!service.find_by_id(&"pending".to_owned()).unwrap().meta.is_deleted());

        // Already swept: the tombstone does not expire again.
        assert!(service.sweep_expired(now).unwrap().is_empty());
    }

    #[test]
    fn status_range_queries_use_the_enum_index() {
        let service = service();
        service.add_or_update(Event::new("low", "zabbix", "k1").status(BaseStatus::Warning));
        service.add_or_update(Event::new("high", "zabbix", "k2").status(BaseStatus::Critical));

        let severe = service
            .query(
                &[Predicate::new(
                    INDEX_STATUS,
                    Operator::Ge,
                    BaseStatus::Major.into(),
                )],
                None,
            )
            .unwrap();
        assert_eq!(severe.len(), 1);
        assert_eq!(severe[0].id, "high");
    }

    #[test]
    fn node_lookups_hit_the_equal_index() {
        let service = service();
        service.add_or_update(Event::new("e1", "zabbix", "k1").node("db1"));
        service.add_or_update(Event::new("e2", "zabbix", "k2").node("web3"));

        let matched = service
            .query(&[Predicate::equal(INDEX_NODE, IndexValue::str("db1"))], None)
            .unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "e1");
    }

    #[test]
    fn summary_queries_fall_back_to_a_scan() {
        let service = service();
        service.add_or_update(Event::new("e1", "zabbix", "k1").summary("disk almost full"));
        service.add_or_update(Event::new("e2", "zabbix", "k2").summary("link flapping"));

        let matched = service
            .query(&[Predicate::from_param(FIELD_SUMMARY, "co:disk")], None)
            .unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "e1");
    }
}

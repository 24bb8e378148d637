//! The correlation engine: write entry points, recompute workers, and
//! status cascade.
//!
//! All mutation flows through the engine. Storage writes are applied
//! synchronously on the caller's thread; correlation work (attaching
//! events to items, rule evaluation, parent cascade) is enqueued as
//! per-item tasks and drained by a fixed worker pool. Delivery is
//! at-least-once and tasks are idempotent, so duplicate enqueues and
//! races with concurrent writers converge instead of corrupting.

use crate::aggregate::{AggregateEventsStatus, AggregateStatus};
use crate::config::CoreConfig;
use crate::error::CoreResult;
use crate::event::{Event, EventId};
use crate::event_service::EventService;
use crate::item::{Item, ItemId};
use crate::item_service::ItemService;
use crate::maintenance::Maintenance;
use crate::queue::{WorkQueue, WorkerPool};
use crate::status::BaseStatus;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Why an item is being recomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// A live event was stored; attach or detach it.
    EventChanged(EventId),
    /// An event was soft-deleted; freeze its contribution.
    EventRemoved(EventId),
    /// The item's own content changed.
    ItemChanged,
    /// A held status or frozen event reached its window's end.
    DecayElapsed,
    /// A child's status changed. `path` carries the ids already on
    /// this cascade, for cycle detection.
    Cascade {
        /// Items already recomputed along this chain.
        path: BTreeSet<ItemId>,
    },
}

/// One recompute request.
#[derive(Debug, Clone)]
pub struct Task {
    /// The item to recompute.
    pub item_id: ItemId,
    /// What happened.
    pub reason: Reason,
}

/// What a task means for the item's event map, resolved against the
/// event store before the item write begins.
enum MapOp {
    Attach(EventId, BaseStatus),
    Detach(EventId),
    Refresh,
}

pub(crate) struct EngineCore {
    pub(crate) config: CoreConfig,
    items: ItemService,
    events: EventService,
    queue: Arc<WorkQueue<Task>>,
    held: DashMap<ItemId, AggregateStatus>,
}

impl EngineCore {
    fn enqueue(&self, item_id: ItemId, reason: Reason) {
        self.queue.push(Task { item_id, reason });
    }

    fn add_or_update_event(&self, event: Event) -> CoreResult<Option<Arc<Event>>> {
        let stored = self.events.add_or_update(event);
        if let Some(stored) = &stored {
            self.react_to_event(stored)?;
        }
        Ok(stored)
    }

    /// Fans an event write out to the items it concerns.
    ///
    /// A live event targets both the items whose filters match it and
    /// the items still referencing it (the latter detach when the new
    /// revision no longer matches). A deletion targets referencing
    /// items only.
    fn react_to_event(&self, event: &Arc<Event>) -> CoreResult<()> {
        let referencing = self.items.find_referencing(&event.id)?;
        if event.meta.is_deleted() {
            for item_id in referencing {
                self.enqueue(item_id, Reason::EventRemoved(event.id.clone()));
            }
            return Ok(());
        }
        let mut targets = referencing;
        for item in self.items.find_matching_items(&event.meta.fields)? {
            targets.insert(item.id.clone());
        }
        for item_id in targets {
            self.enqueue(item_id, Reason::EventChanged(event.id.clone()));
        }
        Ok(())
    }

    fn delete_event(&self, id: &EventId) -> CoreResult<Option<Arc<Event>>> {
        let stored = self.events.delete_by_id(id);
        if let Some(stored) = &stored {
            self.react_to_event(stored)?;
        }
        Ok(stored)
    }

    fn delete_events_by_source_and_source_key_not(
        &self,
        source: &str,
        keep: &BTreeSet<String>,
    ) -> CoreResult<Vec<Arc<Event>>> {
        let deleted = self
            .events
            .delete_by_source_and_source_key_not(source, keep)?;
        for tombstone in &deleted {
            self.react_to_event(tombstone)?;
        }
        Ok(deleted)
    }

    fn add_or_update_item(&self, item: Item) -> CoreResult<Option<Arc<Item>>> {
        let stored = self.items.add_or_update(item);
        if let Some(stored) = &stored {
            self.react_to_item(stored)?;
        }
        Ok(stored)
    }

    /// Enqueues recompute for a written item; a deletion also wakes
    /// the parents, which lose the child from their rule inputs.
    fn react_to_item(&self, item: &Arc<Item>) -> CoreResult<()> {
        self.enqueue(item.id.clone(), Reason::ItemChanged);
        if item.meta.is_deleted() {
            for parent in self.items.find_parents(&item.id)? {
                self.enqueue(parent.id.clone(), Reason::ItemChanged);
            }
        }
        Ok(())
    }

    fn delete_item(&self, id: &ItemId) -> CoreResult<Option<Arc<Item>>> {
        let stored = self.items.delete_by_id(id);
        if let Some(stored) = &stored {
            self.react_to_item(stored)?;
        }
        Ok(stored)
    }

    fn delete_items_by_source_and_source_key_not(
        &self,
        source: &str,
        keep: &BTreeSet<String>,
    ) -> CoreResult<Vec<Arc<Item>>> {
        let deleted = self
            .items
            .delete_by_source_and_source_key_not(source, keep)?;
        for tombstone in &deleted {
            self.react_to_item(tombstone)?;
        }
        Ok(deleted)
    }

    /// Runs the periodic sweeps against `now`.
    pub(crate) fn run_maintenance(&self, now: DateTime<Utc>) -> CoreResult<()> {
        for tombstone in self.events.sweep_expired(now)? {
            self.react_to_event(&tombstone)?;
        }
        for item_id in self.items.expired_decay_ids(now)? {
            self.enqueue(item_id, Reason::DecayElapsed);
        }
        let decay = self.config.status_decay;
        let mut released = Vec::new();
        self.held.retain(|item_id, held| {
            if held.prune(now, decay) {
                released.push(item_id.clone());
            }
            !held.is_empty()
        });
        for item_id in released {
            self.enqueue(item_id, Reason::DecayElapsed);
        }
        let cutoff = now - self.config.tombstone_retention;
        for removed in self.items.sweep_tombstones(cutoff)? {
            self.held.remove(&removed.id);
            for parent in self.items.find_parents(&removed.id)? {
                self.enqueue(parent.id.clone(), Reason::ItemChanged);
            }
        }
        self.events.sweep_tombstones(cutoff)?;
        Ok(())
    }

    pub(crate) fn process(&self, task: Task) {
        if let Err(error) = self.recompute(&task) {
            tracing::error!(item = %task.item_id, %error, "recompute failed");
        }
    }

    /// Recomputes one item.
    ///
    /// The task's meaning for the event map is resolved against fresh
    /// snapshots first; the map adjustment itself is re-applied to the
    /// revision current at write time, so concurrent recomputes of the
    /// same item cannot lose each other's attachments. Child statuses
    /// are read outside the write; any staleness is healed by the
    /// losing writer's own cascade.
    fn recompute(&self, task: &Task) -> CoreResult<()> {
        let Some(snapshot) = self.items.find_by_id(&task.item_id) else {
            return Ok(());
        };
        if snapshot.meta.is_deleted() {
            return self.recompute_tombstone(task);
        }

        let now = Utc::now();
        let grace = self.config.event_grace;
        let op = match &task.reason {
            Reason::EventChanged(event_id) => match self.events.find_by_id(event_id) {
                Some(event) if !event.meta.is_deleted() => {
                    match snapshot.find_matching_filter(&event.meta.fields) {
                        Some(filter) => {
                            let contributed = if filter.using_result_status {
                                filter.result_status
                            } else {
                                event.status
                            };
                            MapOp::Attach(event_id.clone(), contributed)
                        }
                        None => MapOp::Detach(event_id.clone()),
                    }
                }
                _ => MapOp::Detach(event_id.clone()),
            },
            Reason::EventRemoved(event_id) => MapOp::Detach(event_id.clone()),
            Reason::ItemChanged | Reason::DecayElapsed | Reason::Cascade { .. } => MapOp::Refresh,
        };
        let children_status = self.status_by_children(&snapshot);

        let mut status_changed = false;
        let persisted = self.items.recompute_persist(&task.item_id, |old| {
            let map = match &op {
                MapOp::Attach(event_id, status) => {
                    old.events_status.with_event(event_id, *status, now, grace)
                }
                MapOp::Detach(event_id) => old.events_status.without_event(event_id, now, grace),
                MapOp::Refresh => old.events_status.pruned(now, grace),
            };
            let raw = map.max_status(now, grace).max(children_status);
            let effective = {
                let mut held = self.held.entry(old.id.clone()).or_default();
                let effective = raw.max(held.max_within(now, self.config.status_decay));
                if effective != old.status {
                    held.record(effective, now);
                }
                effective
            };
            if map == old.events_status && effective == old.status {
                return None;
            }
            status_changed = effective != old.status;
            let mut row = (**old).clone();
            row.events_status = map;
            row.status = effective;
            Some(row)
        });

        if persisted.is_some() && status_changed {
            self.cascade_parents(&task.item_id, &task.reason)?;
        }
        Ok(())
    }

    /// Drops a tombstone's derived state to its resting values.
    ///
    /// Needed for replicated tombstones, which arrive carrying the
    /// origin's status and event map.
    fn recompute_tombstone(&self, task: &Task) -> CoreResult<()> {
        self.held.remove(&task.item_id);
        let mut dropped = false;
        let persisted = self.items.recompute_persist(&task.item_id, |old| {
            if !old.meta.is_deleted() {
                return None;
            }
            if old.status == BaseStatus::Clear && old.events_status.is_empty() {
                return None;
            }
            dropped = old.status != BaseStatus::Clear;
            let mut row = (**old).clone();
            row.status = BaseStatus::Clear;
            row.events_status = AggregateEventsStatus::default();
            Some(row)
        });
        if persisted.is_some() && dropped {
            self.cascade_parents(&task.item_id, &task.reason)?;
        }
        Ok(())
    }

    /// Wakes the non-deleted parents of a changed item.
    ///
    /// The visited path travels with the cascade; a parent already on
    /// it means the hierarchy has a cycle, which is logged and cut
    /// rather than followed.
    fn cascade_parents(&self, item_id: &ItemId, reason: &Reason) -> CoreResult<()> {
        let mut path = match reason {
            Reason::Cascade { path } => path.clone(),
            _ => BTreeSet::new(),
        };
        path.insert(item_id.clone());
        for parent in self.items.find_parents(item_id)? {
            if path.contains(&parent.id) {
                tracing::warn!(from = %item_id, to = %parent.id, "cycle detected during status cascade");
                continue;
            }
            self.enqueue(parent.id.clone(), Reason::Cascade { path: path.clone() });
        }
        Ok(())
    }

    /// Status contributed by an item's children.
    fn status_by_children(&self, item: &Item) -> BaseStatus {
        if item.children.is_empty() {
            return BaseStatus::Clear;
        }
        let live: Vec<BaseStatus> = self
            .items
            .find_children(item)
            .iter()
            .filter(|child| !child.meta.is_deleted())
            .map(|child| child.status)
            .collect();
        if item.rules.is_empty() {
            return BaseStatus::max_of(live);
        }
        BaseStatus::max_of(
            item.rules
                .values()
                .map(|rule| rule.evaluate(&live, item.children.len())),
        )
    }

    fn find_subtree_events(&self, root: &ItemId) -> Vec<Arc<Event>> {
        let mut event_ids: BTreeSet<EventId> = BTreeSet::new();
        for item in self.items.find_subtree(root) {
            event_ids.extend(item.events_status.active_ids().cloned());
        }
        self.events.find_by_ids(event_ids.iter())
    }
}

/// The public face of the correlation engine.
///
/// Owns the item and event services, the recompute workers, and the
/// maintenance thread; dropping the engine stops both and lets
/// in-flight recomputes finish.
pub struct CorrelationEngine {
    core: Arc<EngineCore>,
    _workers: WorkerPool<Task>,
    _maintenance: Maintenance,
}

impl CorrelationEngine {
    /// Validates `config` and starts the engine.
    pub fn new(config: CoreConfig) -> CoreResult<Self> {
        config.validate()?;
        let queue = Arc::new(WorkQueue::new());
        let core = Arc::new(EngineCore {
            items: ItemService::new(&config),
            events: EventService::new(&config),
            queue: Arc::clone(&queue),
            held: DashMap::new(),
            config,
        });
        let worker_core = Arc::clone(&core);
        let workers = WorkerPool::spawn(
            "recompute",
            core.config.recompute_workers,
            queue,
            core.config.queue_poll_timeout,
            move |task| worker_core.process(task),
        );
        let maintenance = Maintenance::spawn(Arc::clone(&core));
        Ok(Self {
            core,
            _workers: workers,
            _maintenance: maintenance,
        })
    }

    /// Stores an event and fans out correlation work.
    pub fn add_or_update_event(&self, event: Event) -> CoreResult<Option<Arc<Event>>> {
        self.core.add_or_update_event(event)
    }

    /// Soft-deletes an event; referencing items freeze its status.
    pub fn delete_event(&self, id: &EventId) -> CoreResult<Option<Arc<Event>>> {
        self.core.delete_event(id)
    }

    /// Soft-deletes every event from `source` except the kept keys.
    pub fn delete_events_by_source_and_source_key_not(
        &self,
        source: &str,
        keep: &BTreeSet<String>,
    ) -> CoreResult<Vec<Arc<Event>>> {
        self.core
            .delete_events_by_source_and_source_key_not(source, keep)
    }

    /// Stores an item and enqueues its recompute.
    pub fn add_or_update_item(&self, item: Item) -> CoreResult<Option<Arc<Item>>> {
        self.core.add_or_update_item(item)
    }

    /// Soft-deletes an item; its parents recompute without it.
    pub fn delete_item(&self, id: &ItemId) -> CoreResult<Option<Arc<Item>>> {
        self.core.delete_item(id)
    }

    /// Soft-deletes every item from `source` except the kept keys.
    pub fn delete_items_by_source_and_source_key_not(
        &self,
        source: &str,
        keep: &BTreeSet<String>,
    ) -> CoreResult<Vec<Arc<Item>>> {
        self.core
            .delete_items_by_source_and_source_key_not(source, keep)
    }

    /// The item store, for reads and queries.
    pub fn items(&self) -> &ItemService {
        &self.core.items
    }

    /// The event store, for reads and queries.
    pub fn events(&self) -> &EventService {
        &self.core.events
    }

    /// Active events attached anywhere in the subtree rooted at `root`.
    pub fn find_subtree_events(&self, root: &ItemId) -> Vec<Arc<Event>> {
        self.core.find_subtree_events(root)
    }

    /// Runs the periodic sweeps once against `now`. The maintenance
    /// thread calls this with wall-clock time; tests may pass a
    /// synthetic instant.
    pub fn run_maintenance(&self, now: DateTime<Utc>) -> CoreResult<()> {
        self.core.run_maintenance(now)
    }

    /// Queued plus in-flight recompute tasks.
    pub fn pending_tasks(&self) -> usize {
        self.core.queue.pending()
    }

    /// Blocks until the recompute queue is fully drained, or `timeout`
    /// elapses. Returns whether quiescence was reached.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.core.queue.wait_idle(timeout)
    }

    /// The engine configuration.
    pub fn config(&self) -> &CoreConfig {
        &self.core.config
    }
}

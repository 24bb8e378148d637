//! Time-decayed status views.
//!
//! Two windows smooth flapping: resolved events keep contributing
//! their frozen status for a grace window, and an item's computed
//! status is held for a short decay window before it may drop.

use crate::event::EventId;
use crate::status::BaseStatus;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use statusdb_store::IndexValue;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// One event's contribution to an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStatusEntry {
    /// Contributed status: the event's own, or the matching filter's.
    pub status: BaseStatus,

    /// When the event stopped matching. `None` while active; a frozen
    /// entry keeps contributing until the grace window elapses.
    pub deleted_on: Option<DateTime<Utc>>,
}

/// The events attached to one item, active and recently resolved.
///
/// Rebuilds are pure: every method returns a new map, and a rebuild
/// that changes nothing compares equal to its input, which is what
/// suppresses no-op persists under replayed deliveries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateEventsStatus {
    entries: BTreeMap<EventId, EventStatusEntry>,
}

impl AggregateEventsStatus {
    /// The entry for `event_id`, if attached.
    pub fn get(&self, event_id: &str) -> Option<&EventStatusEntry> {
        self.entries.get(event_id)
    }

    /// Number of attached events, frozen entries included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no events are attached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids of entries that are still active.
    pub fn active_ids(&self) -> impl Iterator<Item = &EventId> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.deleted_on.is_none())
            .map(|(id, _)| id)
    }

    fn alive(entry: &EventStatusEntry, now: DateTime<Utc>, grace: Duration) -> bool {
        match entry.deleted_on {
            None => true,
            Some(frozen) => now < frozen + grace,
        }
    }

    /// Rebuild with `event_id` attached (or re-activated) at `status`.
    #[must_use]
    pub fn with_event(
        &self,
        event_id: &str,
        status: BaseStatus,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Self {
        let mut next = self.pruned(now, grace);
        next.entries.insert(
            event_id.to_owned(),
            EventStatusEntry {
                status,
                deleted_on: None,
            },
        );
        next
    }

    /// Rebuild with `event_id` frozen at its last status.
    ///
    /// Freezing an already-frozen entry keeps the original timestamp,
    /// so repeated deliveries of the same removal compare equal.
    #[must_use]
    pub fn without_event(&self, event_id: &str, now: DateTime<Utc>, grace: Duration) -> Self {
        let mut next = self.pruned(now, grace);
        if let Some(entry) = next.entries.get_mut(event_id) {
            if entry.deleted_on.is_none() {
                entry.deleted_on = Some(now);
            }
        }
        next
    }

    /// Rebuild without entries whose grace window has elapsed.
    #[must_use]
    pub fn pruned(&self, now: DateTime<Utc>, grace: Duration) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(_, entry)| Self::alive(entry, now, grace))
                .map(|(id, entry)| (id.clone(), entry.clone()))
                .collect(),
        }
    }

    /// Highest status among entries alive at `now`.
    pub fn max_status(&self, now: DateTime<Utc>, grace: Duration) -> BaseStatus {
        BaseStatus::max_of(
            self.entries
                .values()
                .filter(|entry| Self::alive(entry, now, grace))
                .map(|entry| entry.status),
        )
    }

    /// Index projection of active entry ids.
    pub(crate) fn active_id_values(&self) -> BTreeSet<IndexValue> {
        self.active_ids().map(|id| IndexValue::str(id.clone())).collect()
    }

    /// Index projection of frozen entries' expiry instants.
    pub(crate) fn decay_deadline_values(&self, grace: Duration) -> BTreeSet<IndexValue> {
        self.entries
            .values()
            .filter_map(|entry| entry.deleted_on)
            .map(|frozen| IndexValue::time(frozen + grace))
            .collect()
    }
}

/// Recent computed statuses of one item, one timestamp per level.
///
/// Lives beside the item store, not on the item: holding a status for
/// the decay window must not consume versions or replicate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateStatus {
    stamps: [Option<DateTime<Utc>>; BaseStatus::CARDINALITY],
}

impl AggregateStatus {
    /// Records that the item was computed at `status`.
    pub fn record(&mut self, status: BaseStatus, now: DateTime<Utc>) {
        self.stamps[status.ordinal()] = Some(now);
    }

    /// Highest status recorded within the decay window before `now`.
    pub fn max_within(&self, now: DateTime<Utc>, window: Duration) -> BaseStatus {
        BaseStatus::max_of(BaseStatus::ALL.into_iter().filter(|status| {
            self.stamps[status.ordinal()]
                .map(|seen| now < seen + window)
                .unwrap_or(false)
        }))
    }

    /// Drops stamps older than the decay window. Returns whether any
    /// stamp was dropped.
    pub fn prune(&mut self, now: DateTime<Utc>, window: Duration) -> bool {
        let mut changed = false;
        for stamp in &mut self.stamps {
            if let Some(seen) = *stamp {
                if now >= seen + window {
                    *stamp = None;
                    changed = true;
                }
            }
        }
        changed
    }

    /// Whether no stamps are held.
    pub fn is_empty(&self) -> bool {
        self.stamps.iter().all(Option::is_none)
    }
}

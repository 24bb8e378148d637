//! Events: externally produced status reports.

use crate::entity::{Entity, Meta};
use crate::status::BaseStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statusdb_store::IndexValue;
use std::collections::BTreeSet;

/// Primary key of an [`Event`].
pub type EventId = String;

/// What kind of report an event is.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    /// Producer did not say.
    #[default]
    Notset,
    /// Something is wrong.
    Problem,
    /// A previous problem went away.
    Resolution,
    /// Informational only.
    Information,
}

/// A status report from an external producer.
///
/// Events are immutable snapshots: producers re-post the whole event
/// to change it, and the service decides whether the content actually
/// differs. Matching against item filters uses [`Meta::fields`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Producer-assigned identifier.
    pub id: EventId,

    /// Shared entity metadata.
    #[serde(flatten)]
    pub meta: Meta,

    /// Report kind.
    #[serde(rename = "type")]
    pub event_type: EventType,

    /// Reported severity.
    pub status: BaseStatus,

    /// Host or component the report is about.
    pub node: String,

    /// Human-readable description.
    pub summary: String,

    /// When the event expires on its own, if ever.
    pub ends_on: Option<DateTime<Utc>>,
}

impl Event {
    /// Creates a clear, non-expiring event from `source` with `source_key`.
    pub fn new(
        id: impl Into<EventId>,
        source: impl Into<String>,
        source_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            meta: Meta::new(source, source_key),
            event_type: EventType::Notset,
            status: BaseStatus::Clear,
            node: String::new(),
            summary: String::new(),
            ends_on: None,
        }
    }

    /// Sets the report kind.
    #[must_use]
    pub const fn event_type(mut self, kind: EventType) -> Self {
        self.event_type = kind;
        self
    }

    /// Sets the reported severity.
    #[must_use]
    pub const fn status(mut self, status: BaseStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the node the report is about.
    #[must_use]
    pub fn node(mut self, node: impl Into<String>) -> Self {
        self.node = node.into();
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Sets the expiry instant.
    #[must_use]
    pub const fn ends_on(mut self, instant: DateTime<Utc>) -> Self {
        self.ends_on = Some(instant);
        self
    }

    /// Adds a field used for filter matching.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.fields.insert(key.into(), value.into());
        self
    }

    /// Marks the incoming event as deleted.
    #[must_use]
    pub fn deleted(mut self) -> Self {
        self.meta.deleted_on = Some(Utc::now());
        self
    }

    /// The expiry projection for the `endsOn` index.
    pub(crate) fn ends_on_values(&self) -> BTreeSet<IndexValue> {
        self.ends_on.into_iter().map(IndexValue::time).collect()
    }
}

impl Entity for Event {
    type Id = EventId;

    fn id(&self) -> &EventId {
        &self.id
    }

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    fn same_content(&self, incoming: &Self) -> bool {
        self.meta.same_content(&incoming.meta)
            && self.event_type == incoming.event_type
            && self.status == incoming.status
            && self.node == incoming.node
            && self.summary == incoming.summary
            && self.ends_on == incoming.ends_on
    }
}

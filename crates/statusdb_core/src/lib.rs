//! # StatusDB Core
//!
//! Event correlation engine for StatusDB.
//!
//! This crate ties the indexed entity stores together into a running
//! engine: events stream in from producers, filters attach them to the
//! items they concern, and rules roll child statuses up the item
//! hierarchy. Every write is versioned and idempotent so nodes can
//! exchange entities and converge on the same state.
//!
//! ## Design Principles
//!
//! - Writes are synchronous and cheap; correlation runs on a small
//!   worker pool fed by an at-least-once task queue
//! - Recomputing an item is idempotent, so duplicate and out-of-order
//!   deliveries converge instead of corrupting
//! - Deletion is soft: tombstones keep their identity for a retention
//!   window so peers can replicate the removal before it is swept
//! - Status drops are smoothed twice: a resolved event keeps
//!   contributing through a grace window, and a computed status holds
//!   through a decay window before it may fall
//!
//! ## Example
//!
//! ```rust
//! use statusdb_core::{BaseStatus, CoreConfig, CorrelationEngine, Event, Item, ItemFilter};
//! use std::time::Duration;
//!
//! let engine = CorrelationEngine::new(CoreConfig::new().node_name("node1")).unwrap();
//! engine
//!     .add_or_update_item(
//!         Item::new("web-01", "cmdb", "web-01")
//!             .name("front web server")
//!             .filter("host", ItemFilter::new().equal_field("host", "web-01")),
//!     )
//!     .unwrap();
//! engine
//!     .add_or_update_event(
//!         Event::new("probe-4711", "probe", "4711")
//!             .status(BaseStatus::Critical)
//!             .field("host", "web-01"),
//!     )
//!     .unwrap();
//! assert!(engine.wait_idle(Duration::from_secs(10)));
//!
//! let item = engine.items().find_by_id(&"web-01".to_owned()).unwrap();
//! assert_eq!(item.status, BaseStatus::Critical);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod aggregate;
mod config;
mod engine;
mod entity;
mod entity_service;
mod error;
mod event;
mod event_service;
mod history;
mod item;
mod item_service;
mod maintenance;
mod queue;
mod status;

pub use aggregate::{AggregateEventsStatus, EventStatusEntry};
pub use config::CoreConfig;
pub use engine::{CorrelationEngine, Reason, Task};
pub use entity::{Entity, Meta};
pub use entity_service::EntityService;
pub use error::{CoreError, CoreResult};
pub use event::{Event, EventId, EventType};
pub use event_service::EventService;
pub use history::{ChangeKind, ChangeNotice};
pub use item::{Item, ItemFilter, ItemId, ItemRule, RuleType};
pub use item_service::ItemService;
pub use status::BaseStatus;

pub use statusdb_store::{IndexValue, Operator, Predicate};

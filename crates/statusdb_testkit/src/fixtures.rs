//! Engine fixtures and entity builders.
//!
//! Provides convenience functions for setting up test engines and the
//! entities common correlation scenarios are built from.

use chrono::Duration;
use statusdb_core::{BaseStatus, CoreConfig, CorrelationEngine, Event, Item, ItemFilter};
use std::time::Duration as StdDuration;

/// How long fixture helpers wait for the recompute queue to drain.
pub const SETTLE: StdDuration = StdDuration::from_secs(10);

/// A running engine with windows tuned for tests.
pub struct TestEngine {
    /// The engine instance.
    pub engine: CorrelationEngine,
}

impl TestEngine {
    /// Engine with production-like smoothing windows.
    ///
    /// The maintenance thread is parked on a long interval, so sweeps
    /// only happen when the test drives
    /// [`CorrelationEngine::run_maintenance`] itself.
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Engine with grace and decay disabled, so a detached event drops
    /// its contribution on the very next recompute.
    pub fn instant() -> Self {
        Self::with_config(
            test_config()
                .event_grace(Duration::zero())
                .status_decay(Duration::zero()),
        )
    }

    /// Engine using `config` as given.
    pub fn with_config(config: CoreConfig) -> Self {
        Self {
            engine: CorrelationEngine::new(config).expect("engine config should be valid"),
        }
    }

    /// Blocks until queued correlation work is done.
    pub fn settle(&self) {
        assert!(
            self.engine.wait_idle(SETTLE),
            "recompute queue did not drain"
        );
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestEngine {
    type Target = CorrelationEngine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

/// Base configuration for test engines: node `node1`, maintenance
/// parked.
pub fn test_config() -> CoreConfig {
    CoreConfig::new()
        .node_name("node1")
        .maintenance_interval(StdDuration::from_secs(3600))
}

/// An event from the `probe` source carrying a `host` field.
pub fn host_event(id: &str, host: &str, status: BaseStatus) -> Event {
    Event::new(id, "probe", id)
        .status(status)
        .node("node1")
        .summary("synthetic probe report")
        .field("host", host)
}

/// An item that matches events whose `host` field equals its id.
pub fn host_item(id: &str) -> Item {
    Item::new(id, "cmdb", id)
        .name(id)
        .filter("host", ItemFilter::new().equal_field("host", id))
}

/// A parent item over `children`, with no rules.
pub fn group_item(id: &str, children: &[&str]) -> Item {
    children
        .iter()
        .fold(Item::new(id, "cmdb", id).name(id), |item, child| {
            item.child(*child)
        })
}

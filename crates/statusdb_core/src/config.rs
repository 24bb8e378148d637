//! Engine configuration.

use crate::error::{CoreError, CoreResult};
use chrono::Duration as ChronoDuration;
use std::time::Duration;

/// Configuration for a [`crate::CorrelationEngine`].
///
/// Time windows that participate in timestamp arithmetic are
/// [`chrono::Duration`]s; plain scheduling intervals are
/// [`std::time::Duration`]s.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Name of this node, recorded in `from_history` on every local write.
    pub node_name: String,

    /// Number of recompute worker threads.
    pub recompute_workers: usize,

    /// How long an idle worker blocks waiting for a task.
    pub queue_poll_timeout: Duration,

    /// How long a resolved event keeps contributing its last status.
    pub event_grace: ChronoDuration,

    /// How long a computed status is held before it may drop.
    pub status_decay: ChronoDuration,

    /// How long soft-deleted entities are retained before physical removal.
    pub tombstone_retention: ChronoDuration,

    /// How often the maintenance thread runs its sweeps.
    pub maintenance_interval: Duration,

    /// Maximum number of change notices handed to a consumer per batch.
    pub history_batch_limit: usize,

    /// Maximum number of change notices buffered per service.
    pub history_capacity: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            node_name: "local".to_owned(),
            recompute_workers: 2,
            queue_poll_timeout: Duration::from_secs(30),
            event_grace: ChronoDuration::seconds(300),
            status_decay: ChronoDuration::seconds(10),
            tombstone_retention: ChronoDuration::seconds(300),
            maintenance_interval: Duration::from_secs(1),
            history_batch_limit: 256,
            history_capacity: 16384,
        }
    }
}

impl CoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the node name.
    #[must_use]
    pub fn node_name(mut self, name: impl Into<String>) -> Self {
        self.node_name = name.into();
        self
    }

    /// Sets the number of recompute workers.
    #[must_use]
    pub const fn recompute_workers(mut self, count: usize) -> Self {
        self.recompute_workers = count;
        self
    }

    /// Sets the worker poll timeout.
    #[must_use]
    pub const fn queue_poll_timeout(mut self, timeout: Duration) -> Self {
        self.queue_poll_timeout = timeout;
        self
    }

    /// Sets the resolved-event grace window.
    #[must_use]
    pub const fn event_grace(mut self, window: ChronoDuration) -> Self {
        self.event_grace = window;
        self
    }

    /// Sets the status decay window.
    #[must_use]
    pub const fn status_decay(mut self, window: ChronoDuration) -> Self {
        self.status_decay = window;
        self
    }

    /// Sets the tombstone retention window.
    #[must_use]
    pub const fn tombstone_retention(mut self, window: ChronoDuration) -> Self {
        self.tombstone_retention = window;
        self
    }

    /// Sets the maintenance sweep interval.
    #[must_use]
    pub const fn maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    /// Sets the change-notice batch limit.
    #[must_use]
    pub const fn history_batch_limit(mut self, limit: usize) -> Self {
        self.history_batch_limit = limit;
        self
    }

    /// Sets the change-notice buffer capacity.
    #[must_use]
    pub const fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Checks that the configuration can drive an engine.
    pub fn validate(&self) -> CoreResult<()> {
        if self.node_name.is_empty() {
            return Err(CoreError::invalid_config("node_name must not be empty"));
        }
        if self.recompute_workers == 0 {
            return Err(CoreError::invalid_config(
                "recompute_workers must be at least 1",
            ));
        }
        if self.history_batch_limit == 0 {
            return Err(CoreError::invalid_config(
                "history_batch_limit must be at least 1",
            ));
        }
        if self.event_grace < ChronoDuration::zero()
            || self.status_decay < ChronoDuration::zero()
            || self.tombstone_retention < ChronoDuration::zero()
        {
            return Err(CoreError::invalid_config(
                "time windows must not be negative",
            ));
        }
        Ok(())
    }
}

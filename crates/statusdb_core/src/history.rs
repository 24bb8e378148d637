//! Change notices for the history exporter.
//!
//! Every service write pushes a notice; an exporter drains them in
//! bounded batches with [`ChangeQueue::poll`] and can catch up after
//! gaps with a version-bound scan on the service itself.

use parking_lot::Mutex;
use std::collections::VecDeque;

/// What happened to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Inserted, updated, or soft-deleted.
    Updated,
    /// Physically removed by a retention sweep.
    Removed,
}

/// One entity change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotice<Id> {
    /// The changed entity.
    pub id: Id,
    /// What happened to it.
    pub kind: ChangeKind,
}

impl<Id> ChangeNotice<Id> {
    /// A write notice.
    pub const fn updated(id: Id) -> Self {
        Self {
            id,
            kind: ChangeKind::Updated,
        }
    }

    /// A removal notice.
    pub const fn removed(id: Id) -> Self {
        Self {
            id,
            kind: ChangeKind::Removed,
        }
    }
}

/// A bounded buffer of change notices.
///
/// Overflow drops the oldest notices; exporters detect the gap by
/// comparing versions and fall back to a catch-up scan.
pub struct ChangeQueue<T> {
    entries: Mutex<VecDeque<T>>,
    capacity: usize,
    batch: usize,
}

impl<T> ChangeQueue<T> {
    /// Creates a queue holding at most `capacity` notices, drained
    /// `batch` at a time.
    pub fn new(capacity: usize, batch: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity,
            batch,
        }
    }

    /// Appends a notice, evicting the oldest if full.
    pub fn push(&self, notice: T) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
            tracing::warn!(capacity = self.capacity, "change queue overflow, oldest notice dropped");
        }
        entries.push_back(notice);
    }

    /// Drains every buffered notice, handing the consumer batches of
    /// at most the configured size.
    pub fn poll(&self, mut consumer: impl FnMut(Vec<T>)) {
        loop {
            let batch: Vec<T> = {
                let mut entries = self.entries.lock();
                let take = entries.len().min(self.batch);
                entries.drain(..take).collect()
            };
            if batch.is_empty() {
                return;
            }
            consumer(batch);
        }
    }

    /// Number of buffered notices.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

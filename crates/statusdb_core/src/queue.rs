//! Recompute work queue and its worker pool.
//!
//! Cascades run on a small fixed pool draining a FIFO queue instead of
//! recursing synchronously: stack depth stays bounded regardless of
//! hierarchy depth, and event ingestion never waits for fan-out.
//! Delivery is at-least-once; tasks must be idempotent.

use parking_lot::{Condvar, Mutex};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

struct QueueState<T> {
    entries: std::collections::VecDeque<T>,
    in_flight: usize,
    closed: bool,
}

/// An unbounded FIFO task queue with idle tracking.
///
/// `pending` counts queued plus in-flight tasks, so callers can wait
/// for full quiescence, not just an empty queue.
pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
    idle: Condvar,
}

impl<T> WorkQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                entries: std::collections::VecDeque::new(),
                in_flight: 0,
                closed: false,
            }),
            available: Condvar::new(),
            idle: Condvar::new(),
        }
    }

    /// Enqueues a task. Tasks pushed after [`WorkQueue::close`] are
    /// dropped.
    pub fn push(&self, task: T) {
        let mut state = self.state.lock();
        if state.closed {
            tracing::debug!("task dropped: queue is closed");
            return;
        }
        state.entries.push_back(task);
        drop(state);
        self.available.notify_one();
    }

    /// Takes the next task, blocking up to `timeout`.
    ///
    /// Returns `None` on timeout or when the queue is closed and
    /// drained. A returned task counts as in-flight until the caller
    /// acknowledges it with [`WorkQueue::task_done`].
    pub fn poll(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(task) = state.entries.pop_front() {
                state.in_flight += 1;
                return Some(task);
            }
            if state.closed {
                return None;
            }
            if self.available.wait_until(&mut state, deadline).timed_out() {
                return None;
            }
        }
    }

    /// Acknowledges a polled task.
    pub fn task_done(&self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.entries.is_empty() && state.in_flight == 0 {
            drop(state);
            self.idle.notify_all();
        }
    }

    /// Queued plus in-flight tasks.
    pub fn pending(&self) -> usize {
        let state = self.state.lock();
        state.entries.len() + state.in_flight
    }

    /// Blocks until every task has been taken and acknowledged.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.entries.is_empty() || state.in_flight > 0 {
            if self.idle.wait_until(&mut state, deadline).timed_out() {
                return false;
            }
        }
        true
    }

    /// Stops accepting tasks and wakes blocked pollers.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);
        self.available.notify_all();
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A fixed set of threads draining a [`WorkQueue`].
///
/// A panicking task is logged and acknowledged; the worker thread
/// survives and keeps draining. Dropping the pool closes the queue and
/// joins the workers, letting in-flight tasks finish.
pub struct WorkerPool<T: Send + 'static> {
    queue: Arc<WorkQueue<T>>,
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Spawns `count` workers applying `handler` to each task.
    pub fn spawn<F>(
        name: &str,
        count: usize,
        queue: Arc<WorkQueue<T>>,
        poll_timeout: Duration,
        handler: F,
    ) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let handler = Arc::new(handler);
        let handles = (0..count)
            .map(|worker| {
                let queue = Arc::clone(&queue);
                let stop = Arc::clone(&stop);
                let handler = Arc::clone(&handler);
                let name = name.to_owned();
                std::thread::spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        let Some(task) = queue.poll(poll_timeout) else {
                            continue;
                        };
                        if catch_unwind(AssertUnwindSafe(|| handler(task))).is_err() {
                            tracing::error!(pool = %name, worker, "task panicked");
                        }
                        queue.task_done();
                    }
                })
            })
            .collect();
        Self {
            queue,
            stop,
            handles,
        }
    }
}

impl<T: Send + 'static> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.queue.close();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn poll_times_out_on_an_empty_queue() {
        let queue: WorkQueue<u32> = WorkQueue::new();
        assert_eq!(queue.poll(Duration::from_millis(10)), None);
    }

    #[test]
    fn tasks_drain_in_order() {
        let queue = WorkQueue::new();
        queue.push(1);
        queue.push(2);
        assert_eq!(queue.poll(Duration::from_millis(10)), Some(1));
        assert_eq!(queue.poll(Duration::from_millis(10)), Some(2));
        assert_eq!(queue.pending(), 2);
        queue.task_done();
        queue.task_done();
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn wait_idle_covers_in_flight_tasks() {
        let queue = Arc::new(WorkQueue::new());
        queue.push(());
        let task = queue.poll(Duration::from_millis(10));
        assert!(task.is_some());
        // Still in flight: not idle yet.
        assert!(!queue.wait_idle(Duration::from_millis(20)));
        queue.task_done();
        assert!(queue.wait_idle(Duration::from_millis(20)));
    }

    #[test]
    fn workers_process_everything() {
        let queue = Arc::new(WorkQueue::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let pool = WorkerPool::spawn(
            "test",
            2,
            Arc::clone(&queue),
            Duration::from_millis(20),
            move |value: usize| {
                counter.fetch_add(value, Ordering::SeqCst);
            },
        );
        for _ in 0..100 {
            queue.push(1);
        }
        assert!(queue.wait_idle(Duration::from_secs(5)));
        assert_eq!(seen.load(Ordering::SeqCst), 100);
        drop(pool);
    }

    #[test]
    fn a_panicking_task_does_not_kill_the_worker() {
        let queue = Arc::new(WorkQueue::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let _pool = WorkerPool::spawn(
            "test",
            1,
            Arc::clone(&queue),
            Duration::from_millis(20),
            move |value: usize| {
                if value == 0 {
                    panic!("boom");
                }
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );
        queue.push(0);
        queue.push(1);
        assert!(queue.wait_idle(Duration::from_secs(5)));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_wakes_blocked_pollers() {
        let queue: Arc<WorkQueue<u32>> = Arc::new(WorkQueue::new());
        let waiter = Arc::clone(&queue);
        let handle = std::thread::spawn(move || waiter.poll(Duration::from_secs(30)));
        std::thread::sleep(Duration::from_millis(30));
        queue.close();
        assert_eq!(handle.join().unwrap(), None);
        queue.push(9);
        assert_eq!(queue.pending(), 0);
    }
}

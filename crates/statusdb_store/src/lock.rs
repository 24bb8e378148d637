//! Store-wide transaction lock.

use parking_lot::{Condvar, Mutex};
use std::thread::{self, ThreadId};

#[derive(Debug)]
struct LockState {
    exclusive_owner: Option<ThreadId>,
    exclusive_depth: usize,
    shared: usize,
}

/// A shared/exclusive lock with a re-entrant exclusive side.
///
/// Single mutations ([`compute`]/[`remove`]) take the shared side, so they
/// run in parallel with each other; [`transaction`] takes the exclusive
/// side and keeps every other thread's mutation out until the multi-step
/// body finishes. The exclusive owner may re-enter both sides, which lets
/// a transaction body nest further transactions and issue its own
/// mutations.
///
/// A thread holding only the shared side must not request the exclusive
/// side; it would wait on itself.
///
/// [`compute`]: crate::IndexedMap::compute
/// [`remove`]: crate::IndexedMap::remove
/// [`transaction`]: crate::IndexedMap::transaction
#[derive(Debug)]
pub struct StoreLock {
    state: Mutex<LockState>,
    released: Condvar,
}

impl StoreLock {
    /// Creates an unlocked lock.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState {
                exclusive_owner: None,
                exclusive_depth: 0,
                shared: 0,
            }),
            released: Condvar::new(),
        }
    }

    /// Acquires the shared side, waiting out any foreign exclusive holder.
    pub fn shared(&self) -> SharedGuard<'_> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        while state.exclusive_owner.is_some() && state.exclusive_owner != Some(me) {
            self.released.wait(&mut state);
        }
        state.shared += 1;
        SharedGuard { lock: self }
    }

    /// Acquires the exclusive side, waiting out shared holders and foreign
    /// exclusive holders. Re-entrant for the owning thread.
    pub fn exclusive(&self) -> ExclusiveGuard<'_> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.exclusive_owner == Some(me) {
            state.exclusive_depth += 1;
            return ExclusiveGuard { lock: self };
        }
        while state.exclusive_owner.is_some() || state.shared > 0 {
            self.released.wait(&mut state);
        }
        state.exclusive_owner = Some(me);
        state.exclusive_depth = 1;
        ExclusiveGuard { lock: self }
    }

    fn release_shared(&self) {
        let mut state = self.state.lock();
        state.shared -= 1;
        if state.shared == 0 {
            self.released.notify_all();
        }
    }

    fn release_exclusive(&self) {
        let mut state = self.state.lock();
        state.exclusive_depth -= 1;
        if state.exclusive_depth == 0 {
            state.exclusive_owner = None;
            self.released.notify_all();
        }
    }
}

impl Default for StoreLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard for the shared side of a [`StoreLock`].
#[must_use = "the lock is released when the guard drops"]
#[derive(Debug)]
pub struct SharedGuard<'a> {
    lock: &'a StoreLock,
}

impl Drop for SharedGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_shared();
    }
}

/// Guard for the exclusive side of a [`StoreLock`].
#[must_use = "the lock is released when the guard drops"]
#[derive(Debug)]
pub struct ExclusiveGuard<'a> {
    lock: &'a StoreLock,
}

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_exclusive();
    }
}

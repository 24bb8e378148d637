//! Background maintenance thread.
//!
//! Runs the engine's periodic sweeps (event expiry, status decay,
//! tombstone retention) at a fixed interval until the engine drops.

use crate::engine::EngineCore;
use chrono::Utc;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    /// Sleeps for `interval` or until stopped; returns whether the
    /// loop should keep running.
    fn sleep(&self, interval: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            self.wake.wait_for(&mut stopped, interval);
        }
        !*stopped
    }

    fn stop(&self) {
        let mut stopped = self.stopped.lock();
        *stopped = true;
        drop(stopped);
        self.wake.notify_all();
    }
}

pub(crate) struct Maintenance {
    signal: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

impl Maintenance {
    pub(crate) fn spawn(core: Arc<EngineCore>) -> Self {
        let signal = Arc::new(StopSignal {
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        });
        let thread_signal = Arc::clone(&signal);
        let interval = core.config.maintenance_interval;
        let handle = thread::spawn(move || {
            while thread_signal.sleep(interval) {
                if let Err(error) = core.run_maintenance(Utc::now()) {
                    tracing::error!(%error, "maintenance sweep failed");
                }
            }
        });
        Self {
            signal,
            handle: Some(handle),
        }
    }
}

impl Drop for Maintenance {
    fn drop(&mut self) {
        self.signal.stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("maintenance thread panicked");
            }
        }
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use crate::cursor::CursorStore;

/// Handle for the background cursor-cleanup thread. Stopped explicitly or
/// on drop.
pub(crate) struct SweepHandle {
    shutdown: Arc<AtomicBool>,
    notify: Arc<(Mutex<()>, Condvar)>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SweepHandle {
    pub(crate) fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.notify.1.notify_one();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn the cursor cleanup thread if an interval is configured.
/// Returns `None` when `interval_secs == u64::MAX` (no sweep).
pub(crate) fn spawn(store: Arc<CursorStore>, interval_secs: u64) -> Option<SweepHandle> {
    if interval_secs == u64::MAX {
        return None;
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let notify = Arc::new((Mutex::new(()), Condvar::new()));
    let sweep_flag = Arc::clone(&shutdown);
    let sweep_notify = Arc::clone(&notify);
    let interval = Duration::from_secs(interval_secs);
    let handle = thread::spawn(move || {
        loop {
            let (lock, cvar) = &*sweep_notify;
            let guard = match lock.lock() {
                Ok(guard) => guard,
                Err(_) => break,
            };
            let _ = cvar.wait_timeout(guard, interval);
            if sweep_flag.load(Ordering::Relaxed) {
                break;
            }
            match store.sweep_expired() {
                Ok(0) => {}
                Ok(deleted) => tracing::debug!(deleted, "removed expired cursor files"),
                Err(e) => tracing::warn!(error = %e, "cursor sweep failed"),
            }
        }
    });

    Some(SweepHandle {
        shutdown,
        notify,
        handle: Some(handle),
    })
}

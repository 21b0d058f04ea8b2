//! Injected timer capability.
//!
//! The core never spawns its own workers: expiry timers are delegated
//! to a [`Scheduler`] supplied at exchange creation, which keeps the
//! suspend/resume behavior deterministic under test.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Cancels a scheduled callback before it fires.
///
/// Cancellation is best-effort: a callback that is already running
/// cannot be recalled, so consumers must tolerate a late firing.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a live token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the scheduled callback as cancelled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether the callback has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Schedules a callback to run once after a delay.
pub trait Scheduler: Send + Sync {
    /// Schedules `callback` to run after `delay`, unless the returned
    /// token is cancelled first.
    fn schedule(&self, delay: Duration, callback: Box<dyn FnOnce() + Send>) -> CancelToken;
}

/// Deterministic scheduler that fires only when told to.
///
/// Tasks accumulate until a test drives them with [`fire_next`]
/// (earliest delay first) or [`fire_all`].
///
/// [`fire_next`]: ManualScheduler::fire_next
/// [`fire_all`]: ManualScheduler::fire_all
#[derive(Default)]
pub struct ManualScheduler {
    tasks: Mutex<Vec<Task>>,
}

struct Task {
    delay: Duration,
    callback: Box<dyn FnOnce() + Send>,
    cancel: CancelToken,
}

impl ManualScheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of scheduled callbacks that are neither fired nor
    /// cancelled.
    pub fn pending(&self) -> usize {
        self.tasks
            .lock()
            .iter()
            .filter(|t| !t.cancel.is_cancelled())
            .count()
    }

    /// Fires the earliest pending callback. Returns whether one ran.
    pub fn fire_next(&self) -> bool {
        let task = {
            let mut tasks = self.tasks.lock();
            tasks.retain(|t| !t.cancel.is_cancelled());
            let earliest = tasks
                .iter()
                .enumerate()
                .min_by_key(|(_, t)| t.delay)
                .map(|(i, _)| i);
            match earliest {
                Some(i) => tasks.remove(i),
                None => return false,
            }
        };

        // Run outside the lock: the callback may schedule again
        (task.callback)();
        true
    }

    /// Fires every pending callback, earliest delay first.
    pub fn fire_all(&self) {
        while self.fire_next() {}
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, callback: Box<dyn FnOnce() + Send>) -> CancelToken {
        let cancel = CancelToken::new();
        self.tasks.lock().push(Task {
            delay,
            callback,
            cancel: cancel.clone(),
        });
        cancel
    }
}

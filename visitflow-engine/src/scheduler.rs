//! Timer scheduling.
//!
//! Debounce windows are driven through [`Scheduler`] so they can run on the
//! tokio timer in production and on a virtual clock in tests
//! ([`manual::ManualScheduler`]).

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use visitflow_types::{Clock, SystemClock, Timestamp};

/// Work run when a timer fires.
pub type TimerTask = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Schedules and cancels one-shot timers.
pub trait Scheduler: Send + Sync {
    /// Current time as seen by this scheduler.
    fn now(&self) -> Timestamp;

    /// Runs `task` once after `delay`, unless cancelled first.
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerId;

    /// Cancels a timer. Returns `false` if it already fired or was cancelled.
    fn cancel(&self, id: TimerId) -> bool;
}

/// Wraps a task body as a [`TimerTask`].
pub fn timer_task<F>(f: F) -> TimerTask
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    Box::new(move || -> BoxFuture<'static, ()> { Box::pin(f) })
}

/// Scheduler over the tokio timer. `schedule` must be called from within a
/// tokio runtime.
#[derive(Default)]
pub struct TokioScheduler {
    next_id: AtomicU64,
    armed: Arc<Mutex<HashMap<TimerId, oneshot::Sender<()>>>>,
    clock: SystemClock,
}

impl TokioScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for TokioScheduler {
    fn now(&self) -> Timestamp {
        self.clock.now()
    }

    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerId {
        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, cancel_tx);

        let armed = Arc::clone(&self.armed);
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {
                    let still_armed = armed
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .remove(&id)
                        .is_some();
                    if still_armed {
                        task().await;
                    }
                }
                _ = cancel_rx => {}
            }
        });
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        // Dropping the sender wakes the sleeping task.
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }
}

/// Virtual-clock scheduler for deterministic tests.
pub mod manual {
    use super::{Scheduler, TimerId, TimerTask};
    use std::sync::{Mutex, PoisonError};
    use std::time::Duration;
    use visitflow_types::{Clock, Timestamp};

    struct PendingTimer {
        id: TimerId,
        due: Duration,
        task: TimerTask,
    }

    struct ManualState {
        start: Timestamp,
        elapsed: Duration,
        next_id: u64,
        pending: Vec<PendingTimer>,
    }

    /// A scheduler whose time only moves through [`ManualScheduler::advance`].
    ///
    /// Timers fire inline, in due order (ties by scheduling order), and
    /// timers scheduled by a firing task are eligible within the same advance.
    pub struct ManualScheduler {
        state: Mutex<ManualState>,
    }

    impl ManualScheduler {
        #[must_use]
        pub fn new(start: Timestamp) -> Self {
            Self {
                state: Mutex::new(ManualState {
                    start,
                    elapsed: Duration::ZERO,
                    next_id: 0,
                    pending: Vec::new(),
                }),
            }
        }

        fn state(&self) -> std::sync::MutexGuard<'_, ManualState> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Moves time forward by `by`, running every timer that comes due.
        pub async fn advance(&self, by: Duration) {
            let target = self.state().elapsed.saturating_add(by);
            loop {
                let next = {
                    let mut state = self.state();
                    let due_index = state
                        .pending
                        .iter()
                        .enumerate()
                        .filter(|(_, t)| t.due <= target)
                        .min_by_key(|(_, t)| (t.due, t.id))
                        .map(|(i, _)| i);
                    due_index.map(|i| {
                        let timer = state.pending.remove(i);
                        state.elapsed = state.elapsed.max(timer.due);
                        timer
                    })
                };
                match next {
                    Some(timer) => (timer.task)().await,
                    None => break,
                }
            }
            let mut state = self.state();
            state.elapsed = state.elapsed.max(target);
        }

        /// Number of timers still waiting to fire.
        #[must_use]
        pub fn pending_timers(&self) -> usize {
            self.state().pending.len()
        }

        /// Time elapsed since construction.
        #[must_use]
        pub fn elapsed(&self) -> Duration {
            self.state().elapsed
        }
    }

    impl Scheduler for ManualScheduler {
        fn now(&self) -> Timestamp {
            let state = self.state();
            let offset = chrono::Duration::from_std(state.elapsed)
                .unwrap_or_else(|_| chrono::Duration::zero());
            state
                .start
                .checked_add_signed(offset)
                .unwrap_or(state.start)
        }

        fn schedule(&self, delay: Duration, task: TimerTask) -> TimerId {
            let mut state = self.state();
            let id = TimerId(state.next_id);
            state.next_id += 1;
            let due = state.elapsed.saturating_add(delay);
            state.pending.push(PendingTimer { id, due, task });
            id
        }

        fn cancel(&self, id: TimerId) -> bool {
            let mut state = self.state();
            let before = state.pending.len();
            state.pending.retain(|t| t.id != id);
            state.pending.len() != before
        }
    }

    impl Clock for ManualScheduler {
        fn now(&self) -> Timestamp {
            Scheduler::now(self)
        }
    }
}

/// Adapts a scheduler's notion of time to [`Clock`].
pub struct SchedulerClock(pub Arc<dyn Scheduler>);

impl Clock for SchedulerClock {
    fn now(&self) -> Timestamp {
        self.0.now()
    }
}

mod common;

use common::ts;
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use visitflow_engine::manual::ManualScheduler;
use visitflow_engine::{timer_task, Scheduler, SchedulerClock, TokioScheduler};
use visitflow_types::Clock;

type Log = Arc<Mutex<Vec<&'static str>>>;

fn push(log: &Log, entry: &'static str) -> visitflow_engine::TimerTask {
    let log = Arc::clone(log);
    timer_task(async move { log.lock().unwrap().push(entry) })
}

// ── Manual scheduler ─────────────────────────────────────────────

#[tokio::test]
async fn timers_fire_in_due_order() {
    let scheduler = ManualScheduler::new(ts(0));
    let log = Log::default();

    scheduler.schedule(Duration::from_millis(300), push(&log, "late"));
    scheduler.schedule(Duration::from_millis(100), push(&log, "early"));
    scheduler.schedule(Duration::from_millis(100), push(&log, "early-second"));

    scheduler.advance(Duration::from_millis(200)).await;
    assert_eq!(*log.lock().unwrap(), vec!["early", "early-second"]);
    assert_eq!(scheduler.pending_timers(), 1);

    scheduler.advance(Duration::from_millis(100)).await;
    assert_eq!(*log.lock().unwrap(), vec!["early", "early-second", "late"]);
}

#[tokio::test]
async fn cancelled_timer_does_not_fire() {
    let scheduler = ManualScheduler::new(ts(0));
    let log = Log::default();

    let id = scheduler.schedule(Duration::from_millis(100), push(&log, "cancelled"));
    assert!(scheduler.cancel(id));
    assert!(!scheduler.cancel(id));

    scheduler.advance(Duration::from_secs(1)).await;
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn timer_scheduled_by_a_task_fires_within_same_advance() {
    let scheduler = Arc::new(ManualScheduler::new(ts(0)));
    let log = Log::default();

    let inner_scheduler = Arc::clone(&scheduler);
    let inner_log = Arc::clone(&log);
    scheduler.schedule(
        Duration::from_millis(100),
        timer_task(async move {
            inner_log.lock().unwrap().push("outer");
            inner_scheduler.schedule(Duration::from_millis(100), push(&inner_log, "inner"));
        }),
    );

    scheduler.advance(Duration::from_millis(250)).await;
    assert_eq!(*log.lock().unwrap(), vec!["outer", "inner"]);
}

#[tokio::test]
async fn clock_follows_virtual_time() {
    let scheduler = Arc::new(ManualScheduler::new(ts(1_000)));
    scheduler.advance(Duration::from_secs(5)).await;

    assert_eq!(scheduler.elapsed(), Duration::from_secs(5));
    assert_eq!(Scheduler::now(&*scheduler), ts(1_005));

    let clock = SchedulerClock(scheduler);
    assert_eq!(clock.now(), ts(1_005));
}

// ── Tokio scheduler ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn tokio_timer_fires_after_delay() {
    let scheduler = TokioScheduler::new();
    let log = Log::default();

    scheduler.schedule(Duration::from_millis(300), push(&log, "fired"));
    tokio::time::sleep(Duration::from_millis(299)).await;
    assert!(log.lock().unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(*log.lock().unwrap(), vec!["fired"]);
}

#[tokio::test(start_paused = true)]
async fn tokio_timer_can_be_cancelled() {
    let scheduler = TokioScheduler::new();
    let log = Log::default();

    let id = scheduler.schedule(Duration::from_millis(300), push(&log, "cancelled"));
    assert!(scheduler.cancel(id));
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(log.lock().unwrap().is_empty());
    assert!(!scheduler.cancel(id));
}

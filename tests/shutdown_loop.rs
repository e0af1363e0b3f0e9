//! tests/shutdown_loop.rs
//! Repeated start/stop cycles on one scheduler.

mod common;

use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::time::Duration as StdDuration;

use crate::common::{build_scheduler, counter_job, every, setup_tracing, stop_and_drain, wait_until};
use firekeeper::{CancellationToken, ExecutionMode};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_restart_keeps_queued_jobs() {
  setup_tracing();
  let scheduler = build_scheduler(ExecutionMode::Pooled { workers: 2 }).unwrap();
  let counter = Arc::new(AtomicUsize::new(0));

  scheduler.start(&CancellationToken::new());
  scheduler
    .schedule_job(counter_job(1, counter.clone(), StdDuration::ZERO), every(40))
    .await
    .unwrap();

  for cycle in 0..5 {
    let before = counter.load(Ordering::SeqCst);
    assert!(
      wait_until(StdDuration::from_secs(2), || counter.load(Ordering::SeqCst) > before).await,
      "Job did not run in cycle {}",
      cycle
    );

    stop_and_drain(&scheduler).await;
    assert!(!scheduler.is_started());
    // The queue is frozen while stopped.
    let queued = scheduler.job_keys();
    assert!(queued.len() <= 1);

    scheduler.start(&CancellationToken::new());
    if queued.is_empty() {
      // A stop landing between pop and reschedule abandons the in-flight item.
      scheduler
        .schedule_job(counter_job(1, counter.clone(), StdDuration::ZERO), every(40))
        .await
        .unwrap();
    }
  }

  stop_and_drain(&scheduler).await;
}

#[tokio::test]
async fn test_stale_watcher_does_not_stop_new_run() {
  setup_tracing();
  let scheduler = build_scheduler(ExecutionMode::Serialized).unwrap();
  let first = CancellationToken::new();
  let second = CancellationToken::new();

  scheduler.start(&first);
  scheduler.stop();
  // Restart before the first run's watcher has had a chance to observe its scope.
  scheduler.start(&second);

  tokio::time::sleep(StdDuration::from_millis(100)).await;
  assert!(scheduler.is_started(), "A previous run's watcher stopped the new run");

  // Cancelling the first parent is irrelevant to the second run.
  first.cancel();
  tokio::time::sleep(StdDuration::from_millis(50)).await;
  assert!(scheduler.is_started());

  second.cancel();
  assert!(wait_until(StdDuration::from_secs(1), || !scheduler.is_started()).await);
  scheduler.wait(&CancellationToken::new()).await;
}

#[tokio::test]
async fn test_clones_share_one_engine() {
  setup_tracing();
  let scheduler = build_scheduler(ExecutionMode::Unconstrained).unwrap();
  let handle = scheduler.clone();
  let counter = Arc::new(AtomicUsize::new(0));

  scheduler.start(&CancellationToken::new());
  assert!(handle.is_started());

  handle
    .schedule_job(counter_job(4, counter, StdDuration::ZERO), every(60_000))
    .await
    .unwrap();
  assert_eq!(scheduler.job_keys(), vec![4]);

  handle.stop();
  assert!(!scheduler.is_started());
  scheduler.wait(&CancellationToken::new()).await;
}

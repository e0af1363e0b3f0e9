//! tests/stale.rs
//! Fires that fall behind the staleness threshold are skipped but rescheduled.

mod common;

use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::time::Duration as StdDuration;

use crate::common::{counter_job, setup_tracing, stop_and_drain, wait_until};
use firekeeper::{CancellationToken, FireKeeper, ManualClock, SimpleTrigger};

fn manual_scheduler(clock: Arc<ManualClock>, threshold: StdDuration) -> FireKeeper {
  FireKeeper::builder()
    .serialized()
    .clock(clock)
    .staleness_threshold(threshold)
    .build()
    .expect("Failed to build scheduler")
}

#[tokio::test]
async fn test_stale_fires_are_skipped_then_caught_up() {
  setup_tracing();
  let clock = Arc::new(ManualClock::starting_now());
  let scheduler = manual_scheduler(clock.clone(), StdDuration::from_secs(30));
  scheduler.start(&CancellationToken::new());
  let counter = Arc::new(AtomicUsize::new(0));

  scheduler
    .schedule_job(
      counter_job(1, counter.clone(), StdDuration::ZERO),
      Arc::new(SimpleTrigger::new(StdDuration::from_secs(1))),
    )
    .await
    .unwrap();

  // The job is now 99 fires behind: fire times T+1s ..= T+100s are all due.
  clock.advance(StdDuration::from_secs(100));

  assert!(
    wait_until(StdDuration::from_secs(3), || counter.load(Ordering::SeqCst) == 31).await,
    "Expected the 31 fires within the threshold to run (ran {})",
    counter.load(Ordering::SeqCst)
  );
  tokio::time::sleep(StdDuration::from_millis(100)).await;

  let metrics = scheduler.metrics_snapshot();
  // Older than now - 30s, i.e. T+1s ..= T+69s.
  assert_eq!(metrics.jobs_skipped_stale, 69);
  assert_eq!(metrics.jobs_executed, 31);
  assert_eq!(counter.load(Ordering::SeqCst), 31);

  // Still scheduled, next at T+101s, which the frozen clock never reaches.
  assert_eq!(scheduler.job_keys(), vec![1]);

  stop_and_drain(&scheduler).await;
}

#[tokio::test]
async fn test_threshold_is_configurable() {
  setup_tracing();
  let clock = Arc::new(ManualClock::starting_now());
  let scheduler = manual_scheduler(clock.clone(), StdDuration::from_secs(5));
  scheduler.start(&CancellationToken::new());
  let counter = Arc::new(AtomicUsize::new(0));

  scheduler
    .schedule_job(
      counter_job(1, counter.clone(), StdDuration::ZERO),
      Arc::new(SimpleTrigger::new(StdDuration::from_secs(1))),
    )
    .await
    .unwrap();
  clock.advance(StdDuration::from_secs(20));

  // Fires T+15s ..= T+20s are within 5s of now.
  assert!(wait_until(StdDuration::from_secs(3), || counter.load(Ordering::SeqCst) == 6).await);
  tokio::time::sleep(StdDuration::from_millis(100)).await;
  assert_eq!(scheduler.metrics_snapshot().jobs_skipped_stale, 14);
  assert_eq!(counter.load(Ordering::SeqCst), 6);

  stop_and_drain(&scheduler).await;
}

//! tests/concurrency.rs
//! Concurrency bounds of the pooled and unconstrained execution modes.

mod common;

use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::time::Duration as StdDuration;

use common::{concurrency_job, once_after, setup_tracing, start_scheduler, stop_and_drain};
use firekeeper::{ExecutionMode, FireKeeper};
use tracing::info;

async fn submit_simultaneous(
  scheduler: &FireKeeper,
  job_count: usize,
  active: &Arc<AtomicUsize>,
  max_observed: &Arc<AtomicUsize>,
  delay: StdDuration,
) {
  for i in 0..job_count {
    scheduler
      .schedule_job(
        concurrency_job(i as i64, active.clone(), max_observed.clone(), delay),
        once_after(50),
      )
      .await
      .expect("Failed to schedule job");
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_worker_never_overlaps() {
  setup_tracing();
  let (scheduler, _shutdown) = start_scheduler(ExecutionMode::Pooled { workers: 1 });
  let active = Arc::new(AtomicUsize::new(0));
  let max_observed = Arc::new(AtomicUsize::new(0));

  submit_simultaneous(&scheduler, 2, &active, &max_observed, StdDuration::from_millis(150)).await;
  tokio::time::sleep(StdDuration::from_millis(600)).await;

  assert_eq!(max_observed.load(Ordering::SeqCst), 1, "Executions overlapped");
  assert_eq!(scheduler.metrics_snapshot().jobs_executed, 2);

  stop_and_drain(&scheduler).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_max_worker_limit() {
  setup_tracing();
  let max_workers = 3;
  let job_count = max_workers + 2; // Submit more jobs than workers
  let job_delay = StdDuration::from_millis(300);

  let (scheduler, _shutdown) = start_scheduler(ExecutionMode::Pooled { workers: max_workers });
  let active = Arc::new(AtomicUsize::new(0));
  let max_observed = Arc::new(AtomicUsize::new(0));

  info!("Submitting {} jobs...", job_count);
  submit_simultaneous(&scheduler, job_count, &active, &max_observed, job_delay).await;

  // Two rounds of executions plus slack.
  tokio::time::sleep(job_delay * 2 + StdDuration::from_millis(400)).await;

  let final_max = max_observed.load(Ordering::SeqCst);
  info!("Max observed concurrent jobs: {}", final_max);
  assert_eq!(final_max, max_workers, "Pool should be saturated but never exceeded");
  assert_eq!(scheduler.metrics_snapshot().jobs_executed, job_count);
  assert_eq!(scheduler.metrics_snapshot().executions_active_current, 0);

  stop_and_drain(&scheduler).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unconstrained_runs_everything_at_once() {
  setup_tracing();
  let job_count = 6;
  let (scheduler, _shutdown) = start_scheduler(ExecutionMode::Unconstrained);
  let active = Arc::new(AtomicUsize::new(0));
  let max_observed = Arc::new(AtomicUsize::new(0));

  submit_simultaneous(&scheduler, job_count, &active, &max_observed, StdDuration::from_millis(300)).await;
  tokio::time::sleep(StdDuration::from_millis(250)).await;

  assert_eq!(active.load(Ordering::SeqCst), job_count, "All executions should be running");
  assert_eq!(scheduler.metrics_snapshot().executions_active_current, job_count);

  tokio::time::sleep(StdDuration::from_millis(400)).await;
  assert_eq!(max_observed.load(Ordering::SeqCst), job_count);
  assert_eq!(active.load(Ordering::SeqCst), 0);

  stop_and_drain(&scheduler).await;
}

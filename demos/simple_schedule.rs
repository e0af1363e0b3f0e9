//! demos/simple_schedule.rs
//!
//! Schedules one recurring job and one run-once job on a pooled scheduler,
//! then shuts down and drains.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use firekeeper::{job_fn, CancellationToken, FireKeeper, FunctionJob, RunOnceTrigger, SimpleTrigger};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  // --- Setup Tracing ---
  let filter = tracing_subscriber::EnvFilter::try_new("warn,firekeeper=info,simple_schedule=trace")
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
  tracing_subscriber::fmt().with_env_filter(filter).init();

  // --- Build and Start ---
  let scheduler = FireKeeper::builder().max_workers(2).build()?;
  let shutdown = CancellationToken::new();
  scheduler.start(&shutdown);
  info!("Scheduler started.");

  let ticks = Arc::new(AtomicUsize::new(0));

  // --- Recurring Job ---
  let tick_counter = ticks.clone();
  let ticking = FunctionJob::new(1, "tick every 500ms", job_fn! {
    {
      let counter = tick_counter.clone();
    }
    |_cancel| {
      let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
      info!("*** Tick #{} ***", count);
    }
  });
  scheduler
    .schedule_job(ticking.into_arc(), Arc::new(SimpleTrigger::new(StdDuration::from_millis(500))))
    .await?;

  // --- One-off Job ---
  let once = FunctionJob::new(2, "run once after 1s", job_fn! {
    |cancel| {
      tokio::select! {
        _ = cancel.cancelled() => info!("One-off job cancelled"),
        _ = tokio::time::sleep(StdDuration::from_millis(100)) => info!("*** One-off job done ***"),
      }
    }
  });
  scheduler
    .schedule_job(once.into_arc(), Arc::new(RunOnceTrigger::new(StdDuration::from_secs(1))))
    .await?;

  info!("Queued keys: {:?}", scheduler.job_keys());
  tokio::time::sleep(StdDuration::from_millis(2600)).await;

  // The run-once job has expired and left the queue.
  info!("Queued keys after 2.6s: {:?}", scheduler.job_keys());
  info!("Metrics: {:#?}", scheduler.metrics_snapshot());

  // --- Shutdown ---
  shutdown.cancel();
  scheduler.wait(&CancellationToken::new()).await;
  info!("Scheduler drained after {} ticks.", ticks.load(Ordering::SeqCst));
  Ok(())
}

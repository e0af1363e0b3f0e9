//! demos/cron_schedule.rs
//!
//! Schedules a job from a CRON expression.
//! Requires the `cron_schedule` feature.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use firekeeper::{job_fn, CancellationToken, CronTrigger, FireKeeper, FunctionJob};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  let filter = tracing_subscriber::EnvFilter::try_new("warn,firekeeper=info,cron_schedule=trace")
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
  tracing_subscriber::fmt().with_env_filter(filter).init();

  let scheduler = FireKeeper::builder().max_workers(1).build()?;
  let shutdown = CancellationToken::new();
  scheduler.start(&shutdown);

  // Every 2 seconds (seconds precision needs the leading seconds field).
  let trigger = CronTrigger::new("*/2 * * * * * *")?;
  info!("Using trigger: {:?}", trigger);

  let execution_count = Arc::new(AtomicUsize::new(0));
  let exec_count_clone = execution_count.clone();
  let job = FunctionJob::new(1, "cron every 2s", job_fn! {
    {
      let counter = exec_count_clone.clone();
    }
    |_cancel| {
      let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
      info!("*** Cron job executing (count {}) at {} ***", count, chrono::Utc::now());
    }
  });
  scheduler.schedule_job(job.into_arc(), Arc::new(trigger)).await?;

  if let Ok(scheduled) = scheduler.get_scheduled_job(1) {
    info!("Scheduled: {:?}", scheduled);
  }

  tokio::time::sleep(StdDuration::from_millis(6500)).await;
  info!("Executions: {}", execution_count.load(Ordering::SeqCst));

  shutdown.cancel();
  scheduler.wait(&CancellationToken::new()).await;
  Ok(())
}

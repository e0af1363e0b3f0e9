//! demos/delete_recurring.rs
//!
//! Deletes a recurring job after it has fired a few times.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use firekeeper::{job_fn, CancellationToken, FireKeeper, FunctionJob, SimpleTrigger};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  let filter = tracing_subscriber::EnvFilter::try_new("warn,firekeeper=debug,delete_recurring=trace")
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
  tracing_subscriber::fmt().with_env_filter(filter).init();

  let scheduler = FireKeeper::builder().serialized().build()?;
  let shutdown = CancellationToken::new();
  scheduler.start(&shutdown);

  let execution_count = Arc::new(AtomicUsize::new(0));
  let exec_count_clone = execution_count.clone();
  let job = FunctionJob::new(42, "delete me", job_fn! {
    {
      let counter = exec_count_clone.clone();
    }
    |_cancel| {
      #[cfg(feature = "job_context")]
      {
        let ctx = firekeeper::job_context!();
        info!("  Context: key {}, fire time {}", ctx.key, ctx.fire_time);
      }
      counter.fetch_add(1, Ordering::SeqCst);
    }
  });
  scheduler
    .schedule_job(job.into_arc(), Arc::new(SimpleTrigger::new(StdDuration::from_millis(300))))
    .await?;

  tokio::time::sleep(StdDuration::from_millis(1000)).await;
  let count_before = execution_count.load(Ordering::SeqCst);
  info!("Executions before delete: {}", count_before);

  match scheduler.delete_job(42) {
    Ok(()) => info!("Job 42 deleted."),
    Err(e) => error!("Failed to delete job 42: {}", e),
  }

  tokio::time::sleep(StdDuration::from_millis(1000)).await;
  let count_after = execution_count.load(Ordering::SeqCst);
  info!("Executions after delete: {}", count_after);
  assert_eq!(count_before, count_after, "Deleted job ran again");

  if let Err(e) = scheduler.get_scheduled_job(42) {
    info!("Lookup after delete: {}", e);
  }

  shutdown.cancel();
  scheduler.wait(&CancellationToken::new()).await;
  Ok(())
}

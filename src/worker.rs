use crate::clock::Nanos;
use crate::job::{Job, WorkerId};
use crate::metrics::SchedulerMetrics;

#[cfg(feature = "job_context")]
use crate::job::context::{JobContext, CURRENT_JOB_CONTEXT};

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// One due firing of a job, as handed from the control loop to a pooled worker.
pub(crate) struct Execution {
  pub job: Arc<dyn Job>,
  pub fire_time: Nanos,
}

/// A pooled worker task.
///
/// Workers share the receiving end of the zero-capacity dispatch channel, so
/// the control loop's send completes exactly when one idle worker accepts the
/// execution.
pub(crate) struct Worker {
  id: WorkerId,
  dispatch_rx: flume::Receiver<Execution>,
  cancel: CancellationToken,
  metrics: SchedulerMetrics,
}

impl Worker {
  pub fn new(
    id: WorkerId,
    dispatch_rx: flume::Receiver<Execution>,
    cancel: CancellationToken,
    metrics: SchedulerMetrics,
  ) -> Self {
    Self {
      id,
      dispatch_rx,
      cancel,
      metrics,
    }
  }

  /// Runs the main loop for the worker task.
  /// Waits for dispatched executions until the scheduler's scope ends.
  pub async fn run(self) {
    debug!(worker_id = self.id, "Worker started. Waiting for jobs...");

    loop {
      tokio::select! {
        biased; // Prioritize checking the shutdown signal

        _ = self.cancel.cancelled() => {
          break;
        }

        received = self.dispatch_rx.recv_async() => match received {
          Ok(Execution { job, fire_time }) => {
            execute_job(job, fire_time, self.cancel.clone(), &self.metrics, Some(self.id)).await;
          }
          // Only once the scheduler and its control loop are both gone.
          Err(_) => {
            warn!(worker_id = self.id, "Dispatch channel closed unexpectedly. Worker exiting.");
            break;
          }
        }
      }
    }

    info!(worker_id = self.id, "Worker task shutting down.");
  }
}

/// Runs a single execution of `job`, shared by every dispatch mode.
///
/// The call to `execute` happens inside the guarded future, so a panic while
/// building the job's future is contained the same way as one raised while
/// polling it. Neither reaches the caller.
pub(crate) async fn execute_job(
  job: Arc<dyn Job>,
  fire_time: Nanos,
  cancel: CancellationToken,
  metrics: &SchedulerMetrics,
  worker_id: Option<WorkerId>,
) {
  let job_key = job.key();
  let job_span = tracing::span!(
    tracing::Level::INFO,
    "job_exec",
    job_key,
    fire_time,
    worker_id = ?worker_id,
    job = job.description().as_str()
  );

  async move {
    metrics
      .executions_active_current
      .fetch_add(1, AtomicOrdering::Relaxed);
    debug!("Starting job execution.");
    let started = Instant::now();

    let run = async { job.execute(cancel).await };

    #[cfg(feature = "job_context")]
    let run = CURRENT_JOB_CONTEXT.scope(
      JobContext {
        key: job_key,
        fire_time,
      },
      run,
    );

    let outcome = AssertUnwindSafe(run).catch_unwind().await;
    let duration = started.elapsed();
    metrics.job_execution_duration.record(duration);

    match outcome {
      Ok(()) => {
        SchedulerMetrics::incr(&metrics.jobs_executed);
        debug!(duration_ms = duration.as_millis(), "Finished job execution.");
      }
      Err(payload) => {
        SchedulerMetrics::incr(&metrics.jobs_panicked);
        error!(
          duration_ms = duration.as_millis(),
          panic = panic_message(&*payload),
          "Job execution panicked."
        );
      }
    }

    metrics
      .executions_active_current
      .fetch_sub(1, AtomicOrdering::Relaxed);
  }
  .instrument(job_span)
  .await
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
  if let Some(message) = payload.downcast_ref::<&'static str>() {
    message
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.as_str()
  } else {
    "<non-string panic payload>"
  }
}

use crate::job::JobKey;

use thiserror::Error;

/// Errors that can occur while building a scheduler with `SchedulerBuilder`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
  #[error("Pooled execution requires a worker count (`max_workers`) greater than zero")]
  ZeroMaxWorkers,
  #[error("Staleness threshold must be greater than zero")]
  ZeroStalenessThreshold,
}

/// Errors reported by a [`Trigger`](crate::trigger::Trigger) when it cannot
/// produce another fire time.
///
/// Any of these returned while the engine reschedules a job removes that job
/// from the scheduler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
  #[error("Trigger has expired and will not fire again.")]
  Expired,
  #[error("Next fire time overflows the nanosecond timestamp range.")]
  Overflow,
  #[error("Invalid trigger expression '{0}'.")]
  InvalidExpression(String),
  #[error("Trigger has no fire time after the given timestamp.")]
  NoFutureFireTime,
}

/// Errors related to submitting jobs via `schedule_job` / `schedule_job_with`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
  /// The trigger refused to compute the initial fire time. Nothing was enqueued.
  #[error("Failed to compute the initial fire time: {0}")]
  Trigger(#[from] TriggerError),
  /// The caller's scope or the scheduler's own scope ended (or the scheduler
  /// is not running) before the job was handed over.
  #[error("Scheduling was cancelled before the job was accepted (scheduler stopped or caller scope ended).")]
  Cancelled,
}

/// Errors related to querying or mutating the scheduled job set
/// (e.g. via `get_scheduled_job`, `delete_job`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
  #[error("Job with key {0} not found.")]
  JobNotFound(JobKey),
}

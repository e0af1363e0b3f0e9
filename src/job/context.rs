use super::JobKey;
use crate::clock::Nanos;

/// Contextual information available to a running job via task-locals.
/// Accessible inside `Job::execute` using `try_get_current_job_context()`
/// or the `job_context!()` macro when the `job_context` feature is enabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JobContext {
  /// Identity key of the executing job.
  pub key: JobKey,
  /// The fire time this execution was scheduled for (nanoseconds since the Unix epoch).
  pub fire_time: Nanos,
}

tokio::task_local! {
    /// Provides access to the current `JobContext` within a job's execution scope.
    /// Set by the scheduler around every `execute` call.
    pub static CURRENT_JOB_CONTEXT: JobContext;
}

/// Attempts to retrieve the current `JobContext` for the executing job.
///
/// Returns `None` when called outside an execution driven by the scheduler.
pub fn try_get_current_job_context() -> Option<JobContext> {
  CURRENT_JOB_CONTEXT.try_with(|ctx| *ctx).ok()
}

/// Retrieves the current `JobContext`, panicking if called outside an
/// execution driven by the scheduler.
///
/// # Panics
/// Panics if the `CURRENT_JOB_CONTEXT` task local has not been set.
#[macro_export]
macro_rules! job_context {
  () => {
    $crate::job::context::CURRENT_JOB_CONTEXT.with(|ctx| *ctx)
  };
}

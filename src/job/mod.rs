#[cfg(feature = "job_context")]
pub mod context;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::clock::Nanos;

// --- Public Type Aliases ---

/// Caller-assigned identity of a job. Lookup and removal key on this value;
/// two live jobs sharing a key is a caller error (the later submission wins).
pub type JobKey = i64;

/// Simple numeric ID assigned to pooled worker tasks for logging.
pub(crate) type WorkerId = usize;

/// The closure type wrapped by [`FunctionJob`].
///
/// Receives the scheduler's cancellation token and returns a future that
/// performs one execution. Errors are the closure's own concern; panics are
/// caught and logged by the engine.
pub type BoxedExecFn = Box<
  dyn Fn(CancellationToken) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>
    + Send
    + Sync
    + 'static,
>;

// --- Core Traits ---

/// A unit of work the scheduler executes whenever its trigger fires.
///
/// `execute` receives the scheduler's cancellation token. Stopping the
/// scheduler cancels it; long-running jobs should observe it to finish early.
pub trait Job: Send + Sync {
  /// Runs one execution of the job.
  fn execute(&self, cancel: CancellationToken) -> BoxFuture<'_, ()>;

  /// Stable identity key used by `get_scheduled_job` and `delete_job`.
  fn key(&self) -> JobKey;

  /// Human-readable description used in logs and scheduled job views.
  fn description(&self) -> String;
}

// --- Function Job ---

/// A [`Job`] backed by a closure.
///
/// ```no_run
/// use firekeeper::{job_fn, FunctionJob};
///
/// let job = FunctionJob::new(7, "say hello", job_fn! {
///   |_cancel| {
///     println!("hello");
///   }
/// });
/// ```
pub struct FunctionJob {
  key: JobKey,
  description: String,
  exec_fn: BoxedExecFn,
}

impl FunctionJob {
  pub fn new<F>(key: JobKey, description: impl Into<String>, exec_fn: F) -> Self
  where
    F: Fn(CancellationToken) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>
      + Send
      + Sync
      + 'static,
  {
    Self {
      key,
      description: description.into(),
      exec_fn: Box::new(exec_fn),
    }
  }

  /// Convenience for wrapping the job in the `Arc` the scheduler expects.
  pub fn into_arc(self) -> Arc<dyn Job> {
    Arc::new(self)
  }
}

impl Job for FunctionJob {
  fn execute(&self, cancel: CancellationToken) -> BoxFuture<'_, ()> {
    (self.exec_fn)(cancel)
  }

  fn key(&self) -> JobKey {
    self.key
  }

  fn description(&self) -> String {
    self.description.clone()
  }
}

impl fmt::Debug for FunctionJob {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FunctionJob")
      .field("key", &self.key)
      .field("description", &self.description)
      .field("exec_fn", &format_args!("<Fn>"))
      .finish()
  }
}

// --- Query Results ---

/// A view of a job currently waiting in the scheduler's queue.
/// Returned by `FireKeeper::get_scheduled_job`.
#[derive(Clone)]
pub struct ScheduledJob {
  /// The job itself.
  pub job: Arc<dyn Job>,
  /// Description of the trigger driving this job.
  pub trigger_description: String,
  /// When the job fires next, in nanoseconds since the Unix epoch.
  pub next_fire_time: Nanos,
}

impl ScheduledJob {
  pub fn key(&self) -> JobKey {
    self.job.key()
  }
}

impl fmt::Debug for ScheduledJob {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ScheduledJob")
      .field("key", &self.job.key())
      .field("job", &self.job.description())
      .field("trigger_description", &self.trigger_description)
      .field("next_fire_time", &self.next_fire_time)
      .finish()
  }
}

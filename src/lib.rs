//! FireKeeper: An In-Process Job Scheduler
//!
//! Runs recurring or one-off jobs at the moments their triggers dictate, while
//! staying responsive to new submissions, removals and shutdown.
//!
//! # Features
//!
//! - A time-ordered queue with O(log n) insertion and removal by key.
//! - A single control loop that always sleeps exactly until the earliest
//!   queued job is due, however many submissions race with it.
//! - Three execution modes, chosen on the builder:
//!   - `Serialized`: executions run one after another on the control loop.
//!   - `Pooled`: a fixed pool of worker tasks bounds concurrency.
//!   - `Unconstrained` (default): a task per execution.
//! - Built-in triggers: [`SimpleTrigger`] (fixed interval), [`RunOnceTrigger`]
//!   and, with the `cron_schedule` feature, `CronTrigger`.
//! - Closure-backed jobs via [`FunctionJob`] and the [`job_fn!`] macro.
//! - Hierarchical shutdown through a parent [`CancellationToken`] or
//!   [`FireKeeper::stop`], and [`FireKeeper::wait`] to drain every task.
//! - Fires that fall too far behind (30 s by default) are skipped, not replayed.
//! - Panicking jobs are contained and counted.
//! - Built-in metrics collection (snapshot via [`FireKeeper::metrics_snapshot`]).
//! - Optional task-local job context (`JobContext`, `job_context` feature).
//! - Optional Serde support for [`MetricsSnapshot`] (`serde` feature).
//!
//! # Usage
//!
//! ```no_run
//! use firekeeper::{job_fn, CancellationToken, FireKeeper, FunctionJob, RunOnceTrigger, SimpleTrigger};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // tracing_subscriber::fmt().with_env_filter("warn,firekeeper=info").init();
//!
//!     let scheduler = FireKeeper::builder().max_workers(2).build()?;
//!     let shutdown = CancellationToken::new();
//!     scheduler.start(&shutdown);
//!
//!     let counter = Arc::new(AtomicUsize::new(0));
//!     let job_counter = counter.clone();
//!     let ticking = FunctionJob::new(1, "tick", job_fn! {
//!         {
//!             let counter = job_counter.clone();
//!         }
//!         |_cancel| {
//!             counter.fetch_add(1, Ordering::SeqCst);
//!         }
//!     });
//!     scheduler
//!         .schedule_job(ticking.into_arc(), Arc::new(SimpleTrigger::new(Duration::from_millis(500))))
//!         .await?;
//!
//!     let once = FunctionJob::new(2, "once", job_fn! {
//!         |cancel| {
//!             tokio::select! {
//!                 _ = cancel.cancelled() => {}
//!                 _ = tokio::time::sleep(Duration::from_millis(50)) => println!("ran once"),
//!             }
//!         }
//!     });
//!     scheduler
//!         .schedule_job(once.into_arc(), Arc::new(RunOnceTrigger::new(Duration::from_secs(1))))
//!         .await?;
//!
//!     tokio::time::sleep(Duration::from_secs(3)).await;
//!     println!("keys: {:?}", scheduler.job_keys());
//!     println!("metrics: {:#?}", scheduler.metrics_snapshot());
//!
//!     shutdown.cancel();
//!     scheduler.wait(&CancellationToken::new()).await;
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! Use the [`SchedulerBuilder`] to configure the scheduler:
//! - `execution_mode` (or `serialized` / `max_workers` / `unconstrained`).
//! - `staleness_threshold`: how late a fire may be and still run.
//! - `clock`: the time source; [`ManualClock`] helps in tests.
//!
//! # Job Lifecycle
//!
//! - `schedule_job` asks the trigger for the first fire time (seeded with now)
//!   and hands the job to the engine. Scheduling a key that is already queued
//!   replaces the queued job.
//! - After each fire the trigger is asked again, seeded with the previous
//!   *scheduled* fire time. A trigger error removes the job.
//! - `delete_job` and `clear` only touch queued jobs; running executions finish
//!   normally.
//!
//! # Observability
//!
//! - Retrieve metrics snapshots using [`FireKeeper::metrics_snapshot`]. See [`MetricsSnapshot`].
//! - Inspect the queue with [`FireKeeper::job_keys`] and [`FireKeeper::get_scheduled_job`].
//! - Integrate with the `tracing` crate for detailed logs. Every execution runs
//!   inside a `job_exec` span.

// --- Feature-gated Documentation ---

// This empty module attaches the documentation block below only when
// the `job_context` feature is enabled during doc generation.
#[cfg(all(doc, feature = "job_context"))]
pub mod job_context_docs {
    //! # Accessing Job Context (`job_context` feature)
    //!
    //! When the `job_context` feature is enabled, code running inside a job
    //! can read the key and scheduled fire time of the current execution
    //! through Tokio's task-local context.
    //!
    //! 1.  **`try_get_current_job_context() -> Option<JobContext>`**: Returns
    //!     `None` if called outside a FireKeeper execution.
    //! 2.  **`job_context!() -> JobContext`**: **Panics** if called outside a
    //!     FireKeeper execution.
    //!
    //! ```no_run
    //! # #[cfg(feature = "job_context")] {
    //! use firekeeper::{job_context, job_fn, try_get_current_job_context, FunctionJob};
    //!
    //! let job = FunctionJob::new(5, "context aware", job_fn! {
    //!     |_cancel| {
    //!         if let Some(ctx) = try_get_current_job_context() {
    //!             println!("job {} scheduled for {}", ctx.key, ctx.fire_time);
    //!         }
    //!         let required = job_context!();
    //!         println!("fire time: {}", required.fire_time);
    //!     }
    //! });
    //! # }
    //! ```
    //!
    //! The context is set by the engine around every call to `Job::execute`,
    //! in every execution mode.
}

// Declare modules within the crate
pub mod clock;
mod coordinator;
pub mod error;
pub mod job;
mod macros;
pub mod metrics;
mod queue;
pub mod scheduler;
mod timer;
pub mod trigger;
mod worker;

// --- Public Re-exports ---

// Core scheduler components
pub use scheduler::{ExecutionMode, FireKeeper, SchedulerBuilder, DEFAULT_STALENESS_THRESHOLD};

// Cancellation scopes are part of the public API (and of `job_fn!`).
pub use tokio_util::sync::CancellationToken;

// Time
pub use clock::{Clock, ManualClock, Nanos, SystemClock};

// Error types
pub use error::{BuildError, QueryError, ScheduleError, TriggerError};

// Job related types
pub use job::{BoxedExecFn, FunctionJob, Job, JobKey, ScheduledJob};
// Conditionally export context items
#[cfg(feature = "job_context")]
pub use job::context::{try_get_current_job_context, JobContext};

// Triggers
#[cfg(feature = "cron_schedule")]
pub use trigger::CronTrigger;
pub use trigger::{RunOnceTrigger, SimpleTrigger, Trigger};

// Metrics related types
pub use metrics::MetricsSnapshot;

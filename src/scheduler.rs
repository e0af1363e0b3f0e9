use crate::clock::{duration_nanos, Clock, Nanos, SystemClock};
use crate::coordinator::{Coordinator, Dispatcher, Intake, IntakeReader};
use crate::error::{BuildError, QueryError, ScheduleError};
use crate::job::{Job, JobKey, ScheduledJob};
use crate::metrics::{MetricsSnapshot, SchedulerMetrics};
use crate::queue::{TimeQueue, WorkItem};
use crate::trigger::Trigger;
use crate::worker::{Execution, Worker};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Fires older than this, relative to now, are rescheduled without running.
pub const DEFAULT_STALENESS_THRESHOLD: Duration = Duration::from_secs(30);

/// Specifies how the engine runs jobs once they are due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
  /// The control loop awaits each execution before looking at the queue
  /// again. Executions never overlap and start in fire-time order.
  Serialized,
  /// A fixed pool of `workers` tasks receives due jobs over an unbuffered
  /// channel. At most `workers` executions run at once; the control loop
  /// waits for a free worker before moving on.
  Pooled { workers: usize },
  /// Every execution gets its own task. The control loop never waits.
  #[default]
  Unconstrained,
}

/// Queue and lifecycle state, guarded by a single lock shared between the
/// façade, the control loop and the intake reader.
#[derive(Debug, Default)]
pub(crate) struct EngineState {
  pub queue: TimeQueue,
  pub started: bool,
  /// Scope of the current run. `Some` exactly while started.
  pub run: Option<CancellationToken>,
  /// Incremented on every start.
  pub generation: u64,
}

pub(crate) type SharedState = Arc<Mutex<EngineState>>;

/// Builder for configuring and creating a [`FireKeeper`] scheduler instance.
///
/// # Example
///
/// ```no_run
/// use firekeeper::FireKeeper;
/// use std::time::Duration;
///
/// # fn build() -> Result<(), Box<dyn std::error::Error>> {
/// let scheduler = FireKeeper::builder()
///     .max_workers(4)
///     .staleness_threshold(Duration::from_secs(10))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SchedulerBuilder {
  mode: ExecutionMode,
  staleness_threshold: Duration,
  clock: Arc<dyn Clock>,
}

impl Default for SchedulerBuilder {
  fn default() -> Self {
    Self {
      mode: ExecutionMode::default(),
      staleness_threshold: DEFAULT_STALENESS_THRESHOLD,
      clock: Arc::new(SystemClock),
    }
  }
}

impl SchedulerBuilder {
  /// Creates a new builder with default settings.
  /// - `execution_mode`: `Unconstrained`.
  /// - `staleness_threshold`: 30 seconds.
  /// - `clock`: [`SystemClock`].
  pub fn new() -> Self {
    Self::default()
  }

  pub fn execution_mode(mut self, mode: ExecutionMode) -> Self {
    self.mode = mode;
    self
  }

  /// Run every execution inline on the control loop.
  pub fn serialized(self) -> Self {
    self.execution_mode(ExecutionMode::Serialized)
  }

  /// Run executions on a pool of `count` workers. Must be greater than 0.
  pub fn max_workers(self, count: usize) -> Self {
    self.execution_mode(ExecutionMode::Pooled { workers: count })
  }

  /// Spawn a task per execution (the default).
  pub fn unconstrained(self) -> Self {
    self.execution_mode(ExecutionMode::Unconstrained)
  }

  /// Sets how far behind a fire may fall before it is skipped.
  /// Skipped fires are still rescheduled.
  pub fn staleness_threshold(mut self, threshold: Duration) -> Self {
    self.staleness_threshold = threshold;
    self
  }

  /// Replaces the time source. Mostly useful with [`ManualClock`](crate::ManualClock) in tests.
  pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  /// Builds a stopped `FireKeeper`. No task is spawned until
  /// [`FireKeeper::start`].
  ///
  /// # Errors
  ///
  /// - [`BuildError::ZeroMaxWorkers`]: pooled mode with zero workers.
  /// - [`BuildError::ZeroStalenessThreshold`]: a zero staleness threshold.
  pub fn build(self) -> Result<FireKeeper, BuildError> {
    if matches!(self.mode, ExecutionMode::Pooled { workers: 0 }) {
      return Err(BuildError::ZeroMaxWorkers);
    }
    if self.staleness_threshold.is_zero() {
      return Err(BuildError::ZeroStalenessThreshold);
    }

    // Both handoffs are rendezvous channels: a send completes only once the
    // receiving side has taken the item.
    let (intake_tx, intake_rx) = flume::bounded::<Intake>(0);
    let (interrupt_tx, interrupt_rx) = flume::bounded::<Nanos>(1);
    let dispatch = match self.mode {
      ExecutionMode::Pooled { .. } => Some(flume::bounded::<Execution>(0)),
      _ => None,
    };

    // Closed until the first start so `wait` on a fresh scheduler returns at once.
    let tracker = TaskTracker::new();
    tracker.close();

    Ok(FireKeeper {
      inner: Arc::new(Inner {
        state: Arc::new(Mutex::new(EngineState::default())),
        mode: self.mode,
        staleness_threshold: duration_nanos(self.staleness_threshold),
        clock: self.clock,
        metrics: SchedulerMetrics::new(),
        submissions: AtomicU64::new(0),
        tracker,
        intake_tx,
        intake_rx,
        interrupt_tx,
        interrupt_rx,
        dispatch,
      }),
    })
  }
}

struct Inner {
  state: SharedState,
  mode: ExecutionMode,
  staleness_threshold: Nanos,
  clock: Arc<dyn Clock>,
  metrics: SchedulerMetrics,
  /// Sequence source for `schedule_job` calls.
  submissions: AtomicU64,
  tracker: TaskTracker,
  // Channels live as long as the scheduler and are reused across restarts.
  intake_tx: flume::Sender<Intake>,
  intake_rx: flume::Receiver<Intake>,
  interrupt_tx: flume::Sender<Nanos>,
  interrupt_rx: flume::Receiver<Nanos>,
  dispatch: Option<(flume::Sender<Execution>, flume::Receiver<Execution>)>,
}

impl Inner {
  /// Stops the current run. With `Some(generation)` only that run is stopped.
  fn stop_run(&self, generation: Option<u64>) {
    let mut state = self.state.lock();
    if !state.started {
      return;
    }
    if generation.is_some_and(|generation| generation != state.generation) {
      return;
    }
    state.started = false;
    if let Some(run) = state.run.take() {
      run.cancel();
    }
    self.tracker.close();
    info!(generation = state.generation, "Scheduler stopped.");
  }
}

impl Drop for Inner {
  fn drop(&mut self) {
    // The last handle is gone; nothing could stop the tasks otherwise.
    if let Some(run) = self.state.lock().run.take() {
      run.cancel();
    }
  }
}

/// An in-process job scheduler.
///
/// Jobs are paired with a [`Trigger`] and kept in a time-ordered queue. A
/// control loop sleeps until the earliest job is due, runs it according to
/// the configured [`ExecutionMode`] and feeds it back with the trigger's
/// next fire time.
///
/// `FireKeeper` is a cheap handle; clones share the same engine.
///
/// Use [`FireKeeper::builder()`] to create and configure an instance.
#[derive(Clone)]
pub struct FireKeeper {
  inner: Arc<Inner>,
}

impl FireKeeper {
  /// Returns a builder to configure and create a `FireKeeper` instance.
  pub fn builder() -> SchedulerBuilder {
    SchedulerBuilder::new()
  }

  /// Starts the engine under `parent`. Cancelling `parent` stops it.
  ///
  /// Spawns the control loop, the intake reader, a watcher linking `parent`
  /// to [`stop`](Self::stop) and, in pooled mode, the workers. Calling
  /// `start` on a running scheduler does nothing. A stopped scheduler can be
  /// started again and keeps its queued jobs.
  ///
  /// # Panics
  ///
  /// Panics if called outside a Tokio runtime.
  pub fn start(&self, parent: &CancellationToken) {
    let inner = &self.inner;
    let (run, generation) = {
      let mut state = inner.state.lock();
      if state.started {
        debug!("Scheduler already started.");
        return;
      }
      state.started = true;
      state.generation += 1;
      let run = parent.child_token();
      state.run = Some(run.clone());
      inner.tracker.reopen();
      (run, state.generation)
    };

    let watcher_scope = run.clone();
    let weak: Weak<Inner> = Arc::downgrade(inner);
    inner.tracker.spawn(async move {
      watcher_scope.cancelled().await;
      if let Some(inner) = weak.upgrade() {
        inner.stop_run(Some(generation));
      }
    });

    let reader = IntakeReader::new(
      inner.state.clone(),
      inner.metrics.clone(),
      inner.intake_rx.clone(),
      inner.interrupt_tx.clone(),
      run.clone(),
    );
    inner.tracker.spawn(reader.run());

    let dispatcher = match (inner.mode, &inner.dispatch) {
      (ExecutionMode::Serialized, _) => Dispatcher::Serialized,
      (ExecutionMode::Pooled { workers }, Some((dispatch_tx, dispatch_rx))) => {
        for worker_id in 0..workers {
          let worker = Worker::new(
            worker_id,
            dispatch_rx.clone(),
            run.clone(),
            inner.metrics.clone(),
          );
          inner.tracker.spawn(worker.run());
        }
        Dispatcher::Pooled(dispatch_tx.clone())
      }
      (ExecutionMode::Pooled { .. }, None) => {
        // `build` always creates the channel for pooled mode.
        warn!("Dispatch channel missing, falling back to unconstrained execution.");
        Dispatcher::Unconstrained(inner.tracker.clone())
      }
      (ExecutionMode::Unconstrained, _) => Dispatcher::Unconstrained(inner.tracker.clone()),
    };

    let coordinator = Coordinator::new(
      inner.state.clone(),
      inner.clock.clone(),
      inner.metrics.clone(),
      inner.intake_tx.clone(),
      inner.interrupt_rx.clone(),
      dispatcher,
      inner.staleness_threshold,
      run,
      generation,
    );
    inner.tracker.spawn(coordinator.run());

    info!(generation, mode = ?inner.mode, "Scheduler started.");
  }

  pub fn is_started(&self) -> bool {
    self.inner.state.lock().started
  }

  /// Stops the engine. Idempotent and non-blocking.
  ///
  /// Cancels the token passed to every spawned task and every running job.
  /// Use [`wait`](Self::wait) to observe termination. Queued jobs stay in the
  /// queue.
  pub fn stop(&self) {
    self.inner.stop_run(None);
  }

  /// Waits until every task spawned by the scheduler has exited, including
  /// unconstrained executions, or until `scope` is cancelled.
  ///
  /// Returns immediately if the scheduler was never started. While the
  /// scheduler is running this only returns through `scope`.
  pub async fn wait(&self, scope: &CancellationToken) {
    tokio::select! {
      _ = self.inner.tracker.wait() => {}
      _ = scope.cancelled() => {}
    }
  }

  /// Schedules `job` to run whenever `trigger` fires.
  ///
  /// Equivalent to [`schedule_job_with`](Self::schedule_job_with) with a
  /// scope that never ends.
  pub async fn schedule_job(
    &self,
    job: Arc<dyn Job>,
    trigger: Arc<dyn Trigger>,
  ) -> Result<(), ScheduleError> {
    self
      .schedule_job_with(&CancellationToken::new(), job, trigger)
      .await
  }

  /// Schedules `job` to run whenever `trigger` fires.
  ///
  /// The first fire time is `trigger.next_fire_time(now)`. The call waits
  /// until the engine has queued the job, so once it returns `Ok` the job is
  /// visible to [`job_keys`](Self::job_keys). A job with the key of a queued
  /// job replaces it, and the later of two calls with the same key wins even
  /// if the earlier job is executing at the time.
  ///
  /// # Errors
  ///
  /// - [`ScheduleError::Cancelled`]: the scheduler is not running, or it stopped
  ///   or `scope` was cancelled before the job was queued. A job handed over
  ///   just before a stop can still be queued when the scheduler restarts.
  /// - [`ScheduleError::Trigger`]: the trigger produced no initial fire time.
  pub async fn schedule_job_with(
    &self,
    scope: &CancellationToken,
    job: Arc<dyn Job>,
    trigger: Arc<dyn Trigger>,
  ) -> Result<(), ScheduleError> {
    let run = self
      .inner
      .state
      .lock()
      .run
      .clone()
      .ok_or(ScheduleError::Cancelled)?;

    let first_fire_time = trigger.next_fire_time(self.inner.clock.now_nanos())?;
    let job_key = job.key();
    let submission = self.inner.submissions.fetch_add(1, Ordering::Relaxed);
    let item = WorkItem::new(job, trigger, first_fire_time, submission);
    let (admitted_tx, admitted_rx) = oneshot::channel();
    let intake = Intake {
      item,
      admitted: Some(admitted_tx),
    };

    tokio::select! {
      biased;
      _ = scope.cancelled() => return Err(ScheduleError::Cancelled),
      _ = run.cancelled() => return Err(ScheduleError::Cancelled),
      sent = self.inner.intake_tx.send_async(intake) => {
        sent.map_err(|_| ScheduleError::Cancelled)?;
      }
    }

    // Handed over; the intake reader acknowledges once the queue holds it.
    tokio::select! {
      biased;
      admitted = admitted_rx => admitted.map_err(|_| ScheduleError::Cancelled)?,
      _ = scope.cancelled() => return Err(ScheduleError::Cancelled),
      _ = run.cancelled() => return Err(ScheduleError::Cancelled),
    }

    debug!(job_key, submission, first_fire_time, "Job scheduled.");
    Ok(())
  }

  /// Keys of every job currently waiting in the queue, in no particular order.
  ///
  /// A job that is executing right now is not in the queue until it has been
  /// rescheduled.
  pub fn job_keys(&self) -> Vec<JobKey> {
    self
      .inner
      .state
      .lock()
      .queue
      .iter()
      .map(WorkItem::key)
      .collect()
  }

  /// Looks up a queued job by key.
  ///
  /// # Errors
  ///
  /// - [`QueryError::JobNotFound`]: no queued job has that key.
  pub fn get_scheduled_job(&self, key: JobKey) -> Result<ScheduledJob, QueryError> {
    let state = self.inner.state.lock();
    let item = state
      .queue
      .iter()
      .find(|item| item.key() == key)
      .ok_or(QueryError::JobNotFound(key))?;
    Ok(ScheduledJob {
      job: item.job.clone(),
      trigger_description: item.trigger.description(),
      next_fire_time: item.next_fire_time,
    })
  }

  /// Removes a queued job so it never fires again.
  ///
  /// An execution already in progress is not interrupted, and a job that is
  /// executing at the time of the call is not in the queue (see
  /// [`job_keys`](Self::job_keys)).
  ///
  /// # Errors
  ///
  /// - [`QueryError::JobNotFound`]: no queued job has that key.
  pub fn delete_job(&self, key: JobKey) -> Result<(), QueryError> {
    {
      let mut state = self.inner.state.lock();
      let position = state
        .queue
        .position_of(key)
        .ok_or(QueryError::JobNotFound(key))?;
      state.queue.remove_at(position);
      self.inner.metrics.set_queue_len(state.queue.len());
    }
    SchedulerMetrics::incr(&self.inner.metrics.jobs_removed);
    debug!(job_key = key, "Job deleted.");
    Ok(())
  }

  /// Drops every queued job. Executions in progress are unaffected and will
  /// reschedule themselves when they finish.
  pub fn clear(&self) {
    let removed = {
      let mut state = self.inner.state.lock();
      let removed = state.queue.len();
      state.queue = TimeQueue::new();
      self.inner.metrics.set_queue_len(0);
      removed
    };
    debug!(removed, "Queue cleared.");
  }

  /// Retrieves a snapshot of the current scheduler metrics.
  pub fn metrics_snapshot(&self) -> MetricsSnapshot {
    self.inner.metrics.snapshot()
  }
}

impl fmt::Debug for FireKeeper {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.inner.state.lock();
    f.debug_struct("FireKeeper")
      .field("mode", &self.inner.mode)
      .field("started", &state.started)
      .field("generation", &state.generation)
      .field("queued", &state.queue.len())
      .finish()
  }
}

use crate::clock::{Clock, Nanos};
use crate::error::TriggerError;
use crate::metrics::SchedulerMetrics;
use crate::queue::WorkItem;
use crate::scheduler::SharedState;
use crate::timer::WakeTimer;
use crate::worker::{execute_job, Execution};

use std::sync::Arc;

use flume::TrySendError;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

/// A work item on its way into the queue.
pub(crate) struct Intake {
  pub item: WorkItem,
  /// Present for `schedule_job` submissions. Fired once the item has been
  /// inserted, or once it has been discarded in favour of a newer submission.
  pub admitted: Option<oneshot::Sender<()>>,
}

/// How the control loop runs a due job.
pub(crate) enum Dispatcher {
  /// Await the execution inline; nothing else fires meanwhile.
  Serialized,
  /// Hand the execution to one of the pooled workers.
  Pooled(flume::Sender<Execution>),
  /// Spawn a tracked task per execution and move on.
  Unconstrained(TaskTracker),
}

/// Why the control loop woke up.
enum Wake {
  Cancelled,
  Timer(Nanos),
  Interrupt,
  /// Unreachable while the scheduler holds both ends of the interrupt channel.
  Disconnected,
}

/// The engine's control loop.
///
/// Sleeps until the head of the queue is due, pops it, dispatches it and
/// feeds it back through the intake channel with its next fire time. The
/// wake target is re-derived from the queue head on every iteration; the
/// interrupt channel only shortens a sleep, it never carries the target.
pub(crate) struct Coordinator {
  state: SharedState,
  clock: Arc<dyn Clock>,
  metrics: SchedulerMetrics,
  intake_tx: flume::Sender<Intake>,
  interrupt_rx: flume::Receiver<Nanos>,
  dispatcher: Dispatcher,
  staleness_threshold: Nanos,
  cancel: CancellationToken,
  timer: WakeTimer,
  generation: u64,
}

impl Coordinator {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    state: SharedState,
    clock: Arc<dyn Clock>,
    metrics: SchedulerMetrics,
    intake_tx: flume::Sender<Intake>,
    interrupt_rx: flume::Receiver<Nanos>,
    dispatcher: Dispatcher,
    staleness_threshold: Nanos,
    cancel: CancellationToken,
    generation: u64,
  ) -> Self {
    let timer = WakeTimer::new(clock.clone());
    Self {
      state,
      clock,
      metrics,
      intake_tx,
      interrupt_rx,
      dispatcher,
      staleness_threshold,
      cancel,
      timer,
      generation,
    }
  }

  /// Runs the control loop until the scheduler's scope is cancelled.
  pub async fn run(mut self) {
    info!(generation = self.generation, "Control loop started.");

    loop {
      let head = self.head_fire_time();

      let wake = match head {
        None => {
          self.timer.disarm();
          tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Wake::Cancelled,
            signal = self.interrupt_rx.recv_async() => match signal {
              Ok(_) => Wake::Interrupt,
              Err(_) => Wake::Disconnected,
            },
          }
        }
        Some(target) => {
          self.timer.arm(target);
          tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Wake::Cancelled,
            target = self.timer.fired() => Wake::Timer(target),
            signal = self.interrupt_rx.recv_async() => match signal {
              Ok(_) => Wake::Interrupt,
              Err(_) => Wake::Disconnected,
            },
          }
        }
      };

      match wake {
        Wake::Cancelled => break,
        Wake::Timer(target) => {
          trace!(target, "Wake timer fired.");
          self.fire().await;
        }
        Wake::Interrupt => {
          trace!("Interrupted by intake.");
        }
        Wake::Disconnected => {
          warn!("Interrupt channel closed unexpectedly. Control loop exiting.");
          break;
        }
      }
    }

    info!(generation = self.generation, "Control loop finished.");
  }

  fn head_fire_time(&self) -> Option<Nanos> {
    self
      .state
      .lock()
      .queue
      .peek_min()
      .map(|item| item.next_fire_time)
  }

  /// Pops the head if it is due, runs it unless stale, then reschedules it.
  async fn fire(&mut self) {
    let now = self.clock.now_nanos();

    let popped = {
      let mut state = self.state.lock();
      let due = state
        .queue
        .peek_min()
        .is_some_and(|head| head.next_fire_time <= now);
      if !due {
        return;
      }
      let popped = state.queue.pop_min();
      self.metrics.set_queue_len(state.queue.len());
      popped
    };
    let Some(mut item) = popped else {
      return;
    };

    let job_key = item.key();
    let fire_time = item.next_fire_time;

    if fire_time < now.saturating_sub(self.staleness_threshold) {
      SchedulerMetrics::incr(&self.metrics.jobs_skipped_stale);
      warn!(
        job_key,
        fire_time,
        lag_ms = now.saturating_sub(fire_time) / 1_000_000,
        "Skipping stale execution."
      );
    } else if !self.dispatch(&item).await {
      debug!(job_key, fire_time, "Scope ended during dispatch, job abandoned.");
      return;
    }

    match item.trigger.next_fire_time(fire_time) {
      Ok(next) => {
        item.next_fire_time = next;
        self.reschedule(item).await;
      }
      Err(TriggerError::Expired) => {
        SchedulerMetrics::incr(&self.metrics.jobs_exhausted);
        debug!(job_key, "Trigger expired, job removed.");
      }
      Err(error) => {
        SchedulerMetrics::incr(&self.metrics.jobs_exhausted);
        warn!(job_key, %error, "Trigger produced no further fire time, job removed.");
      }
    }
  }

  /// Returns `false` if the scope ended before the execution was handed over.
  async fn dispatch(&self, item: &WorkItem) -> bool {
    let job = item.job.clone();
    let fire_time = item.next_fire_time;

    match &self.dispatcher {
      Dispatcher::Serialized => {
        execute_job(job, fire_time, self.cancel.clone(), &self.metrics, None).await;
        true
      }
      Dispatcher::Pooled(dispatch_tx) => {
        tokio::select! {
          biased;
          _ = self.cancel.cancelled() => false,
          sent = dispatch_tx.send_async(Execution { job, fire_time }) => {
            if sent.is_err() {
              warn!(job_key = item.key(), "Dispatch channel closed, execution dropped.");
            } else {
              trace!(job_key = item.key(), fire_time, "Dispatched to worker.");
            }
            true
          }
        }
      }
      Dispatcher::Unconstrained(tracker) => {
        let cancel = self.cancel.clone();
        let metrics = self.metrics.clone();
        tracker.spawn(async move {
          execute_job(job, fire_time, cancel, &metrics, None).await;
        });
        true
      }
    }
  }

  async fn reschedule(&self, item: WorkItem) {
    let job_key = item.key();
    let next_fire_time = item.next_fire_time;
    tokio::select! {
      biased;
      _ = self.cancel.cancelled() => {
        debug!(job_key, "Scope ended before reschedule, job abandoned.");
      }
      sent = self.intake_tx.send_async(Intake { item, admitted: None }) => {
        if sent.is_ok() {
          SchedulerMetrics::incr(&self.metrics.jobs_rescheduled);
          debug!(job_key, next_fire_time, "Job rescheduled.");
        } else {
          warn!(job_key, "Intake channel closed, job dropped.");
        }
      }
    }
  }
}

/// Single consumer of the intake channel.
///
/// Inserts every received item into the queue and nudges the control loop
/// with the new head fire time. A queued item with the same key is replaced,
/// unless it comes from a newer submission, in which case the incoming item
/// is discarded.
pub(crate) struct IntakeReader {
  state: SharedState,
  metrics: SchedulerMetrics,
  intake_rx: flume::Receiver<Intake>,
  interrupt_tx: flume::Sender<Nanos>,
  cancel: CancellationToken,
}

impl IntakeReader {
  pub fn new(
    state: SharedState,
    metrics: SchedulerMetrics,
    intake_rx: flume::Receiver<Intake>,
    interrupt_tx: flume::Sender<Nanos>,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      state,
      metrics,
      intake_rx,
      interrupt_tx,
      cancel,
    }
  }

  pub async fn run(self) {
    debug!("Intake reader started.");
    loop {
      tokio::select! {
        biased;
        _ = self.cancel.cancelled() => break,
        received = self.intake_rx.recv_async() => match received {
          Ok(intake) => self.admit(intake),
          // Only once the scheduler and its control loop are both gone.
          Err(_) => {
            warn!("Intake channel closed unexpectedly. Intake reader exiting.");
            break;
          }
        }
      }
    }
    debug!("Intake reader finished.");
  }

  fn admit(&self, intake: Intake) {
    let Intake { item, admitted } = intake;
    let job_key = item.key();
    let fire_time = item.next_fire_time;
    let submission = item.submission;

    // `None` when a newer submission for this key is already queued.
    let head = {
      let mut state = self.state.lock();
      let queued = state.queue.position_of(job_key);
      let newer_queued = queued
        .and_then(|position| state.queue.get(position))
        .is_some_and(|queued| queued.submission > submission);
      if newer_queued {
        None
      } else {
        if let Some(position) = queued {
          let replaced = state.queue.remove_at(position);
          debug!(
            job_key,
            replaced_fire_time = replaced.next_fire_time,
            replaced_submission = replaced.submission,
            "Replacing queued job with the same key."
          );
        }
        state.queue.insert(item);
        self.metrics.set_queue_len(state.queue.len());
        state.queue.peek_min().map(|head| head.next_fire_time)
      }
    };

    if let Some(admitted) = admitted {
      SchedulerMetrics::incr(&self.metrics.jobs_submitted);
      // The submitter may have given up already.
      let _ = admitted.send(());
    }

    let Some(head) = head else {
      SchedulerMetrics::incr(&self.metrics.jobs_superseded);
      debug!(job_key, submission, "A newer submission is queued, item discarded.");
      return;
    };
    trace!(job_key, fire_time, "Job admitted to queue.");

    match self.interrupt_tx.try_send(head) {
      Ok(()) => {}
      Err(TrySendError::Full(_)) => {
        SchedulerMetrics::incr(&self.metrics.interrupts_dropped);
        trace!(head, "Interrupt already pending, signal dropped.");
      }
      Err(TrySendError::Disconnected(_)) => {}
    }
  }
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// --- Simple Histogram Implementation ---

/// A basic concurrent histogram storing count and sum.
///
/// Suitable for simple latency tracking without detailed percentile information.
#[derive(Debug, Default)]
pub struct SimpleHistogram {
  count: AtomicUsize,
  sum_micros: AtomicUsize,
}

impl SimpleHistogram {
  /// Records a duration observation in the histogram.
  pub fn record(&self, duration: Duration) {
    self.count.fetch_add(1, Ordering::Relaxed);
    self.sum_micros.fetch_add(
      duration.as_micros().try_into().unwrap_or(usize::MAX),
      Ordering::Relaxed,
    );
  }

  /// Gets the total number of observations recorded.
  pub fn get_count(&self) -> usize {
    self.count.load(Ordering::Relaxed)
  }

  /// Gets the total sum of durations recorded (in microseconds).
  pub fn get_sum_micros(&self) -> usize {
    self.sum_micros.load(Ordering::Relaxed)
  }
}

// --- Main Metrics Struct (Internal State) ---

/// Internal state for tracking scheduler metrics using atomic counters.
///
/// Cloned into the control loop, the intake reader and every worker. Cloning
/// only clones the `Arc`s.
#[derive(Debug, Clone, Default)]
pub struct SchedulerMetrics {
  // --- Counters (Monotonically increasing) ---
  /// `schedule_job` submissions received by the intake reader.
  pub jobs_submitted: Arc<AtomicUsize>,
  /// Work items fed back into the queue after a fire.
  pub jobs_rescheduled: Arc<AtomicUsize>,
  /// Executions that ran to completion without panicking.
  pub jobs_executed: Arc<AtomicUsize>,
  /// Executions that panicked.
  pub jobs_panicked: Arc<AtomicUsize>,
  /// Fires skipped because the item was older than the staleness threshold.
  pub jobs_skipped_stale: Arc<AtomicUsize>,
  /// Jobs dropped because their trigger produced no further fire time.
  pub jobs_exhausted: Arc<AtomicUsize>,
  /// Jobs removed through `delete_job` (not counting `clear`).
  pub jobs_removed: Arc<AtomicUsize>,
  /// Items discarded on arrival because a newer submission with the same key
  /// was already queued.
  pub jobs_superseded: Arc<AtomicUsize>,
  /// Wake signals dropped because one was already pending.
  pub interrupts_dropped: Arc<AtomicUsize>,

  // --- Gauges (Current state values) ---
  /// Items currently waiting in the time-ordered queue.
  pub queue_len_current: Arc<AtomicUsize>,
  /// Executions currently in progress, across all dispatch modes.
  pub executions_active_current: Arc<AtomicUsize>,

  // --- Histograms/Summaries ---
  /// Histogram tracking the execution duration of jobs (in microseconds).
  pub job_execution_duration: Arc<SimpleHistogram>,
}

impl SchedulerMetrics {
  /// Creates a new `SchedulerMetrics` instance with all counters initialized to zero.
  pub fn new() -> Self {
    Self::default()
  }

  pub(crate) fn incr(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn set_queue_len(&self, len: usize) {
    self.queue_len_current.store(len, Ordering::Relaxed);
  }

  /// Creates a snapshot of the current metric values.
  ///
  /// Values are read independently with `Relaxed` ordering, so counters may be
  /// mutually inconsistent by an in-flight event or two.
  pub fn snapshot(&self) -> MetricsSnapshot {
    let order = Ordering::Relaxed;

    MetricsSnapshot {
      jobs_submitted: self.jobs_submitted.load(order),
      jobs_rescheduled: self.jobs_rescheduled.load(order),
      jobs_executed: self.jobs_executed.load(order),
      jobs_panicked: self.jobs_panicked.load(order),
      jobs_skipped_stale: self.jobs_skipped_stale.load(order),
      jobs_exhausted: self.jobs_exhausted.load(order),
      jobs_removed: self.jobs_removed.load(order),
      jobs_superseded: self.jobs_superseded.load(order),
      interrupts_dropped: self.interrupts_dropped.load(order),
      queue_len_current: self.queue_len_current.load(order),
      executions_active_current: self.executions_active_current.load(order),
      job_execution_duration_count: self.job_execution_duration.get_count(),
      job_execution_duration_sum_micros: self.job_execution_duration.get_sum_micros(),
    }
  }
}

// --- Metrics Snapshot Struct (Public Data) ---

/// A snapshot of the scheduler's metrics at a specific point in time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricsSnapshot {
  // Counters
  pub jobs_submitted: usize,
  pub jobs_rescheduled: usize,
  pub jobs_executed: usize,
  pub jobs_panicked: usize,
  pub jobs_skipped_stale: usize,
  pub jobs_exhausted: usize,
  pub jobs_removed: usize,
  pub jobs_superseded: usize,
  pub interrupts_dropped: usize,
  // Gauges
  pub queue_len_current: usize,
  pub executions_active_current: usize,
  // Histogram Data
  pub job_execution_duration_count: usize,
  pub job_execution_duration_sum_micros: usize,
}

impl MetricsSnapshot {
  /// Calculates the mean job execution duration in microseconds, if any jobs completed.
  /// Returns `None` if `job_execution_duration_count` is zero.
  pub fn mean_execution_duration_micros(&self) -> Option<f64> {
    if self.job_execution_duration_count == 0 {
      None
    } else {
      Some(self.job_execution_duration_sum_micros as f64 / self.job_execution_duration_count as f64)
    }
  }

  /// Calculates the mean job execution duration, if any jobs completed.
  pub fn mean_execution_duration(&self) -> Option<Duration> {
    self
      .mean_execution_duration_micros()
      .map(|micros| Duration::from_micros(micros as u64))
  }

  /// Total executions that finished, whether or not they panicked.
  pub fn executions_finished(&self) -> usize {
    self.jobs_executed + self.jobs_panicked
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn snapshot_reflects_counters_and_histogram() {
    let metrics = SchedulerMetrics::new();
    SchedulerMetrics::incr(&metrics.jobs_submitted);
    SchedulerMetrics::incr(&metrics.jobs_executed);
    SchedulerMetrics::incr(&metrics.jobs_panicked);
    metrics.set_queue_len(3);
    metrics.job_execution_duration.record(Duration::from_micros(100));
    metrics.job_execution_duration.record(Duration::from_micros(300));

    let clone = metrics.clone();
    SchedulerMetrics::incr(&clone.jobs_submitted);

    let snap = metrics.snapshot();
    assert_eq!(snap.jobs_submitted, 2);
    assert_eq!(snap.executions_finished(), 2);
    assert_eq!(snap.queue_len_current, 3);
    assert_eq!(snap.mean_execution_duration_micros(), Some(200.0));
    assert_eq!(snap.mean_execution_duration(), Some(Duration::from_micros(200)));
    assert_eq!(MetricsSnapshot::default().mean_execution_duration(), None);
  }
}

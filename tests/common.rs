//! tests/common.rs
//! Shared helper functions for integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use firekeeper::{
  job_fn, BuildError, CancellationToken, ExecutionMode, FireKeeper, FunctionJob, Job, JobKey,
  Nanos, RunOnceTrigger, SimpleTrigger, Trigger, TriggerError,
};
use parking_lot::Mutex;
use tracing_subscriber::fmt::TestWriter;

// Initializes tracing subscriber for test output.
pub fn setup_tracing() {
  // Use try_init to avoid panic if called multiple times
  let _ = tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG) // Show debug/trace for scheduler internals
    .with_writer(TestWriter::new()) // Write to test output
    .with_test_writer() // Enable per-test log capture
    .try_init();
}

// Builds a scheduler instance with the given execution mode.
pub fn build_scheduler(mode: ExecutionMode) -> Result<FireKeeper, BuildError> {
  FireKeeper::builder().execution_mode(mode).build()
}

// Builds and starts a scheduler. Cancel the returned token to stop it.
pub fn start_scheduler(mode: ExecutionMode) -> (FireKeeper, CancellationToken) {
  let scheduler = build_scheduler(mode).expect("Failed to build scheduler");
  let shutdown = CancellationToken::new();
  scheduler.start(&shutdown);
  (scheduler, shutdown)
}

// Stops the scheduler and waits (bounded) for every task to exit.
pub async fn stop_and_drain(scheduler: &FireKeeper) {
  scheduler.stop();
  let deadline = CancellationToken::new();
  let guard = deadline.clone();
  let timer = tokio::spawn(async move {
    tokio::time::sleep(StdDuration::from_secs(5)).await;
    guard.cancel();
  });
  scheduler.wait(&deadline).await;
  assert!(!deadline.is_cancelled(), "Scheduler did not drain within 5s");
  timer.abort();
}

// Polls `condition` every 10ms until it holds or `timeout` elapses.
pub async fn wait_until(timeout: StdDuration, mut condition: impl FnMut() -> bool) -> bool {
  let deadline = tokio::time::Instant::now() + timeout;
  loop {
    if condition() {
      return true;
    }
    if tokio::time::Instant::now() >= deadline {
      return false;
    }
    tokio::time::sleep(StdDuration::from_millis(10)).await;
  }
}

pub fn every(millis: u64) -> Arc<dyn Trigger> {
  Arc::new(SimpleTrigger::new(StdDuration::from_millis(millis)))
}

pub fn once_after(millis: u64) -> Arc<dyn Trigger> {
  Arc::new(RunOnceTrigger::new(StdDuration::from_millis(millis)))
}

// A job that increments a counter, optionally after a delay.
pub fn counter_job(key: JobKey, counter: Arc<AtomicUsize>, delay: StdDuration) -> Arc<dyn Job> {
  FunctionJob::new(key, format!("counter {key}"), job_fn! {
    {
      let ctr = counter.clone();
    }
    |cancel| {
      let count = ctr.fetch_add(1, Ordering::SeqCst) + 1;
      tracing::debug!("Counter job executing (Count: {})", count);
      if delay > StdDuration::ZERO {
        tokio::select! {
          _ = cancel.cancelled() => {}
          _ = tokio::time::sleep(delay) => {}
        }
      }
    }
  })
  .into_arc()
}

// A job that sets a flag when executed.
pub fn flag_job(key: JobKey, flag: Arc<AtomicBool>) -> Arc<dyn Job> {
  FunctionJob::new(key, format!("flag {key}"), job_fn! {
    {
      let flg = flag.clone();
    }
    |_cancel| {
      tracing::debug!("Flag job executing");
      flg.store(true, Ordering::SeqCst);
    }
  })
  .into_arc()
}

// A job that panics on every execution.
pub fn panic_job(key: JobKey) -> Arc<dyn Job> {
  FunctionJob::new(key, format!("panic {key}"), job_fn! {
    |_cancel| {
      tracing::debug!("Panic job executing...");
      tokio::task::yield_now().await;
      panic!("Job forced panic!");
    }
  })
  .into_arc()
}

// A job that appends its key to a shared log, then sleeps.
pub fn order_job(key: JobKey, log: Arc<Mutex<Vec<JobKey>>>, delay: StdDuration) -> Arc<dyn Job> {
  FunctionJob::new(key, format!("order {key}"), job_fn! {
    {
      let log = log.clone();
    }
    |_cancel| {
      log.lock().push(key);
      if delay > StdDuration::ZERO {
        tokio::time::sleep(delay).await;
      }
    }
  })
  .into_arc()
}

// A job for concurrency testing.
// Increments active count on start, decrements on end. Updates max observed.
pub fn concurrency_job(
  key: JobKey,
  active_counter: Arc<AtomicUsize>,
  max_observed_active: Arc<AtomicUsize>,
  delay: StdDuration,
) -> Arc<dyn Job> {
  FunctionJob::new(key, format!("concurrency {key}"), job_fn! {
    {
      let active = active_counter.clone();
      let max_obs = max_observed_active.clone();
    }
    |_cancel| {
      let current_active = active.fetch_add(1, Ordering::SeqCst) + 1;
      tracing::debug!("Concurrency job START (Active: {})", current_active);
      max_obs.fetch_max(current_active, Ordering::SeqCst);
      tokio::time::sleep(delay).await;
      let current_active_after = active.fetch_sub(1, Ordering::SeqCst) - 1;
      tracing::debug!("Concurrency job END (Active: {})", current_active_after);
    }
  })
  .into_arc()
}

/// A trigger that replays a fixed script of offsets and records every
/// `prev` it is asked about. `None` in the script means "expired"; running
/// off the end of the script yields `NoFutureFireTime`.
#[derive(Debug)]
pub struct ScriptedTrigger {
  script: Mutex<VecDeque<Option<StdDuration>>>,
  seen: Mutex<Vec<Nanos>>,
}

impl ScriptedTrigger {
  pub fn new(script: impl IntoIterator<Item = Option<StdDuration>>) -> Arc<Self> {
    Arc::new(Self {
      script: Mutex::new(script.into_iter().collect()),
      seen: Mutex::new(Vec::new()),
    })
  }

  pub fn seen(&self) -> Vec<Nanos> {
    self.seen.lock().clone()
  }
}

impl Trigger for ScriptedTrigger {
  fn next_fire_time(&self, prev: Nanos) -> Result<Nanos, TriggerError> {
    self.seen.lock().push(prev);
    match self.script.lock().pop_front() {
      Some(Some(offset)) => Ok(prev + offset.as_nanos() as Nanos),
      Some(None) => Err(TriggerError::Expired),
      None => Err(TriggerError::NoFutureFireTime),
    }
  }

  fn description(&self) -> String {
    format!("ScriptedTrigger-{}-left", self.script.lock().len())
  }
}

//! Time sources for the scheduler.
//!
//! Every timestamp the engine handles is a signed nanosecond count. The clock
//! is consulted when a job is first scheduled (to seed its trigger), when the
//! control loop checks whether the head of the queue is due, and when the wake
//! timer converts a target timestamp into a sleep duration.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::Utc;

/// Nanosecond timestamp used for fire times throughout the crate.
pub type Nanos = i64;

/// A source of "now" in nanoseconds.
pub trait Clock: Send + Sync + fmt::Debug {
  fn now_nanos(&self) -> Nanos;
}

/// Wall clock backed by `chrono::Utc::now()`, in nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now_nanos(&self) -> Nanos {
    now_nanos()
  }
}

/// Current wall-clock time in nanoseconds since the Unix epoch.
///
/// Saturates at `i64::MAX` past the year 2262.
pub fn now_nanos() -> Nanos {
  Utc::now().timestamp_nanos_opt().unwrap_or(Nanos::MAX)
}

/// Converts a duration to nanoseconds, saturating at `i64::MAX`.
pub fn duration_nanos(duration: Duration) -> Nanos {
  Nanos::try_from(duration.as_nanos()).unwrap_or(Nanos::MAX)
}

/// A clock that only moves when told to. Intended for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
  current: AtomicI64,
}

impl ManualClock {
  pub fn new(start: Nanos) -> Self {
    Self {
      current: AtomicI64::new(start),
    }
  }

  /// Starts the manual clock at the current wall-clock time.
  pub fn starting_now() -> Self {
    Self::new(now_nanos())
  }

  /// Advance the clock by the given duration
  pub fn advance(&self, duration: Duration) {
    self
      .current
      .fetch_add(duration_nanos(duration), Ordering::SeqCst);
  }

  pub fn set(&self, nanos: Nanos) {
    self.current.store(nanos, Ordering::SeqCst);
  }
}

impl Clock for ManualClock {
  fn now_nanos(&self) -> Nanos {
    self.current.load(Ordering::SeqCst)
  }
}

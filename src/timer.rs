//! The control loop's single retriggerable wake timer.
//!
//! Targets are nanosecond timestamps on the scheduler's [`Clock`]; the timer
//! converts them into a Tokio deadline when armed. Re-arming is always safe:
//! the underlying `Sleep` is reset in place, so a previous deadline that has
//! already elapsed but was never observed cannot leak into the new one.

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep_until, Instant, Sleep};
use tracing::trace;

use crate::clock::{Clock, Nanos};

/// Longest single sleep. Targets further out are approached in steps; the
/// control loop re-checks the queue head on every wake anyway.
const MAX_SLEEP: Duration = Duration::from_secs(60 * 60 * 24 * 7); // ~1 week

pub(crate) struct WakeTimer {
  sleep: Pin<Box<Sleep>>,
  target: Option<Nanos>,
  clock: Arc<dyn Clock>,
}

impl WakeTimer {
  /// Creates a disarmed timer.
  pub fn new(clock: Arc<dyn Clock>) -> Self {
    Self {
      sleep: Box::pin(sleep_until(Instant::now())),
      target: None,
      clock,
    }
  }

  /// Arms the timer for `target`. A target at or before now fires immediately.
  /// Re-arming for the target already pending is a no-op.
  pub fn arm(&mut self, target: Nanos) {
    if self.target == Some(target) {
      return;
    }
    let delay = self.delay_until(target);
    trace!(target, delay_ms = delay.as_millis(), "Arming wake timer.");
    self.sleep.as_mut().reset(Instant::now() + delay);
    self.target = Some(target);
  }

  pub fn disarm(&mut self) {
    self.target = None;
  }

  /// Time from now until `target`, clamped to `[0, MAX_SLEEP]`.
  pub fn delay_until(&self, target: Nanos) -> Duration {
    let now = self.clock.now_nanos();
    match u64::try_from(target.saturating_sub(now)) {
      Ok(nanos) => Duration::from_nanos(nanos).min(MAX_SLEEP),
      Err(_) => Duration::ZERO,
    }
  }

  /// Resolves when the armed deadline elapses, returning its target and
  /// leaving the timer disarmed. Never resolves while disarmed.
  ///
  /// Cancel safe: dropping the future keeps the timer armed.
  pub async fn fired(&mut self) -> Nanos {
    let Some(target) = self.target else {
      return pending().await;
    };
    self.sleep.as_mut().await;
    self.target = None;
    target
  }
}

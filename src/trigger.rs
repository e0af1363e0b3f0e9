//! Firing policies.
//!
//! A [`Trigger`] turns the previous fire time of a job into the next one. The
//! scheduler seeds it with "now" when the job is first scheduled and with the
//! previous *scheduled* fire time (not the actual execution time) afterwards,
//! so interval triggers do not drift when executions run late.

#[cfg(feature = "cron_schedule")]
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[cfg(feature = "cron_schedule")]
use std::str::FromStr;

#[cfg(feature = "cron_schedule")]
use chrono::{DateTime, Utc};
#[cfg(feature = "cron_schedule")]
use cron::Schedule as CronSchedule;

use crate::clock::{duration_nanos, Nanos};
use crate::error::TriggerError;

/// Computes successive fire times for a job.
pub trait Trigger: Send + Sync {
  /// Returns the next fire time after `prev`, or an error meaning
  /// "do not reschedule".
  fn next_fire_time(&self, prev: Nanos) -> Result<Nanos, TriggerError>;

  /// Human-readable description used in logs and scheduled job views.
  fn description(&self) -> String;
}

/// Fires repeatedly at a fixed interval after the previous fire time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimpleTrigger {
  interval: Duration,
}

impl SimpleTrigger {
  pub fn new(interval: Duration) -> Self {
    Self { interval }
  }

  pub fn interval(&self) -> Duration {
    self.interval
  }
}

impl Trigger for SimpleTrigger {
  fn next_fire_time(&self, prev: Nanos) -> Result<Nanos, TriggerError> {
    prev
      .checked_add(duration_nanos(self.interval))
      .ok_or(TriggerError::Overflow)
  }

  fn description(&self) -> String {
    format!("SimpleTrigger-{:?}", self.interval)
  }
}

/// Fires exactly once, `delay` after the time it is first asked about.
///
/// The first call to `next_fire_time` consumes the trigger; every later call
/// returns [`TriggerError::Expired`], so the job leaves the scheduler after
/// its single execution.
#[derive(Debug)]
pub struct RunOnceTrigger {
  delay: Duration,
  expired: AtomicBool,
}

impl RunOnceTrigger {
  pub fn new(delay: Duration) -> Self {
    Self {
      delay,
      expired: AtomicBool::new(false),
    }
  }

  pub fn is_expired(&self) -> bool {
    self.expired.load(Ordering::Acquire)
  }
}

impl Trigger for RunOnceTrigger {
  fn next_fire_time(&self, prev: Nanos) -> Result<Nanos, TriggerError> {
    if self.expired.swap(true, Ordering::AcqRel) {
      return Err(TriggerError::Expired);
    }
    prev
      .checked_add(duration_nanos(self.delay))
      .ok_or(TriggerError::Overflow)
  }

  fn description(&self) -> String {
    let status = if self.is_expired() { "expired" } else { "valid" };
    format!("RunOnceTrigger-{:?}-{}", self.delay, status)
  }
}

/// Fires on a standard CRON expression (UTC interpretation).
/// Requires the `cron_schedule` feature.
#[cfg(feature = "cron_schedule")]
pub struct CronTrigger {
  expression: String,
  schedule: CronSchedule,
}

#[cfg(feature = "cron_schedule")]
impl CronTrigger {
  /// Parses the expression up front so invalid schedules are rejected before
  /// they reach the scheduler.
  pub fn new(expression: impl Into<String>) -> Result<Self, TriggerError> {
    let expression = expression.into();
    let schedule = CronSchedule::from_str(&expression)
      .map_err(|e| TriggerError::InvalidExpression(format!("{expression}: {e}")))?;
    Ok(Self {
      expression,
      schedule,
    })
  }

  pub fn expression(&self) -> &str {
    &self.expression
  }
}

#[cfg(feature = "cron_schedule")]
impl Trigger for CronTrigger {
  fn next_fire_time(&self, prev: Nanos) -> Result<Nanos, TriggerError> {
    let reference: DateTime<Utc> = DateTime::from_timestamp_nanos(prev);
    self
      .schedule
      .after(&reference)
      .next()
      .ok_or(TriggerError::NoFutureFireTime)?
      .timestamp_nanos_opt()
      .ok_or(TriggerError::Overflow)
  }

  fn description(&self) -> String {
    format!("CronTrigger-{}", self.expression)
  }
}

#[cfg(feature = "cron_schedule")]
impl fmt::Debug for CronTrigger {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CronTrigger")
      .field("expression", &self.expression)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn simple_trigger_adds_interval_to_previous_fire() {
    let trigger = SimpleTrigger::new(Duration::from_millis(5));
    assert_eq!(trigger.next_fire_time(1_000), Ok(5_001_000));
    assert_eq!(
      trigger.next_fire_time(Nanos::MAX),
      Err(TriggerError::Overflow)
    );
  }

  #[test]
  fn run_once_trigger_expires_after_first_fire() {
    let trigger = RunOnceTrigger::new(Duration::from_nanos(10));
    assert!(trigger.description().ends_with("valid"));
    assert_eq!(trigger.next_fire_time(100), Ok(110));
    assert!(trigger.is_expired());
    assert_eq!(trigger.next_fire_time(110), Err(TriggerError::Expired));
    assert!(trigger.description().ends_with("expired"));
  }

  #[cfg(feature = "cron_schedule")]
  #[test]
  fn cron_trigger_fires_strictly_after_previous() {
    let trigger = CronTrigger::new("0 * * * * * *").unwrap();
    let start = DateTime::parse_from_rfc3339("2024-01-01T00:00:30Z")
      .unwrap()
      .with_timezone(&Utc);
    let next = trigger
      .next_fire_time(start.timestamp_nanos_opt().unwrap())
      .unwrap();
    let expected = DateTime::parse_from_rfc3339("2024-01-01T00:01:00Z")
      .unwrap()
      .with_timezone(&Utc);
    assert_eq!(next, expected.timestamp_nanos_opt().unwrap());

    assert!(matches!(
      CronTrigger::new("not a cron"),
      Err(TriggerError::InvalidExpression(_))
    ));
  }
}

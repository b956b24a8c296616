//! Explicit retry policies with exponential backoff.
//!
//! Storage control-plane calls see transient network and quota errors that
//! self-resolve. Each storage operation is driven by a `RetryPolicy` value so
//! the schedule is inspectable and unit-testable without real network calls.

use std::thread;
use std::time::Duration;

use tracing::debug;

/// An attempt bound plus an exponential backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Maximum number of attempts; `None` retries until success.
  pub max_attempts: Option<u32>,
  /// Delay before the second attempt; doubles after each further failure.
  pub base_delay: Duration,
  /// Upper bound on any single inter-attempt delay.
  pub max_delay: Duration,
}

impl RetryPolicy {
  /// Unbounded retries: 1s base delay, capped at 10s per attempt.
  ///
  /// Used where unconditional success is required for job correctness
  /// (bucket lookup, upload).
  pub fn unlimited() -> Self {
    Self {
      max_attempts: None,
      base_delay: Duration::from_secs(1),
      max_delay: Duration::from_secs(10),
    }
  }

  /// Same backoff schedule, capped at `max_attempts` attempts.
  pub fn limited(max_attempts: u32) -> Self {
    Self {
      max_attempts: Some(max_attempts),
      ..Self::unlimited()
    }
  }

  /// Zero out the delays. Attempt bounds are kept. For tests.
  pub fn no_delay(mut self) -> Self {
    self.base_delay = Duration::ZERO;
    self.max_delay = Duration::ZERO;
    self
  }

  /// Delay to wait after the given failed attempt (1-based).
  pub fn delay_for(&self, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(30);
    let delay = self.base_delay.saturating_mul(1 << exponent);
    delay.min(self.max_delay)
  }

  /// Run `op`, retrying failures that satisfy `retryable` per this policy.
  ///
  /// Returns the first success, the first non-retryable error, or the last
  /// error once attempts are exhausted.
  pub fn run<T, E, F, P>(&self, mut op: F, retryable: P) -> Result<T, E>
  where
    F: FnMut() -> Result<T, E>,
    P: Fn(&E) -> bool,
  {
    let mut attempt = 1u32;
    loop {
      match op() {
        Ok(value) => return Ok(value),
        Err(err) => {
          if !retryable(&err) {
            return Err(err);
          }
          if let Some(max) = self.max_attempts {
            if attempt >= max {
              return Err(err);
            }
          }
          let delay = self.delay_for(attempt);
          debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after failure");
          if !delay.is_zero() {
            thread::sleep(delay);
          }
          attempt += 1;
        }
      }
    }
  }
}

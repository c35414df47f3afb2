//! Exponential backoff.

use color_eyre::eyre::{eyre, Report};
use color_eyre::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
  pub base: Duration,
  pub max_attempts: u32,
}

impl Backoff {
  pub fn new(base: Duration, max_attempts: u32) -> Self {
    Self { base, max_attempts }
  }

  /// Wait before the attempt following failed attempt `attempt` (1-based).
  pub fn delay_after(&self, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    self.base.saturating_mul(factor)
  }

  /// Run `op` until it succeeds or `max_attempts` is used up. `on_failure`
  /// sees the 1-based attempt number and its error before any wait. The last
  /// error is returned unchanged.
  pub async fn run<T, F, Fut>(
    &self,
    mut op: F,
    mut on_failure: impl FnMut(u32, &Report),
  ) -> Result<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    if self.max_attempts == 0 {
      return Err(eyre!("Retry needs at least one attempt"));
    }

    let mut attempt = 1;
    loop {
      match op().await {
        Ok(value) => return Ok(value),
        Err(e) => {
          warn!(attempt, error = %e, "Attempt failed");
          on_failure(attempt, &e);
          if attempt >= self.max_attempts {
            return Err(e);
          }
          tokio::time::sleep(self.delay_after(attempt)).await;
          attempt += 1;
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::{Arc, Mutex};
  use tokio::time::Instant;

  #[test]
  fn test_delays_double() {
    let backoff = Backoff::new(Duration::from_millis(1000), 5);
    assert_eq!(backoff.delay_after(1), Duration::from_millis(1000));
    assert_eq!(backoff.delay_after(2), Duration::from_millis(2000));
    assert_eq!(backoff.delay_after(3), Duration::from_millis(4000));
  }

  #[tokio::test(start_paused = true)]
  async fn test_attempt_offsets_and_last_error() {
    let backoff = Backoff::new(Duration::from_millis(1000), 3);
    let started = Instant::now();
    let offsets = Arc::new(Mutex::new(Vec::new()));
    let calls = Arc::new(Mutex::new(0));

    let seen = offsets.clone();
    let counter = calls.clone();
    let result: Result<()> = backoff
      .run(
        || {
          let seen = seen.clone();
          let counter = counter.clone();
          async move {
            seen.lock().unwrap().push(started.elapsed().as_millis());
            let mut n = counter.lock().unwrap();
            *n += 1;
            Err(eyre!("failure {}", *n))
          }
        },
        |_, _| {},
      )
      .await;

    assert_eq!(*offsets.lock().unwrap(), vec![0, 1000, 3000]);
    assert_eq!(result.unwrap_err().to_string(), "failure 3");
  }

  #[tokio::test(start_paused = true)]
  async fn test_success_stops_retrying() {
    let backoff = Backoff::new(Duration::from_millis(10), 5);
    let calls = Arc::new(Mutex::new(0));
    let mut failures = Vec::new();

    let counter = calls.clone();
    let value = backoff
      .run(
        || {
          let counter = counter.clone();
          async move {
            let mut n = counter.lock().unwrap();
            *n += 1;
            if *n < 2 {
              Err(eyre!("not yet"))
            } else {
              Ok(*n)
            }
          }
        },
        |attempt, _| failures.push(attempt),
      )
      .await
      .unwrap();

    assert_eq!(value, 2);
    assert_eq!(failures, vec![1]);
  }

  #[tokio::test]
  async fn test_zero_attempts_is_an_error() {
    let backoff = Backoff::new(Duration::from_millis(10), 0);
    let result: Result<()> = backoff.run(|| async { Ok(()) }, |_, _| {}).await;
    assert!(result.is_err());
  }
}

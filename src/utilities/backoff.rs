//! Centralized retry helper with exponential backoff.
//!
//! All LLM invocations and swarm-level retries in the crate go through
//! [`retry_with_backoff`] so that attempt counting and delay growth behave
//! identically everywhere.

use std::future::Future;
use std::time::Duration;

/// Upper bound on a single backoff delay.
pub const BACKOFF_CAP: Duration = Duration::from_secs(10);

/// Compute the delay to sleep after attempt `attempt` (zero-based).
///
/// The delay is `base * 2^attempt`, capped at [`BACKOFF_CAP`].
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    let delay = base.saturating_mul(factor);
    delay.min(BACKOFF_CAP)
}

/// Run `op` up to `attempts` times, sleeping an exponentially growing delay
/// between attempts.
///
/// `attempts` is the total number of tries, not the number of retries; it is
/// clamped to a minimum of 1. The closure receives the zero-based attempt
/// index. The error of the final attempt is returned unchanged.
pub async fn retry_with_backoff<T, E, F, Fut>(
    attempts: u32,
    base: Duration,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut last_err: Option<E> = None;

    for attempt in 0..attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                log::warn!(
                    "attempt {}/{} failed: {}",
                    attempt + 1,
                    attempts,
                    err
                );
                last_err = Some(err);
                if attempt + 1 < attempts {
                    let delay = backoff_delay(base, attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    // Safety: the loop runs at least once, so a failure is always recorded.
    Err(last_err.unwrap())
}

//! Fixed-backoff retry for connection attempts.
//!
//! Attempts are spaced by a constant delay. No delay follows the final
//! attempt, so `n` failed attempts cost exactly `n - 1` backoffs.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay between a failed attempt and the next one.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }
}

/// Outcome details for a retried operation.
#[derive(Debug, Clone, Default)]
pub struct RetryStats {
    /// Attempts made, the successful one included.
    pub attempts: u32,
}

/// Run `operation` until it succeeds, the policy runs out, or `should_retry`
/// rejects an error.
///
/// Returns the last result together with [`RetryStats`].
pub async fn retry_async<F, Fut, T, E>(
    policy: &RetryPolicy,
    mut operation: F,
    should_retry: impl Fn(&E) -> bool,
) -> (Result<T, E>, RetryStats)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut stats = RetryStats::default();
    let mut attempt = 0;

    loop {
        attempt += 1;
        stats.attempts = attempt;

        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("Operation succeeded on attempt {}", attempt);
                }
                return (Ok(value), stats);
            }
            Err(e) => e,
        };

        if !should_retry(&error) {
            debug!("Error is not retryable: {}", error);
            return (Err(error), stats);
        }

        if attempt >= max_attempts {
            warn!(
                "All {} attempts failed. Last error: {}",
                max_attempts, error
            );
            return (Err(error), stats);
        }

        warn!(
            "Attempt {}/{} failed: {}. Retrying in {:?}",
            attempt, max_attempts, error, policy.backoff
        );
        tokio::time::sleep(policy.backoff).await;
    }
}

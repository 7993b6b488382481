use std::time::Duration;
use tokio::time::sleep;

/// Bounded exponential backoff for transient failures.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Ok(T),
    /// Failed every allowed attempt with a retryable error.
    Exhausted(E),
    /// Hit an error the predicate declared not worth retrying.
    Aborted(E),
}

/// Run `operation` until it succeeds, the error is not retryable, or the
/// allowed attempts run out.
pub async fn run_with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> RetryOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    let mut backoff = policy.initial_backoff;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "operation succeeded after retry");
                }
                return RetryOutcome::Ok(value);
            }
            Err(error) if !is_retryable(&error) => {
                return RetryOutcome::Aborted(error);
            }
            Err(error) => {
                if attempt >= policy.max_attempts {
                    tracing::error!(attempt, error = %error, "operation failed after all retries");
                    return RetryOutcome::Exhausted(error);
                }

                tracing::warn!(
                    attempt,
                    error = %error,
                    backoff_ms = backoff.as_millis() as u64,
                    "transient failure, retrying after backoff"
                );
                sleep(backoff).await;

                backoff = Duration::from_millis(
                    ((backoff.as_millis() as f64) * policy.multiplier) as u64,
                )
                .min(policy.max_backoff);
            }
        }
    }
}

//! Bounded retry with exponential backoff.
//!
//! The SQS and S3 control planes are eventually consistent: a freshly
//! created queue may not be visible to the very next call. Dependent calls
//! are retried while a caller-supplied predicate says the failure is a
//! not-yet-consistent one, up to a capped number of attempts.

use std::future::Future;
use std::time::Duration;

/// Runs `op` until it succeeds, `is_retryable` rejects the error, or
/// `max_attempts` is exhausted. The delay doubles after each attempt,
/// starting at `base_delay`. The last error is returned as-is.
pub async fn with_backoff<T, E, F, Fut, P>(
    max_attempts: u32,
    base_delay: Duration,
    mut op: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && is_retryable(&err) => {
                let delay = base_delay.saturating_mul(2u32.saturating_pow(attempt - 1));
                log::warn!("attempt {attempt}/{max_attempts} failed, retrying in {delay:?}");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);

        let result = with_backoff(
            5,
            Duration::from_millis(1),
            || {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call < 2 {
                        Err("not ready")
                    } else {
                        Ok(42)
                    }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_errors() {
        let calls = AtomicU32::new(0);

        let result: Result<u32, &str> = with_backoff(
            5,
            Duration::from_millis(1),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("fatal") }
            },
            |_| false,
        )
        .await;

        assert_eq!(result, Err("fatal"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);

        let result: Result<u32, &str> = with_backoff(
            3,
            Duration::from_millis(1),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("still not ready") }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Err("still not ready"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}

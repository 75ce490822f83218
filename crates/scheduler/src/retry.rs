//! Generic retry-with-backoff for retry-worthy failures, spec.md §4.1/§5:
//! "RPC: 5 retries, exponential backoff 1s→16s, max 30s cumulative before
//! surfacing." Adapted from the teacher's `ChainAdapterConfig::reconnect_backoff`
//! schedule, generalized to any fallible async operation rather than just the
//! socket reconnect.

use kaspa_privacy_common::error::ClassifiedError;
use std::time::Duration;

pub const DEFAULT_BACKOFF_MS: [u64; 5] = [1_000, 2_000, 4_000, 8_000, 16_000];

/// Runs `operation` until it succeeds, returns a non-retry-worthy error, or
/// exhausts `backoff`. Sleeps between attempts for the matching backoff step;
/// the last attempt never sleeps afterwards.
pub async fn retry_with_backoff<T, E, F, Fut>(backoff: &[Duration], mut operation: F) -> Result<T, E>
where
    E: ClassifiedError,
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.kind().is_retry_worthy() && attempt < backoff.len() => {
                log::warn!("scheduler: attempt {} failed with a retry-worthy error: {}", attempt + 1, e.kind());
                tokio::time::sleep(backoff[attempt]).await;
                attempt += 1;
            },
            Err(e) => return Err(e),
        }
    }
}

pub fn default_backoff() -> Vec<Duration> {
    DEFAULT_BACKOFF_MS.iter().map(|ms| Duration::from_millis(*ms)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaspa_privacy_common::error::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("boom")]
    struct Retryable;

    impl ClassifiedError for Retryable {
        fn kind(&self) -> ErrorKind { ErrorKind::NodeTimeout }
    }

    #[derive(Debug, Error)]
    #[error("fatal")]
    struct NotRetryable;

    impl ClassifiedError for NotRetryable {
        fn kind(&self) -> ErrorKind { ErrorKind::InputValidation }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let attempts = AtomicUsize::new(0);
        let backoff = vec![Duration::from_millis(1), Duration::from_millis(1)];
        let result: Result<u32, Retryable> = retry_with_backoff(&backoff, || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(Retryable)
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_on_non_retryable_error() {
        let attempts = AtomicUsize::new(0);
        let backoff = default_backoff();
        let result: Result<u32, NotRetryable> = retry_with_backoff(&backoff, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(NotRetryable)
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stops_after_exhausting_the_schedule() {
        let attempts = AtomicUsize::new(0);
        let backoff = vec![Duration::from_millis(1); 2];
        let result: Result<u32, Retryable> = retry_with_backoff(&backoff, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(Retryable)
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}

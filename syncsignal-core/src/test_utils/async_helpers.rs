//! Async test helpers
//!
//! Delivery between contexts is asynchronous, so most assertions either
//! wait for a condition or prove that nothing happened within a window.

use std::future::Future;
use tokio::time::{sleep, timeout, Duration};

/// Default timeout for async operations in tests
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Short window for "nothing should arrive" checks
pub const SHORT_TEST_TIMEOUT: Duration = Duration::from_millis(100);

/// How often [`wait_until`] re-checks its condition
pub const POLL_STEP: Duration = Duration::from_millis(5);

/// Assert a future completes within `duration` and return its output
pub async fn assert_completes_within<F, T>(duration: Duration, future: F) -> T
where
    F: Future<Output = T>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => panic!("Future did not complete within {:?}", duration),
    }
}

/// Assert a future does NOT complete within `duration`
pub async fn assert_times_out<F, T>(duration: Duration, future: F)
where
    F: Future<Output = T>,
{
    if timeout(duration, future).await.is_ok() {
        panic!("Expected future to time out, but it completed within {:?}", duration);
    }
}

/// Re-check `condition` every [`POLL_STEP`] until it holds or `limit` passes
///
/// Returns whether the condition was met. Works under paused time.
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    timeout(limit, async {
        while !condition() {
            sleep(POLL_STEP).await;
        }
    })
    .await
    .is_ok()
}

/// Panic unless `condition` holds within [`DEFAULT_TEST_TIMEOUT`]
pub async fn eventually(what: &str, condition: impl FnMut() -> bool) {
    if !wait_until(DEFAULT_TEST_TIMEOUT, condition).await {
        panic!("Condition never held: {}", what);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_assert_completes_within() {
        let value = assert_completes_within(SHORT_TEST_TIMEOUT, async { 7 }).await;
        assert_eq!(value, 7);
    }

    #[tokio::test]
    #[should_panic(expected = "did not complete")]
    async fn test_assert_completes_within_panics() {
        assert_completes_within(Duration::from_millis(10), sleep(Duration::from_secs(10))).await;
    }

    #[tokio::test]
    async fn test_assert_times_out() {
        assert_times_out(Duration::from_millis(10), sleep(Duration::from_secs(10))).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        tokio::spawn(async move {
            for _ in 0..3 {
                sleep(Duration::from_millis(20)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert!(wait_until(Duration::from_secs(1), || ticks.load(Ordering::SeqCst) == 3).await);
        assert!(!wait_until(Duration::from_millis(50), || false).await);
    }
}

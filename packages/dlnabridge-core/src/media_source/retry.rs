//! Retry logic for transient upstream failures.

use std::time::Duration;

use super::UpstreamError;

/// Retry delays for transient upstream errors (exponential backoff).
const RETRY_DELAYS_MS: [u64; 3] = [200, 500, 1000];

/// Executes an upstream request, retrying connection errors and 5xx
/// responses with backoff (200ms, 500ms, 1000ms).
///
/// The whole chain, backoff included, is bounded by `budget`; running past
/// it yields [`UpstreamError::Timeout`]. Other failures (timeouts,
/// unauthorized, not found, parse errors) return immediately.
pub(crate) async fn with_retry<T, F, Fut>(
    action: &str,
    budget: Duration,
    operation: F,
) -> Result<T, UpstreamError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, UpstreamError>>,
{
    match tokio::time::timeout(budget, retry_loop(action, operation)).await {
        Ok(result) => result,
        Err(_) => {
            log::warn!("[Upstream] {} gave up after {:?}", action, budget);
            Err(UpstreamError::Timeout)
        }
    }
}

async fn retry_loop<T, F, Fut>(action: &str, mut operation: F) -> Result<T, UpstreamError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, UpstreamError>>,
{
    let mut last_error = UpstreamError::Timeout;
    for (attempt, &delay_ms) in std::iter::once(&0)
        .chain(RETRY_DELAYS_MS.iter())
        .enumerate()
    {
        if attempt > 0 {
            log::info!(
                "[Upstream] Retrying {} (attempt {}/{}) after {}ms",
                action,
                attempt + 1,
                RETRY_DELAYS_MS.len() + 1,
                delay_ms
            );
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        match operation().await {
            Ok(r) => return Ok(r),
            Err(e) if e.is_transient() => {
                log::warn!("[Upstream] {} transient error: {}", action, e);
                last_error = e;
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error)
}

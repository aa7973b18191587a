use std::time::Duration;

use crate::error::MonitorError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Retry an async RPC call with exponential backoff.
///
/// Only transport failures (`Rpc`, `Timeout`) are retried; anything else,
/// including a missing object, is returned on the first occurrence.
pub async fn retry_rpc<F, Fut, T>(policy: RetryPolicy, mut f: F) -> Result<T, MonitorError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, MonitorError>>,
{
    let mut delay = policy.initial_delay;

    for attempt in 0..policy.max_retries {
        match f().await {
            Ok(val) => return Ok(val),
            Err(e) if e.is_connection_failure() => {
                tracing::warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "RPC call failed, retrying..."
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, policy.max_delay);
            }
            Err(e) => return Err(e),
        }
    }

    // Final attempt, error propagates
    f().await
}

use std::future::Future;
use std::time::Duration;

use anyhow::Result;

const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY: Duration = Duration::from_secs(1);

/// Error fragments that mark a remote failure as transient.
const RETRYABLE_FRAGMENTS: &[&str] = &[
    "429",
    "500",
    "502",
    "503",
    "rateLimitExceeded",
    "userRateLimitExceeded",
];

fn is_retryable(err: &anyhow::Error) -> bool {
    let msg = format!("{err:#}");
    RETRYABLE_FRAGMENTS.iter().any(|f| msg.contains(f))
}

/// Run a remote call with up to 5 attempts and 1, 2, 4, 8, 16 second
/// backoff. Only rate-limit and 5xx-shaped errors are retried; anything
/// else fails immediately.
pub async fn retry_request<T, F, Fut>(operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..MAX_ATTEMPTS {
        match operation().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if !is_retryable(&e) {
                    return Err(e);
                }
                let delay = BASE_DELAY * (1u32 << attempt);
                tracing::warn!("remote API error: {e:#}, retrying in {delay:?}");
                last_err = Some(e);
                if attempt + 1 < MAX_ATTEMPTS {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    Err(last_err.unwrap())
}

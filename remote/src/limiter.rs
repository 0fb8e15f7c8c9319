use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket gating every remote API call. Sized from
/// `google.rate_limit_qps`; burst equals the refill rate.
pub struct RateLimiter {
    qps: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    pub fn new(qps: u32) -> Self {
        let qps = f64::from(qps.max(1));
        RateLimiter {
            qps,
            burst: qps,
            state: Mutex::new(BucketState {
                tokens: qps,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token, sleeping until the bucket refills if necessary.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.qps).min(self.burst);
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.qps)
            };
            tokio::time::sleep(wait).await;
        }
    }
}

//! Token-bucket admission control

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Token bucket governing how fast new streams are admitted.
///
/// Permits refill continuously at `rate` per second up to `burst`. A zero
/// rate grants nothing beyond the initial burst, so every further acquire
/// waits forever; callers cancel by dropping the future, which releases
/// nothing and wakes nobody.
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    refreshed: Instant,
}

impl RateLimiter {
    pub fn new(rate: u32, burst: u32) -> Self {
        Self {
            rate: f64::from(rate),
            burst: f64::from(burst),
            state: Mutex::new(BucketState {
                tokens: f64::from(burst),
                refreshed: Instant::now(),
            }),
        }
    }

    /// Waits until a permit is available, then consumes it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().unwrap();
                let now = Instant::now();
                if self.rate > 0.0 {
                    let elapsed = now.duration_since(state.refreshed).as_secs_f64();
                    state.tokens = (state.tokens + elapsed * self.rate).min(self.burst);
                }
                state.refreshed = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }

                if self.rate > 0.0 {
                    Duration::from_secs_f64((1.0 - state.tokens) / self.rate)
                } else {
                    Duration::from_secs(3600)
                }
            };
            sleep(wait).await;
        }
    }
}

//! Rate Limiter (C1).
//!
//! Enforces a minimum interval between two successive outbound requests on
//! one logical client. No token-bucket burst; strictly one-out-at-a-time.

use std::time::Duration;

use tokio::time::Instant;

/// A single-client throttle. `acquire()` sleeps until at least `interval` has
/// passed since the previous `acquire()` completed.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_request_time: Option<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_request_time: None,
        }
    }

    /// Builds a limiter from a requests-per-second budget.
    pub fn from_requests_per_sec(requests_per_sec: f64) -> Self {
        let interval = if requests_per_sec <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / requests_per_sec)
        };
        Self::new(interval)
    }

    /// Builds a limiter from a requests-per-hour budget.
    pub fn from_requests_per_hour(requests_per_hour: f64) -> Self {
        Self::from_requests_per_sec(requests_per_hour / 3600.0)
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Blocks the caller until it is safe to issue the next request, then
    /// records the new last-request time.
    pub async fn acquire(&mut self) {
        if let Some(last) = self.last_request_time {
            let earliest_next = last + self.interval;
            let now = Instant::now();
            if now < earliest_next {
                tokio::time::sleep(earliest_next - now).await;
            }
        }
        self.last_request_time = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spaces_successive_acquires_by_at_least_the_interval() {
        let mut limiter = RateLimiter::new(Duration::from_millis(50));
        let t1 = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        let elapsed = t1.elapsed();
        assert!(elapsed >= Duration::from_millis(45));
    }

    #[tokio::test]
    async fn zero_interval_never_blocks() {
        let mut limiter = RateLimiter::new(Duration::ZERO);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}

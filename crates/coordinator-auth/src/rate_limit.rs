//! Token-bucket rate limiting for failed credential validations (spec §4.2:
//! 10/s sustained, 50 burst, keyed per request source).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-source token bucket limiter. One instance is shared across a
/// `CredentialValidator`; call [`FailureLimiter::check`] only on a *failed*
/// validation, per spec ("rate-limit failed validations per source").
#[derive(Debug)]
pub struct FailureLimiter {
    sustained_per_sec: f64,
    burst: f64,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl FailureLimiter {
    pub fn new(sustained_per_sec: f64, burst: f64) -> Self {
        Self {
            sustained_per_sec,
            burst,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Spec default: 10/s sustained, 50 burst.
    pub fn with_defaults() -> Self {
        Self::new(10.0, 50.0)
    }

    /// Consume one token for `source`. Returns `true` if allowed (a token
    /// was available), `false` if the source should be rejected.
    pub fn check(&self, source: &str) -> bool {
        let mut buckets = self.buckets.lock();
        let now = Instant::now();
        let bucket = buckets.entry(source.to_string()).or_insert(Bucket {
            tokens: self.burst,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.sustained_per_sec).min(self.burst);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop buckets untouched for longer than `max_age`, to bound memory
    /// for a service that sees many distinct sources over time.
    pub fn sweep(&self, max_age: Duration) {
        let now = Instant::now();
        self.buckets
            .lock()
            .retain(|_, b| now.duration_since(b.last_refill) < max_age);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_burst_immediately() {
        let limiter = FailureLimiter::new(10.0, 50.0);
        for _ in 0..50 {
            assert!(limiter.check("ip-1"));
        }
        assert!(!limiter.check("ip-1"));
    }

    #[test]
    fn sources_are_independent() {
        let limiter = FailureLimiter::new(1.0, 2.0);
        assert!(limiter.check("a"));
        assert!(limiter.check("a"));
        assert!(!limiter.check("a"));
        assert!(limiter.check("b"));
    }
}

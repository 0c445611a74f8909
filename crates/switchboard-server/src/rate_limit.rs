use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, rate: f64, capacity: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;

        self.tokens = (self.tokens + elapsed * rate).min(capacity);
    }

    fn try_consume(&mut self, rate: f64, capacity: f64) -> bool {
        self.refill(rate, capacity);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until one token is available.
    fn wait_time(&self, rate: f64) -> Duration {
        Duration::from_secs_f64(((1.0 - self.tokens) / rate).max(0.0))
    }
}

/// Token buckets keyed by IRC network name. Limits how fast the relay
/// opens connections to one network, so a restart reconnecting every user
/// does not trip the server's flood protection.
#[derive(Clone)]
pub struct ConnectLimiter {
    buckets: Arc<Mutex<HashMap<String, TokenBucket>>>,
    rate: f64,
    capacity: f64,
}

impl ConnectLimiter {
    pub fn new(rate: f64, capacity: f64) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            rate,
            capacity,
        }
    }

    /// Take a token without waiting. When the bucket is empty, returns how
    /// long until the next token.
    pub async fn check(&self, network: &str) -> Result<(), Duration> {
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .entry(network.to_string())
            .or_insert_with(|| TokenBucket::new(self.capacity));

        if bucket.try_consume(self.rate, self.capacity) {
            Ok(())
        } else {
            Err(bucket.wait_time(self.rate))
        }
    }

    /// Take a token, sleeping until one is available.
    pub async fn acquire(&self, network: &str) {
        while let Err(wait) = self.check(network).await {
            debug!(network, wait_ms = wait.as_millis() as u64, "Connect rate limited");
            tokio::time::sleep(wait).await;
        }
    }

    pub async fn purge_stale(&self, max_idle_secs: f64) {
        let mut buckets = self.buckets.lock().await;
        let now = Instant::now();
        buckets.retain(|_, bucket| {
            now.duration_since(bucket.last_refill).as_secs_f64() < max_idle_secs
        });
    }
}

impl Default for ConnectLimiter {
    fn default() -> Self {
        Self::new(1.0, 5.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_limiter_allows_burst() {
        let limiter = ConnectLimiter::new(1.0, 3.0);

        for _ in 0..3 {
            assert!(limiter.check("IRCNet").await.is_ok());
        }

        let wait = limiter.check("IRCNet").await.unwrap_err();
        assert!(wait > Duration::ZERO && wait <= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_limiter_separate_networks() {
        let limiter = ConnectLimiter::new(1.0, 1.0);

        assert!(limiter.check("IRCNet").await.is_ok());
        assert!(limiter.check("IRCNet").await.is_err());
        assert!(limiter.check("Freenode").await.is_ok());
    }

    #[tokio::test]
    async fn test_acquire_waits_for_refill() {
        let limiter = ConnectLimiter::new(50.0, 1.0);
        limiter.acquire("IRCNet").await;

        let started = Instant::now();
        limiter.acquire("IRCNet").await;
        assert!(started.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_purge_stale() {
        let limiter = ConnectLimiter::new(1.0, 5.0);
        assert!(limiter.check("IRCNet").await.is_ok());

        limiter.purge_stale(0.0).await;

        let buckets = limiter.buckets.lock().await;
        assert!(buckets.is_empty());
    }
}

use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RateLimiterSnapshot {
    pub rps: f64,
    pub burst: f64,
    pub tokens: f64,
    /// Estimated wait time until a token is available (ms), if currently empty.
    pub estimated_wait_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Tokens per second.
    pub rps: f64,
    /// Maximum burst size (tokens).
    pub burst: f64,
}

impl RateLimiterConfig {
    /// `n` requests per minute, with a full minute's worth available as burst.
    pub fn per_minute(n: u32) -> Self {
        Self {
            rps: n as f64 / 60.0,
            burst: (n as f64).max(1.0),
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last: Instant,
}

impl Bucket {
    fn full(cfg: &RateLimiterConfig, now: Instant) -> Self {
        Self {
            tokens: cfg.burst,
            last: now,
        }
    }

    fn refill(&mut self, cfg: &RateLimiterConfig, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * cfg.rps).min(cfg.burst);
            self.last = now;
        }
    }
}

/// Token-bucket rate limiter keyed by client identity.
///
/// Each identity gets its own bucket on first sight. Buckets live in a sharded
/// concurrent map, so concurrent requests only contend per shard.
pub struct KeyedRateLimiter {
    cfg: RateLimiterConfig,
    buckets: DashMap<String, Bucket>,
}

impl KeyedRateLimiter {
    pub fn new(cfg: RateLimiterConfig) -> Self {
        Self {
            cfg,
            buckets: DashMap::new(),
        }
    }

    /// Take one token for `key` without waiting.
    pub fn try_acquire(&self, key: &str) -> bool {
        self.try_acquire_at(key, Instant::now())
    }

    fn try_acquire_at(&self, key: &str, now: Instant) -> bool {
        let cfg = &self.cfg;
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::full(cfg, now));
        bucket.refill(cfg, now);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn snapshot(&self, key: &str) -> RateLimiterSnapshot {
        let cfg = &self.cfg;
        let now = Instant::now();
        let tokens = match self.buckets.get_mut(key) {
            Some(mut bucket) => {
                bucket.refill(cfg, now);
                bucket.tokens
            }
            None => cfg.burst,
        };

        let estimated_wait_ms = if tokens < 1.0 && cfg.rps > 0.0 {
            Some(((1.0 - tokens) / cfg.rps * 1000.0) as u64)
        } else {
            None
        };

        RateLimiterSnapshot {
            rps: cfg.rps,
            burst: cfg.burst,
            tokens,
            estimated_wait_ms,
        }
    }

    /// Drop buckets untouched for `max_idle`. A dropped bucket comes back full,
    /// so only buckets that would have refilled anyway should be evicted.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, b| now.saturating_duration_since(b.last) < max_idle);
        before - self.buckets.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }
}

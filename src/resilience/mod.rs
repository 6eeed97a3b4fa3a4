//! Resilience primitives.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`rate_limiter`] | Per-client token bucket used to gate inbound requests |
//!
//! ```rust
//! use chat_relay::resilience::rate_limiter::{KeyedRateLimiter, RateLimiterConfig};
//!
//! let limiter = KeyedRateLimiter::new(RateLimiterConfig::per_minute(60));
//! if limiter.try_acquire("203.0.113.7") {
//!     // Proceed with request...
//! }
//! ```

pub mod rate_limiter;

pub use rate_limiter::{KeyedRateLimiter, RateLimiterConfig, RateLimiterSnapshot};

//! Request-path protection: admission control and failure isolation.
//!
//! - [`TokenBucketLimiter`] rejects work once `capacity` calls were
//!   admitted within the last `period`
//! - [`CircuitBreaker`] stops calling a failing handler and lets trial calls
//!   through after a cool-down
//! - [`ErrorClassifier`] decides which errors the breaker counts

pub mod circuit_breaker;
pub mod classifier;
pub mod rate_limit;

pub use circuit_breaker::{
    BreakerConfigError, BreakerSettings, BreakerSnapshot, BreakerState,
    CircuitBreaker,
};
pub use classifier::{DefaultClassifier, ErrorClassifier};
pub use rate_limit::{RateLimitError, RateLimiter, TokenBucketLimiter};

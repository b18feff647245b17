//! Admission control for the request path.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("rate limit capacity must be greater than zero")]
    ZeroCapacity,

    #[error("rate limit period must be greater than zero")]
    ZeroPeriod,

    #[error("rate limit period of {0:?} is out of range")]
    PeriodOutOfRange(Duration),
}

/// Decides whether one more request may proceed right now.
///
/// Implementations never block; a rejected caller is expected to fail fast.
pub trait RateLimiter: Send + Sync {
    fn allow(&self) -> bool;
}

/// Token bucket in which every consumed token is returned exactly one
/// `period` after it was taken.
///
/// Tracking each token's return instant (instead of refilling at a
/// constant trickle) bounds admissions to `capacity` over any window of
/// length `period`, while a bucket that has been idle for a full period
/// admits a burst of `capacity` immediately.
#[derive(Debug)]
pub struct TokenBucketLimiter {
    capacity: usize,
    period: Duration,
    /// Return instants of tokens currently out, oldest first
    outstanding: Mutex<VecDeque<Instant>>,
}

impl TokenBucketLimiter {
    pub fn new(
        capacity: usize,
        period: Duration,
    ) -> Result<Self, RateLimitError> {
        if capacity == 0 {
            return Err(RateLimitError::ZeroCapacity);
        }
        if period.is_zero() {
            return Err(RateLimitError::ZeroPeriod);
        }
        if Instant::now().checked_add(period).is_none() {
            return Err(RateLimitError::PeriodOutOfRange(period));
        }
        Ok(Self {
            capacity,
            period,
            outstanding: Mutex::new(VecDeque::with_capacity(capacity)),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Tokens that could be consumed at this instant.
    pub fn available(&self) -> usize {
        let mut outstanding = self.outstanding.lock();
        reclaim(&mut outstanding, Instant::now());
        self.capacity - outstanding.len()
    }

}

impl RateLimiter for TokenBucketLimiter {
    fn allow(&self) -> bool {
        let now = Instant::now();
        let mut outstanding = self.outstanding.lock();
        reclaim(&mut outstanding, now);

        if outstanding.len() >= self.capacity {
            return false;
        }
        // Unreachable for periods accepted by `new`; fail closed otherwise
        let Some(returns_at) = now.checked_add(self.period) else {
            return false;
        };
        outstanding.push_back(returns_at);
        true
    }
}

fn reclaim(outstanding: &mut VecDeque<Instant>, now: Instant) {
    while outstanding.front().is_some_and(|returns_at| *returns_at <= now) {
        outstanding.pop_front();
    }
}

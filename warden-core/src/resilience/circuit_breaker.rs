//! Failure-ratio circuit breaker.
//!
//! The breaker keeps a rolling window of the last `max_requests` counted
//! outcomes. Once the window is full and the failure share reaches
//! `failure_ratio` it opens and rejects calls without running them. After
//! `timeout` it lets a bounded number of trial calls through (half-open):
//! any counted failure reopens it, `success_threshold` successes close it.
//!
//! Every transition starts a new generation. A call records its outcome
//! only if the breaker is still in the generation the call was admitted
//! in, so slow calls cannot leak into the statistics of a later state.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::classifier::{DefaultClassifier, ErrorClassifier};
use crate::error::{Result, ServiceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half-open",
        })
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum BreakerConfigError {
    #[error("max_requests must be greater than zero")]
    ZeroMaxRequests,

    #[error("timeout must be greater than zero")]
    ZeroTimeout,

    #[error("failure_ratio must be within (0, 1], got {0}")]
    FailureRatioOutOfRange(f64),

    #[error("half_open_max_calls must be greater than zero")]
    ZeroHalfOpenCalls,

    #[error("success_threshold must be greater than zero")]
    ZeroSuccessThreshold,
}

#[derive(Debug, Clone)]
pub struct BreakerSettings {
    pub name: String,
    /// Rolling window size, and the minimum sample before tripping
    pub max_requests: usize,
    /// How long the breaker stays open before admitting trial calls
    pub timeout: Duration,
    pub failure_ratio: f64,
    pub half_open_max_calls: usize,
    pub success_threshold: usize,
}

impl BreakerSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn max_requests(mut self, max_requests: usize) -> Self {
        self.max_requests = max_requests;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn failure_ratio(mut self, failure_ratio: f64) -> Self {
        self.failure_ratio = failure_ratio;
        self
    }

    pub fn half_open_max_calls(mut self, calls: usize) -> Self {
        self.half_open_max_calls = calls;
        self
    }

    pub fn success_threshold(mut self, successes: usize) -> Self {
        self.success_threshold = successes;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), BreakerConfigError> {
        if self.max_requests == 0 {
            return Err(BreakerConfigError::ZeroMaxRequests);
        }
        if self.timeout.is_zero() {
            return Err(BreakerConfigError::ZeroTimeout);
        }
        if !(self.failure_ratio > 0.0 && self.failure_ratio <= 1.0) {
            return Err(BreakerConfigError::FailureRatioOutOfRange(
                self.failure_ratio,
            ));
        }
        if self.half_open_max_calls == 0 {
            return Err(BreakerConfigError::ZeroHalfOpenCalls);
        }
        if self.success_threshold == 0 {
            return Err(BreakerConfigError::ZeroSuccessThreshold);
        }
        Ok(())
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            max_requests: 10,
            timeout: Duration::from_secs(30),
            failure_ratio: 0.5,
            half_open_max_calls: 1,
            success_threshold: 1,
        }
    }
}

/// Point-in-time view of the breaker, for health reporting and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub generation: u64,
    pub window_len: usize,
    pub window_failures: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    /// Not counted; only releases a half-open trial slot
    Ignored,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    generation: u64,
    /// `true` marks a failure
    window: VecDeque<bool>,
    window_failures: usize,
    opened_at: Option<Instant>,
    trials_in_flight: usize,
    trial_successes: usize,
}

impl Inner {
    fn new(capacity: usize) -> Self {
        Self {
            state: BreakerState::Closed,
            generation: 0,
            window: VecDeque::with_capacity(capacity),
            window_failures: 0,
            opened_at: None,
            trials_in_flight: 0,
            trial_successes: 0,
        }
    }

    fn push(&mut self, failed: bool, capacity: usize) {
        self.window.push_back(failed);
        if failed {
            self.window_failures += 1;
        }
        while self.window.len() > capacity {
            if self.window.pop_front() == Some(true) {
                self.window_failures -= 1;
            }
        }
    }
}

pub struct CircuitBreaker {
    settings: BreakerSettings,
    classifier: Arc<dyn ErrorClassifier>,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("settings", &self.settings)
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    pub fn new(
        settings: BreakerSettings,
        classifier: impl ErrorClassifier,
    ) -> std::result::Result<Self, BreakerConfigError> {
        settings.validate()?;
        let inner = Mutex::new(Inner::new(settings.max_requests));
        Ok(Self {
            settings,
            classifier: Arc::new(classifier),
            inner,
        })
    }

    pub fn with_default_classifier(
        settings: BreakerSettings,
    ) -> std::result::Result<Self, BreakerConfigError> {
        Self::new(settings, DefaultClassifier)
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock();
        self.expire_open(&mut inner, Instant::now());
        inner.state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let mut inner = self.inner.lock();
        self.expire_open(&mut inner, Instant::now());
        BreakerSnapshot {
            state: inner.state,
            generation: inner.generation,
            window_len: inner.window.len(),
            window_failures: inner.window_failures,
        }
    }

    /// Run `call` under the breaker.
    ///
    /// Rejected calls fail with [`ServiceError::CircuitOpen`] and `call` is
    /// never invoked. Otherwise the call's own result is returned unchanged.
    pub async fn execute<T, F, Fut>(&self, call: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut permit = self.admit()?;
        let result = call().await;

        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(err) if self.classifier.is_failure(err) => Outcome::Failure,
            Err(_) => Outcome::Ignored,
        };
        permit.complete(outcome);
        result
    }

    fn admit(&self) -> Result<Permit<'_>> {
        let mut inner = self.inner.lock();
        self.expire_open(&mut inner, Instant::now());

        match inner.state {
            BreakerState::Closed => {}
            BreakerState::Open => {
                debug!(breaker = %self.settings.name, "call rejected: open");
                return Err(ServiceError::CircuitOpen);
            }
            BreakerState::HalfOpen => {
                if inner.trials_in_flight >= self.settings.half_open_max_calls
                {
                    debug!(
                        breaker = %self.settings.name,
                        "call rejected: half-open trial limit reached"
                    );
                    return Err(ServiceError::CircuitOpen);
                }
                inner.trials_in_flight += 1;
            }
        }

        Ok(Permit {
            breaker: self,
            generation: inner.generation,
            completed: false,
        })
    }

    fn record(&self, generation: u64, outcome: Outcome) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        self.expire_open(&mut inner, now);
        if inner.generation != generation {
            return;
        }

        match inner.state {
            BreakerState::Closed => {
                let failed = match outcome {
                    Outcome::Success => false,
                    Outcome::Failure => true,
                    Outcome::Ignored => return,
                };
                inner.push(failed, self.settings.max_requests);

                let len = inner.window.len();
                if len == self.settings.max_requests {
                    let ratio = inner.window_failures as f64 / len as f64;
                    if ratio >= self.settings.failure_ratio {
                        warn!(
                            breaker = %self.settings.name,
                            failures = inner.window_failures,
                            requests = len,
                            "failure ratio reached"
                        );
                        self.transition(&mut inner, BreakerState::Open, now);
                    }
                }
            }
            BreakerState::HalfOpen => {
                inner.trials_in_flight =
                    inner.trials_in_flight.saturating_sub(1);
                match outcome {
                    Outcome::Success => {
                        inner.trial_successes += 1;
                        if inner.trial_successes
                            >= self.settings.success_threshold
                        {
                            self.transition(
                                &mut inner,
                                BreakerState::Closed,
                                now,
                            );
                        }
                    }
                    Outcome::Failure => {
                        self.transition(&mut inner, BreakerState::Open, now);
                    }
                    Outcome::Ignored => {}
                }
            }
            // Entering Open always bumps the generation
            BreakerState::Open => {}
        }
    }

    fn expire_open(&self, inner: &mut Inner, now: Instant) {
        if inner.state != BreakerState::Open {
            return;
        }
        let elapsed = inner.opened_at.is_none_or(|opened| {
            now.duration_since(opened) >= self.settings.timeout
        });
        if elapsed {
            self.transition(inner, BreakerState::HalfOpen, now);
        }
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState, now: Instant) {
        let from = inner.state;
        inner.state = to;
        inner.generation = inner.generation.wrapping_add(1);
        inner.window.clear();
        inner.window_failures = 0;
        inner.trials_in_flight = 0;
        inner.trial_successes = 0;
        inner.opened_at = (to == BreakerState::Open).then_some(now);

        info!(
            breaker = %self.settings.name,
            %from,
            %to,
            generation = inner.generation,
            "circuit breaker state changed"
        );
    }
}

/// Admission ticket for one call. Dropping it without an outcome (the
/// caller's future was cancelled) releases a half-open trial slot.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    completed: bool,
}

impl Permit<'_> {
    fn complete(&mut self, outcome: Outcome) {
        self.completed = true;
        self.breaker.record(self.generation, outcome);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.breaker.record(self.generation, Outcome::Ignored);
        }
    }
}

use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};

use super::{Call, Next, RequestMetrics, Stage};
use crate::error::{Result, ServiceError};
use crate::resilience::{CircuitBreaker, RateLimiter};
use crate::validation::Validate;

/// Opens a span per request and logs method, latency and outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingStage;

#[async_trait]
impl<Req, Resp> Stage<Req, Resp> for LoggingStage
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    async fn handle(
        &self,
        call: Call<Req>,
        next: Next<'_, Req, Resp>,
    ) -> Result<Resp> {
        let span =
            info_span!("request", request_id = %call.id, method = call.method);
        let method = call.method;

        async move {
            let started = Instant::now();
            let result = next.run(call).await;
            let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;

            match &result {
                Ok(_) => info!(method, latency_ms, "request completed"),
                Err(err) if err.kind().is_client_fault() => info!(
                    method,
                    latency_ms,
                    kind = %err.kind(),
                    error = %err,
                    "request rejected"
                ),
                Err(err) => warn!(
                    method,
                    latency_ms,
                    kind = %err.kind(),
                    error = ?err,
                    "request failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }
}

/// Counts requests and per-method outcomes into shared [`RequestMetrics`].
#[derive(Debug, Clone)]
pub struct MetricsStage {
    metrics: Arc<RequestMetrics>,
}

impl MetricsStage {
    pub fn new(metrics: Arc<RequestMetrics>) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl<Req, Resp> Stage<Req, Resp> for MetricsStage
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    async fn handle(
        &self,
        call: Call<Req>,
        next: Next<'_, Req, Resp>,
    ) -> Result<Resp> {
        self.metrics.record_request();
        let method = call.method;
        let started = Instant::now();

        let result = next.run(call).await;
        self.metrics
            .record_response(method, result.is_ok(), started.elapsed());
        result
    }
}

/// Rejects requests whose [`Validate`] impl reports violations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationStage;

#[async_trait]
impl<Req, Resp> Stage<Req, Resp> for ValidationStage
where
    Req: Validate + Send + 'static,
    Resp: Send + 'static,
{
    async fn handle(
        &self,
        call: Call<Req>,
        next: Next<'_, Req, Resp>,
    ) -> Result<Resp> {
        if let Err(errors) = call.request.validate() {
            debug!(method = call.method, %errors, "validation failed");
            return Err(errors.into());
        }
        next.run(call).await
    }
}

/// Admission control in front of the handler.
#[derive(Clone)]
pub struct RateLimitStage {
    limiter: Arc<dyn RateLimiter>,
}

impl std::fmt::Debug for RateLimitStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitStage").finish_non_exhaustive()
    }
}

impl RateLimitStage {
    pub fn new(limiter: Arc<dyn RateLimiter>) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl<Req, Resp> Stage<Req, Resp> for RateLimitStage
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    async fn handle(
        &self,
        call: Call<Req>,
        next: Next<'_, Req, Resp>,
    ) -> Result<Resp> {
        if !self.limiter.allow() {
            warn!(method = call.method, "rate limit exceeded");
            return Err(ServiceError::RateLimited);
        }
        next.run(call).await
    }
}

/// Runs the rest of the chain inside a [`CircuitBreaker`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerStage {
    breaker: Arc<CircuitBreaker>,
}

impl CircuitBreakerStage {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self { breaker }
    }
}

#[async_trait]
impl<Req, Resp> Stage<Req, Resp> for CircuitBreakerStage
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    async fn handle(
        &self,
        call: Call<Req>,
        next: Next<'_, Req, Resp>,
    ) -> Result<Resp> {
        self.breaker.execute(move || next.run(call)).await
    }
}

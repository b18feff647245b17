//! Ordered request pipeline.
//!
//! A [`Pipeline`] is an explicit list of [`Stage`]s in front of one
//! terminal [`Handler`]. Each stage receives the call together with a
//! [`Next`] that runs the remainder of the chain, so a stage can act before
//! and after the inner stages or return early without calling them.
//!
//! ```no_run
//! use warden_core::error::ServiceError;
//! use warden_core::pipeline::{Call, LoggingStage, Pipeline, handler_fn};
//!
//! # async fn demo() -> warden_core::error::Result<()> {
//! let pipeline: Pipeline<String, usize> = Pipeline::builder()
//!     .stage(LoggingStage)
//!     .build(handler_fn(|call: Call<String>| async move {
//!         Ok::<_, ServiceError>(call.request.len())
//!     }));
//!
//! let len = pipeline.dispatch("Echo", "hello".to_string()).await?;
//! assert_eq!(len, 5);
//! # Ok(())
//! # }
//! ```

mod metrics;
mod stages;

pub use metrics::{
    LATENCY_BUCKETS, LatencyBucket, LatencyHistogram, MethodStats,
    MetricsSnapshot, RequestMetrics, ResponseTimes,
};
pub use stages::{
    CircuitBreakerStage, LoggingStage, MetricsStage, RateLimitStage,
    ValidationStage,
};

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;

/// One request travelling through the pipeline.
#[derive(Debug, Clone)]
pub struct Call<Req> {
    pub id: Uuid,
    /// Operation name used for logs and metrics
    pub method: &'static str,
    pub request: Req,
}

impl<Req> Call<Req> {
    pub fn new(method: &'static str, request: Req) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            request,
        }
    }
}

#[async_trait]
pub trait Stage<Req, Resp>: Send + Sync
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    async fn handle(
        &self,
        call: Call<Req>,
        next: Next<'_, Req, Resp>,
    ) -> Result<Resp>;
}

/// Terminal business handler.
#[async_trait]
pub trait Handler<Req, Resp>: Send + Sync
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    async fn call(&self, call: Call<Req>) -> Result<Resp>;
}

/// The part of the chain after the current stage.
pub struct Next<'a, Req, Resp> {
    stages: &'a [Arc<dyn Stage<Req, Resp>>],
    handler: &'a dyn Handler<Req, Resp>,
}

impl<Req, Resp> std::fmt::Debug for Next<'_, Req, Resp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("remaining_stages", &self.stages.len())
            .finish_non_exhaustive()
    }
}

impl<'a, Req, Resp> Next<'a, Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    pub async fn run(self, call: Call<Req>) -> Result<Resp> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    stages: rest,
                    handler: self.handler,
                };
                stage.handle(call, next).await
            }
            None => self.handler.call(call).await,
        }
    }
}

/// [`Handler`] backed by an async closure.
#[derive(Clone)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F> std::fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HandlerFn")
    }
}

pub fn handler_fn<F>(f: F) -> HandlerFn<F> {
    HandlerFn { f }
}

#[async_trait]
impl<Req, Resp, F, Fut> Handler<Req, Resp> for HandlerFn<F>
where
    Req: Send + 'static,
    Resp: Send + 'static,
    F: Fn(Call<Req>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Resp>> + Send,
{
    async fn call(&self, call: Call<Req>) -> Result<Resp> {
        (self.f)(call).await
    }
}

pub struct Pipeline<Req, Resp> {
    stages: Vec<Arc<dyn Stage<Req, Resp>>>,
    handler: Arc<dyn Handler<Req, Resp>>,
}

impl<Req, Resp> Clone for Pipeline<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            stages: self.stages.clone(),
            handler: self.handler.clone(),
        }
    }
}

impl<Req, Resp> std::fmt::Debug for Pipeline<Req, Resp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages.len())
            .finish_non_exhaustive()
    }
}

impl<Req, Resp> Pipeline<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    pub fn builder() -> PipelineBuilder<Req, Resp> {
        PipelineBuilder::new()
    }

    pub async fn call(&self, call: Call<Req>) -> Result<Resp> {
        Next {
            stages: &self.stages,
            handler: self.handler.as_ref(),
        }
        .run(call)
        .await
    }

    /// Wrap `request` in a fresh [`Call`] and run it.
    pub async fn dispatch(
        &self,
        method: &'static str,
        request: Req,
    ) -> Result<Resp> {
        self.call(Call::new(method, request)).await
    }
}

/// Collects stages in execution order.
pub struct PipelineBuilder<Req, Resp> {
    stages: Vec<Arc<dyn Stage<Req, Resp>>>,
}

impl<Req, Resp> std::fmt::Debug for PipelineBuilder<Req, Resp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("stages", &self.stages.len())
            .finish()
    }
}

impl<Req, Resp> Default for PipelineBuilder<Req, Resp> {
    fn default() -> Self {
        Self { stages: Vec::new() }
    }
}

impl<Req, Resp> PipelineBuilder<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage; stages run in the order they were added.
    pub fn stage(mut self, stage: impl Stage<Req, Resp> + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn build(
        self,
        handler: impl Handler<Req, Resp> + 'static,
    ) -> Pipeline<Req, Resp> {
        Pipeline {
            stages: self.stages,
            handler: Arc::new(handler),
        }
    }
}

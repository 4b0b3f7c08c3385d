// Handler contract - business logic registered per key

use crate::application::context::JobContext;
use crate::domain::{Disposition, Job};
use crate::error::AppError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

/// Handler failure. The worker maps any of these to `Disposition::Unknown`.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    App(#[from] AppError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn failed(msg: impl Into<String>) -> Self {
        HandlerError::Failed(msg.into())
    }
}

pub type HandlerResult = std::result::Result<Disposition, HandlerError>;

/// Job handler for one key
#[async_trait]
pub trait Handler: Send + Sync {
    /// Key this handler consumes
    fn key(&self) -> &str;

    /// Lease duration, and the idle sleep between empty polls
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Jobs claimed and handled concurrently per poll (default 1)
    fn concurrency(&self) -> Option<u32> {
        None
    }

    /// Jobs whose attempt count exceeds this are resolved `Error` without invoking the handler.
    ///
    /// A peek handler sees the count before its own activation bumps it, so with the same
    /// budget it gets one more invocation than a claiming handler.
    fn max_attempt_count(&self) -> Option<u32> {
        None
    }

    /// Peek jobs instead of leasing them; the handler decides whether to `ctx.activate()`
    fn should_peek(&self) -> bool {
        false
    }

    async fn handle(&self, ctx: &mut JobContext) -> HandlerResult;
}

/// Job with `data` and `metadata` deserialized into handler types
#[derive(Debug, Clone)]
pub struct TypedJob<D, M> {
    pub data: D,
    pub metadata: Option<M>,
}

impl<D: DeserializeOwned, M: DeserializeOwned> TypedJob<D, M> {
    pub fn from_job(job: &Job) -> Result<Self, serde_json::Error> {
        let data = serde_json::from_value(job.data.as_value().clone())?;
        let metadata = job
            .metadata
            .as_ref()
            .map(|m| serde_json::from_value(m.as_value().clone()))
            .transpose()?;
        Ok(Self { data, metadata })
    }
}

/// Handler that works with strongly typed payloads. Register it wrapped in [`Typed`].
#[async_trait]
pub trait TypedHandler: Send + Sync {
    type Data: DeserializeOwned + Send + Sync;
    type Metadata: DeserializeOwned + Send + Sync;

    fn key(&self) -> &str;

    fn timeout(&self) -> Option<Duration> {
        None
    }

    fn concurrency(&self) -> Option<u32> {
        None
    }

    fn max_attempt_count(&self) -> Option<u32> {
        None
    }

    fn should_peek(&self) -> bool {
        false
    }

    async fn handle(
        &self,
        job: TypedJob<Self::Data, Self::Metadata>,
        ctx: &mut JobContext,
    ) -> HandlerResult;
}

/// Adapter from [`TypedHandler`] to [`Handler`]; a payload that fails to deserialize is a handler fault
pub struct Typed<H>(pub H);

#[async_trait]
impl<H: TypedHandler> Handler for Typed<H> {
    fn key(&self) -> &str {
        self.0.key()
    }

    fn timeout(&self) -> Option<Duration> {
        self.0.timeout()
    }

    fn concurrency(&self) -> Option<u32> {
        self.0.concurrency()
    }

    fn max_attempt_count(&self) -> Option<u32> {
        self.0.max_attempt_count()
    }

    fn should_peek(&self) -> bool {
        self.0.should_peek()
    }

    async fn handle(&self, ctx: &mut JobContext) -> HandlerResult {
        let job = TypedJob::from_job(ctx.job())?;
        self.0.handle(job, ctx).await
    }
}

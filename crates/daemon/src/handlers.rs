// Built-in handlers wired by the daemon

use crate::config::DaemonConfig;
use async_trait::async_trait;
use outbox_core::application::{Handler, HandlerResult, JobContext};
use outbox_core::domain::Disposition;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Logs every job it receives and completes it
pub struct LogHandler {
    key: String,
    timeout: Option<Duration>,
    concurrency: Option<u32>,
    max_attempt_count: Option<u32>,
}

impl LogHandler {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            timeout: None,
            concurrency: None,
            max_attempt_count: None,
        }
    }

    pub fn with_limits(
        mut self,
        timeout: Option<Duration>,
        concurrency: Option<u32>,
        max_attempt_count: Option<u32>,
    ) -> Self {
        self.timeout = timeout;
        self.concurrency = concurrency;
        self.max_attempt_count = max_attempt_count;
        self
    }
}

#[async_trait]
impl Handler for LogHandler {
    fn key(&self) -> &str {
        &self.key
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn concurrency(&self) -> Option<u32> {
        self.concurrency
    }

    fn max_attempt_count(&self) -> Option<u32> {
        self.max_attempt_count
    }

    async fn handle(&self, ctx: &mut JobContext) -> HandlerResult {
        let job = ctx.job();
        info!(
            key = %job.key,
            job_id = job.id,
            attempt_count = job.attempt_count,
            data = %job.data.as_value(),
            "Received job"
        );
        Ok(Disposition::Complete)
    }
}

/// One `LogHandler` per configured key
pub fn from_config(config: &DaemonConfig) -> Vec<Arc<dyn Handler>> {
    config
        .keys
        .iter()
        .map(|key| {
            Arc::new(LogHandler::new(key.as_str()).with_limits(
                config.lease,
                config.concurrency,
                config.max_attempts,
            )) as Arc<dyn Handler>
        })
        .collect()
}

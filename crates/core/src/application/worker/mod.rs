// Worker - per-key polling loops driving handlers against the queue

pub mod constants;
mod panic_guard;
mod shutdown;

use constants::*;
pub use panic_guard::{execute_guarded_async, panic_message, PanicGuardResult};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::context::JobContext;
use crate::application::handler::{Handler, HandlerError};
use crate::application::queue::{GetNextParams, QueueService, ResolveParams};
use crate::domain::{Disposition, DomainError, Job};
use crate::error::{AppError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Result of one poll-and-dispatch cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Nothing claimable
    Empty,
    /// Jobs were peeked but none was activated; nothing changed
    Skipped(usize),
    /// At least one job in the batch was leased and handled
    Processed(usize),
}

/// What happened to a single job of a batch
#[derive(Debug, Clone, PartialEq)]
enum JobOutcome {
    Resolved(Disposition),
    ResolveFailed,
    /// Peeked and never activated
    Skipped,
}

/// Runs one independent polling loop per registered handler
pub struct WorkerEngine {
    service: Arc<QueueService>,
    handlers: Vec<Arc<dyn Handler>>,
}

impl WorkerEngine {
    pub fn new(service: Arc<QueueService>) -> Self {
        Self {
            service,
            handlers: Vec::new(),
        }
    }

    /// Register a handler; each gets its own loop
    pub fn register(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn handler_keys(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.key()).collect()
    }

    /// Run every handler loop until shutdown is requested.
    ///
    /// In-flight handler invocations run to completion; no new batch starts after shutdown.
    /// A loop that dies (panic outside a handler) does not stop its siblings, but is
    /// reported as an error once every loop has ended.
    pub async fn run(&self, shutdown: ShutdownToken) -> Result<()> {
        info!(handlers = self.handlers.len(), "Worker engine starting");

        let mut loops = JoinSet::new();
        for handler in &self.handlers {
            let worker = Worker::new(Arc::clone(&self.service), Arc::clone(handler));
            let token = shutdown.clone();
            loops.spawn(async move { worker.run(token).await });
        }

        let mut aborted = 0;
        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker loop aborted");
                aborted += 1;
            }
        }

        info!("Worker engine stopped");
        if aborted > 0 {
            return Err(AppError::Internal(format!(
                "{} of {} worker loops aborted",
                aborted,
                self.handlers.len()
            )));
        }
        Ok(())
    }
}

/// Polling loop for a single handler key
pub struct Worker {
    service: Arc<QueueService>,
    handler: Arc<dyn Handler>,
}

impl Worker {
    pub fn new(service: Arc<QueueService>, handler: Arc<dyn Handler>) -> Self {
        Self { service, handler }
    }

    /// Poll, dispatch, repeat. Sleeps only after an empty (or all-skipped) poll or a failed one.
    pub async fn run(&self, mut shutdown: ShutdownToken) {
        let key = self.handler.key();
        info!(key = %key, "Worker started");

        loop {
            if shutdown.is_shutdown() {
                info!(key = %key, "Worker shutting down");
                break;
            }

            let pause = match self.process_batch().await {
                Ok(BatchOutcome::Processed(_)) => None,
                Ok(BatchOutcome::Empty) | Ok(BatchOutcome::Skipped(_)) => Some(self.idle_sleep()),
                Err(e) => {
                    error!(key = %key, error = %e, "Polling failed");
                    Some(ERROR_RECOVERY_SLEEP_DURATION)
                }
            };

            if let Some(pause) = pause {
                tokio::select! {
                    _ = sleep(pause) => {},
                    _ = shutdown.wait() => {
                        info!(key = %key, "Worker interrupted during idle");
                        break;
                    }
                }
            }
        }

        info!(key = %key, "Worker stopped");
    }

    fn idle_sleep(&self) -> Duration {
        self.handler.timeout().unwrap_or(DEFAULT_IDLE_SLEEP_DURATION)
    }

    /// Claim one batch and handle every job concurrently, waiting for all of them
    pub async fn process_batch(&self) -> Result<BatchOutcome> {
        let params = GetNextParams {
            key: self.handler.key().to_string(),
            count: self
                .handler
                .concurrency()
                .unwrap_or(DEFAULT_CONCURRENCY)
                .max(1),
            timeout: self.handler.timeout(),
            should_peek: self.handler.should_peek(),
        };

        let jobs = self.service.get_next(&params).await?;
        if jobs.is_empty() {
            return Ok(BatchOutcome::Empty);
        }

        let total = jobs.len();
        let mut tasks = JoinSet::new();
        for job in jobs {
            tasks.spawn(handle_and_resolve(
                Arc::clone(&self.service),
                Arc::clone(&self.handler),
                job,
            ));
        }

        let mut skipped = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(JobOutcome::Skipped) => skipped += 1,
                Ok(JobOutcome::Resolved(_)) | Ok(JobOutcome::ResolveFailed) => {}
                Err(e) => error!(key = %params.key, error = %e, "Job task failed"),
            }
        }

        if skipped == total {
            Ok(BatchOutcome::Skipped(total))
        } else {
            Ok(BatchOutcome::Processed(total))
        }
    }
}

fn exceeds_attempt_budget(handler: &dyn Handler, job: &Job) -> bool {
    handler
        .max_attempt_count()
        .is_some_and(|max| job.attempt_count > max)
}

/// Handle one job and resolve it with the context's current receipt.
/// Handler faults and panics become `Disposition::Unknown`; nothing escapes this boundary.
async fn handle_and_resolve(
    service: Arc<QueueService>,
    handler: Arc<dyn Handler>,
    job: Job,
) -> JobOutcome {
    let key = handler.key();
    let job_id = job.id;
    let mut ctx = JobContext::new(job, Arc::clone(&service), handler.timeout());

    let disposition = if exceeds_attempt_budget(handler.as_ref(), ctx.job()) {
        warn!(
            key = %key,
            job_id,
            attempt_count = ctx.job().attempt_count,
            max_attempt_count = ?handler.max_attempt_count(),
            "Attempt budget exceeded, failing job without invoking handler"
        );
        if ctx.is_peeked() {
            if let Err(e) = ctx.activate().await {
                warn!(key = %key, job_id, error = %e, "Could not lease over-budget job");
                return JobOutcome::Skipped;
            }
        }
        Disposition::Error
    } else {
        let result = match execute_guarded_async(handler.handle(&mut ctx)).await {
            PanicGuardResult::Success(result) => result,
            PanicGuardResult::Panicked(msg) => Err(HandlerError::Panicked(msg)),
        };
        match result {
            Ok(disposition) => disposition,
            Err(e) => {
                error!(key = %key, job_id, error = %e, "Handler failed");
                Disposition::Unknown
            }
        }
    };

    let params = ResolveParams::new(disposition.clone(), ctx.receipt().cloned());
    match service.resolve(job_id, params).await {
        Ok(resolved) => {
            debug!(
                key = %key,
                job_id,
                disposition = disposition.name(),
                status = ?resolved.status,
                "Job resolved"
            );
            JobOutcome::Resolved(disposition)
        }
        Err(AppError::Domain(DomainError::UnauthorizedResolve(_))) => {
            debug!(key = %key, job_id, "Peeked job not activated, leaving it untouched");
            JobOutcome::Skipped
        }
        Err(e) if e.is_conflict() => {
            warn!(key = %key, job_id, error = %e, "Stale resolve, job was changed by another actor");
            JobOutcome::ResolveFailed
        }
        Err(e) => {
            error!(key = %key, job_id, error = %e, "Resolve failed");
            JobOutcome::ResolveFailed
        }
    }
}

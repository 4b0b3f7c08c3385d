// Queue Service - claim / resolve / activate protocol over the JobStore

pub mod enqueue;

pub use enqueue::EnqueueRequest;

use crate::domain::{Disposition, DomainError, Job, JobId, Receipt};
use crate::error::Result;
use crate::port::{ClaimQuery, JobStore, ResolveUpdate, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Parameters for [`QueueService::get_next`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetNextParams {
    pub key: String,
    pub count: u32,
    /// Lease duration; `None` means immediately visible again
    pub timeout: Option<Duration>,
    pub should_peek: bool,
}

impl GetNextParams {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            count: 1,
            timeout: None,
            should_peek: false,
        }
    }

    pub fn count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn peek(mut self) -> Self {
        self.should_peek = true;
        self
    }
}

/// Parameters for [`QueueService::resolve`]
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveParams {
    pub disposition: Disposition,
    pub receipt: Option<Receipt>,
}

impl ResolveParams {
    pub fn new(disposition: Disposition, receipt: Option<Receipt>) -> Self {
        Self {
            disposition,
            receipt,
        }
    }
}

/// Stateless façade over the job store. Owns timestamp generation.
pub struct QueueService {
    store: Arc<dyn JobStore>,
    time_provider: Arc<dyn TimeProvider>,
}

impl QueueService {
    pub fn new(store: Arc<dyn JobStore>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            store,
            time_provider,
        }
    }

    /// Create a new pending job
    pub async fn enqueue(&self, req: EnqueueRequest) -> Result<Job> {
        enqueue::execute(self.store.as_ref(), self.time_provider.as_ref(), req).await
    }

    pub async fn find(&self, id: JobId) -> Result<Option<Job>> {
        self.store.find_by_id(id).await
    }

    /// Claim (or peek) up to `count` jobs. An empty result means "no work", not an error.
    pub async fn get_next(&self, params: &GetNextParams) -> Result<Vec<Job>> {
        if params.count == 0 {
            return Ok(Vec::new());
        }

        let query = ClaimQuery {
            key: params.key.clone(),
            count: params.count,
            lease: params.timeout.unwrap_or(Duration::ZERO),
            peek: params.should_peek,
        };
        let now = self.time_provider.now_millis();

        let mut jobs = self.store.claim_next(&query, now).await?;
        jobs.sort_by_key(|job| job.id);
        if params.should_peek {
            // A peek grants no lease, even over a row still carrying a lapsed receipt
            for job in &mut jobs {
                job.receipt = None;
            }
        }

        debug!(
            key = %params.key,
            requested = params.count,
            claimed = jobs.len(),
            peek = params.should_peek,
            "get_next"
        );
        Ok(jobs)
    }

    /// Resolve a leased job with the handler's disposition.
    ///
    /// # Errors
    /// - `DomainError::UnauthorizedResolve` if no receipt is given
    /// - `DomainError::StaleResolve` if the receipt no longer matches, or the job is terminal or missing
    pub async fn resolve(&self, id: JobId, params: ResolveParams) -> Result<Job> {
        let receipt = params
            .receipt
            .ok_or(DomainError::UnauthorizedResolve(id))?;

        let now = self.time_provider.now_millis();
        let disposition = params.disposition;
        let update = ResolveUpdate {
            status: disposition.status(),
            metadata: disposition.metadata().cloned(),
            completed_at: disposition.is_completion().then_some(now),
        };

        match self.store.resolve_job(id, &receipt, &update, now).await? {
            Some(job) => {
                debug!(job_id = id, disposition = disposition.name(), "Job resolved");
                Ok(job)
            }
            None => Err(DomainError::StaleResolve { id, receipt }.into()),
        }
    }

    /// Lease a peeked job.
    ///
    /// # Errors
    /// - `DomainError::AlreadyLeased` if the job holds an unexpired lease, is terminal or missing
    pub async fn activate(&self, id: JobId, timeout: Option<Duration>) -> Result<Job> {
        let now = self.time_provider.now_millis();
        let lease = timeout.unwrap_or(Duration::ZERO);

        match self.store.activate_job(id, lease, now).await? {
            Some(job) => {
                debug!(job_id = id, attempt_count = job.attempt_count, "Job activated");
                Ok(job)
            }
            None => Err(DomainError::AlreadyLeased(id).into()),
        }
    }
}

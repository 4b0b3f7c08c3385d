// Job Context - one claimed job bound to its lease and the activation capability

use crate::application::queue::QueueService;
use crate::domain::{Job, JobPayload, LeaseProperties, Receipt};
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// Per-invocation view of a claimed (or peeked) job.
///
/// A peeked job carries no receipt. Calling [`JobContext::activate`] leases it and
/// rebinds the context to the activated row, so the receipt used for resolving
/// afterwards is the activated one.
pub struct JobContext {
    job: Job,
    service: Arc<QueueService>,
    lease_timeout: Option<Duration>,
}

impl JobContext {
    pub fn new(job: Job, service: Arc<QueueService>, lease_timeout: Option<Duration>) -> Self {
        Self {
            job,
            service,
            lease_timeout,
        }
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn key(&self) -> &str {
        &self.job.key
    }

    pub fn data(&self) -> &JobPayload {
        &self.job.data
    }

    pub fn metadata(&self) -> Option<&JobPayload> {
        self.job.metadata.as_ref()
    }

    pub fn properties(&self) -> LeaseProperties {
        self.job.lease_properties()
    }

    pub fn receipt(&self) -> Option<&Receipt> {
        self.job.receipt.as_ref()
    }

    /// True until the job holds a lease
    pub fn is_peeked(&self) -> bool {
        self.job.receipt.is_none()
    }

    /// Lease the peeked job and rebind this context to the activated row.
    ///
    /// # Errors
    /// `DomainError::AlreadyLeased` when the job already holds a live lease (including a
    /// second call on the same context); the context is left unchanged.
    pub async fn activate(&mut self) -> Result<&Job> {
        let activated = self
            .service
            .activate(self.job.id, self.lease_timeout)
            .await?;
        self.job = activated;
        Ok(&self.job)
    }

    pub fn into_job(self) -> Job {
        self.job
    }
}

impl std::fmt::Debug for JobContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobContext")
            .field("job", &self.job)
            .field("lease_timeout", &self.lease_timeout)
            .finish_non_exhaustive()
    }
}

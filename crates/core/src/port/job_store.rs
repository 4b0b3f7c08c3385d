// Job Store Port (Interface)
//
// The store is the only shared mutable resource. Each operation below must be a
// single all-or-nothing conditional update under arbitrary concurrent callers.

use crate::domain::{Job, JobId, JobPayload, JobStatus, NewJob, Receipt};
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Claim (or peek) request for up to `count` jobs of one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimQuery {
    pub key: String,
    pub count: u32,
    pub lease: Duration,
    pub peek: bool,
}

/// Column changes applied by a receipt-bound resolve
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveUpdate {
    /// `None` keeps the job pending
    pub status: Option<JobStatus>,
    /// `None` keeps the stored metadata
    pub metadata: Option<JobPayload>,
    /// `None` leaves `completed_at` untouched
    pub completed_at: Option<i64>,
}

/// `now + lease` in epoch ms, saturating
pub fn lease_deadline(now_millis: i64, lease: Duration) -> i64 {
    let lease_ms = i64::try_from(lease.as_millis()).unwrap_or(i64::MAX);
    now_millis.saturating_add(lease_ms)
}

/// Repository interface for job persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new pending job and return the stored row
    async fn insert(&self, job: &NewJob, now_millis: i64) -> Result<Job>;

    /// Find job by ID
    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>>;

    /// Select up to `count` visible, non-terminal jobs of `key` in ascending id order.
    ///
    /// Without `peek` the selected rows are leased in the same atomic step
    /// (`attempt_count + 1`, fresh receipt, `next_visible_at = now + lease`) and the
    /// post-update rows are returned. With `peek` rows are returned unmodified.
    async fn claim_next(&self, query: &ClaimQuery, now_millis: i64) -> Result<Vec<Job>>;

    /// Apply `update` where `id` and `receipt` match and `status IS NULL`; clears the receipt.
    ///
    /// `Ok(None)` means the predicate did not match (stale receipt, terminal or missing row).
    async fn resolve_job(
        &self,
        id: JobId,
        receipt: &Receipt,
        update: &ResolveUpdate,
        now_millis: i64,
    ) -> Result<Option<Job>>;

    /// Lease a non-terminal job that holds no live lease (no receipt, or one whose
    /// `next_visible_at` has passed). `Ok(None)` if leased, terminal or missing.
    async fn activate_job(&self, id: JobId, lease: Duration, now_millis: i64)
        -> Result<Option<Job>>;
}

// In-memory JobStore
//
// Every operation runs under one mutex, which gives the same all-or-nothing
// semantics the SQL store gets from single-statement conditional updates.

use super::job_store::{lease_deadline, ClaimQuery, JobStore, ResolveUpdate};
use crate::domain::{Job, JobId, NewJob, Receipt};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Default)]
struct State {
    last_id: JobId,
    jobs: BTreeMap<JobId, Job>,
}

/// Process-local store for tests and embedded use
#[derive(Default)]
pub struct InMemoryJobStore {
    state: Mutex<State>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal("in-memory job store lock poisoned".to_string()))
    }

    /// Snapshot of every row for `key`, ascending by id
    pub fn jobs_for_key(&self, key: &str) -> Result<Vec<Job>> {
        let state = self.lock()?;
        Ok(state
            .jobs
            .values()
            .filter(|job| job.key == key)
            .cloned()
            .collect())
    }

    /// Overwrite a stored row (test setup for states not reachable through the protocol)
    pub fn put(&self, job: Job) -> Result<()> {
        let mut state = self.lock()?;
        state.last_id = state.last_id.max(job.id);
        state.jobs.insert(job.id, job);
        Ok(())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: &NewJob, now_millis: i64) -> Result<Job> {
        let mut state = self.lock()?;
        state.last_id += 1;
        let row = Job::pending(state.last_id, job.clone(), now_millis);
        state.jobs.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>> {
        Ok(self.lock()?.jobs.get(&id).cloned())
    }

    async fn claim_next(&self, query: &ClaimQuery, now_millis: i64) -> Result<Vec<Job>> {
        let mut state = self.lock()?;
        let limit = usize::try_from(query.count).unwrap_or(usize::MAX);

        let selected: Vec<JobId> = state
            .jobs
            .values()
            .filter(|job| job.key == query.key && job.is_visible_at(now_millis))
            .take(limit)
            .map(|job| job.id)
            .collect();

        let mut claimed = Vec::with_capacity(selected.len());
        for id in selected {
            let Some(job) = state.jobs.get_mut(&id) else {
                continue;
            };
            if !query.peek {
                job.attempt_count = job.attempt_count.saturating_add(1);
                job.receipt = Some(Receipt::generate());
                job.next_visible_at = Some(lease_deadline(now_millis, query.lease));
                job.updated_at = now_millis;
            }
            claimed.push(job.clone());
        }
        Ok(claimed)
    }

    async fn resolve_job(
        &self,
        id: JobId,
        receipt: &Receipt,
        update: &ResolveUpdate,
        now_millis: i64,
    ) -> Result<Option<Job>> {
        let mut state = self.lock()?;
        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(None);
        };
        if job.status.is_some() || job.receipt.as_ref() != Some(receipt) {
            return Ok(None);
        }

        job.status = update.status;
        if let Some(metadata) = &update.metadata {
            job.metadata = Some(metadata.clone());
        }
        if let Some(completed_at) = update.completed_at {
            job.completed_at = Some(completed_at);
        }
        job.receipt = None;
        job.updated_at = now_millis;
        Ok(Some(job.clone()))
    }

    async fn activate_job(
        &self,
        id: JobId,
        lease: Duration,
        now_millis: i64,
    ) -> Result<Option<Job>> {
        let mut state = self.lock()?;
        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(None);
        };
        // A receipt whose lease has lapsed no longer blocks activation
        let lease_held = job.receipt.is_some() && !job.is_visible_at(now_millis);
        if job.status.is_some() || lease_held {
            return Ok(None);
        }

        job.attempt_count = job.attempt_count.saturating_add(1);
        job.receipt = Some(Receipt::generate());
        job.next_visible_at = Some(lease_deadline(now_millis, lease));
        job.updated_at = now_millis;
        Ok(Some(job.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobStatus;
    use serde_json::json;

    async fn seeded(count: usize) -> InMemoryJobStore {
        let store = InMemoryJobStore::new();
        for i in 0..count {
            store
                .insert(&NewJob::new("k", json!({ "n": i })), 1_000)
                .await
                .unwrap();
        }
        store
    }

    fn claim(count: u32, peek: bool) -> ClaimQuery {
        ClaimQuery {
            key: "k".to_string(),
            count,
            lease: Duration::from_secs(60),
            peek,
        }
    }

    #[tokio::test]
    async fn test_claim_takes_lowest_ids_and_leases_them() {
        let store = seeded(4).await;

        let jobs = store.claim_next(&claim(2, false), 2_000).await.unwrap();
        assert_eq!(jobs.iter().map(|j| j.id).collect::<Vec<_>>(), vec![1, 2]);
        for job in &jobs {
            assert_eq!(job.attempt_count, 1);
            assert!(job.receipt.is_some());
            assert_eq!(job.next_visible_at, Some(62_000));
        }

        // Leased rows are skipped by the next claim
        let next = store.claim_next(&claim(5, false), 2_000).await.unwrap();
        assert_eq!(next.iter().map(|j| j.id).collect::<Vec<_>>(), vec![3, 4]);
    }

    #[tokio::test]
    async fn test_peek_leaves_rows_untouched() {
        let store = seeded(3).await;
        let before = store.jobs_for_key("k").unwrap();

        let peeked = store.claim_next(&claim(3, true), 2_000).await.unwrap();
        assert_eq!(peeked, before);
        assert_eq!(store.jobs_for_key("k").unwrap(), before);
    }

    #[tokio::test]
    async fn test_other_keys_are_invisible() {
        let store = seeded(2).await;
        store
            .insert(&NewJob::new("other", json!({})), 1_000)
            .await
            .unwrap();

        let mut query = claim(10, false);
        query.key = "other".to_string();
        let jobs = store.claim_next(&query, 2_000).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].key, "other");
    }

    #[tokio::test]
    async fn test_resolve_requires_matching_receipt() {
        let store = seeded(1).await;
        let job = store.claim_next(&claim(1, false), 2_000).await.unwrap().remove(0);
        let update = ResolveUpdate {
            status: Some(JobStatus::Success),
            metadata: None,
            completed_at: Some(3_000),
        };

        let wrong = Receipt::new("not-the-receipt");
        assert!(store.resolve_job(job.id, &wrong, &update, 3_000).await.unwrap().is_none());

        let receipt = job.receipt.clone().unwrap();
        let resolved = store
            .resolve_job(job.id, &receipt, &update, 3_000)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.status, Some(JobStatus::Success));
        assert_eq!(resolved.receipt, None);

        // Second resolve with the same receipt is stale
        assert!(store.resolve_job(job.id, &receipt, &update, 3_000).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_activate_only_receipt_free_rows() {
        let store = seeded(2).await;
        let leased = store.claim_next(&claim(1, false), 2_000).await.unwrap().remove(0);

        assert!(store
            .activate_job(leased.id, Duration::from_secs(5), 2_000)
            .await
            .unwrap()
            .is_none());

        let activated = store
            .activate_job(2, Duration::from_secs(5), 2_000)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(activated.attempt_count, 1);
        assert!(activated.receipt.is_some());
        assert_eq!(activated.next_visible_at, Some(7_000));

        // Lapsed lease can be taken over
        let taken = store
            .activate_job(leased.id, Duration::from_secs(5), 62_000)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(taken.attempt_count, 2);
        assert_ne!(taken.receipt, leased.receipt);

        assert!(store
            .activate_job(99, Duration::ZERO, 2_000)
            .await
            .unwrap()
            .is_none());
    }
}

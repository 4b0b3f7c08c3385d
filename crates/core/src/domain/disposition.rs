// Handler disposition: the verdict on a handled job

use super::job::{JobPayload, JobStatus};

/// What to do with a handled job
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Done; terminal `Success`
    Complete,
    /// Keep pending, optionally replacing metadata
    Update(Option<JobPayload>),
    /// Failed permanently; terminal `Error`
    Error,
    /// Inconclusive; releases the lease so the job is retried once visible again
    Unknown,
}

impl Disposition {
    /// Status written on resolve. `None` keeps the job pending.
    pub fn status(&self) -> Option<JobStatus> {
        match self {
            Disposition::Complete => Some(JobStatus::Success),
            Disposition::Error => Some(JobStatus::Error),
            Disposition::Update(_) | Disposition::Unknown => None,
        }
    }

    /// Only true completions stamp `completed_at`
    pub fn is_completion(&self) -> bool {
        self.status().is_some()
    }

    pub fn metadata(&self) -> Option<&JobPayload> {
        match self {
            Disposition::Update(metadata) => metadata.as_ref(),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Disposition::Complete => "complete",
            Disposition::Update(_) => "update",
            Disposition::Error => "error",
            Disposition::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Disposition::Complete.status(), Some(JobStatus::Success));
        assert_eq!(Disposition::Error.status(), Some(JobStatus::Error));
        assert_eq!(Disposition::Unknown.status(), None);
        assert_eq!(Disposition::Update(None).status(), None);
    }

    #[test]
    fn test_only_update_carries_metadata() {
        let metadata = JobPayload::new(json!({"step": 2}));
        assert_eq!(
            Disposition::Update(Some(metadata.clone())).metadata(),
            Some(&metadata)
        );
        assert!(Disposition::Complete.metadata().is_none());
    }
}

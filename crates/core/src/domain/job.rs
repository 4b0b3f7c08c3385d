// Job Domain Model

use serde::{Deserialize, Serialize};

/// Job ID (monotonic, assigned by the store; defines FIFO order within a key)
pub type JobId = i64;

/// Partition key: one handler and one worker loop per key
pub type JobKey = String;

/// Terminal job status. `None` on the row means pending/in-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Success,
    Error,
    Unknown,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Success => "SUCCESS",
            JobStatus::Error => "ERROR",
            JobStatus::Unknown => "UNKNOWN",
        }
    }

    /// Parse a persisted status. Unrecognized values read as `Unknown`, which is still terminal.
    pub fn parse(s: &str) -> Self {
        match s {
            "SUCCESS" => JobStatus::Success,
            "ERROR" => JobStatus::Error,
            _ => JobStatus::Unknown,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lease receipt: opaque token proving the holder performed the latest claim or activation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Receipt(String);

impl Receipt {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Fresh random receipt (32 lowercase hex chars, same shape the SQLite store generates)
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Receipt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job payload (JSON serializable). Used for both `data` and `metadata`; never interpreted by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload(serde_json::Value);

impl JobPayload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for JobPayload {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Persisted job record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub key: JobKey,

    pub data: JobPayload,
    pub metadata: Option<JobPayload>,

    // Lease
    pub attempt_count: u32,
    pub receipt: Option<Receipt>,
    pub next_visible_at: Option<i64>, // epoch ms

    pub status: Option<JobStatus>,

    pub created_at: i64, // epoch ms
    pub updated_at: i64,
    pub completed_at: Option<i64>,
}

impl Job {
    /// Build a fresh pending row as the store would persist it
    pub fn pending(id: JobId, new_job: NewJob, now_millis: i64) -> Self {
        Self {
            id,
            key: new_job.key,
            data: new_job.data,
            metadata: new_job.metadata,
            attempt_count: 0,
            receipt: None,
            next_visible_at: None,
            status: None,
            created_at: now_millis,
            updated_at: now_millis,
            completed_at: None,
        }
    }

    /// Terminal rows are never claimable again
    pub fn is_terminal(&self) -> bool {
        self.status.is_some()
    }

    /// Eligible for claiming (or peeking) at `now_millis`
    pub fn is_visible_at(&self, now_millis: i64) -> bool {
        !self.is_terminal() && self.next_visible_at.map_or(true, |t| t <= now_millis)
    }

    pub fn lease_properties(&self) -> LeaseProperties {
        LeaseProperties {
            id: self.id,
            attempt_count: self.attempt_count,
            receipt: self.receipt.clone(),
        }
    }
}

/// Lease-related view of a job handed to handlers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseProperties {
    pub id: JobId,
    pub attempt_count: u32,
    pub receipt: Option<Receipt>,
}

/// Creation input for a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    pub key: JobKey,
    pub data: JobPayload,
    #[serde(default)]
    pub metadata: Option<JobPayload>,
}

impl NewJob {
    pub fn new(key: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            data: JobPayload::new(data),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(JobPayload::new(metadata));
        self
    }
}

// Enqueue Use Case

use crate::domain::{Job, NewJob};
use crate::error::{AppError, Result};
use crate::port::{JobStore, TimeProvider};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Maximum key length in bytes
pub const MAX_KEY_LEN: usize = 255;

/// Enqueue request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub key: String,
    pub data: serde_json::Value,

    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl EnqueueRequest {
    pub fn new(key: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            data,
            metadata: None,
        }
    }

    fn into_new_job(self) -> NewJob {
        let job = NewJob::new(self.key, self.data);
        match self.metadata {
            Some(metadata) => job.with_metadata(metadata),
            None => job,
        }
    }
}

/// Reject keys no handler could be registered for
pub fn validate_request(req: &EnqueueRequest) -> Result<()> {
    if req.key.is_empty() {
        return Err(AppError::Validation("key must not be empty".to_string()));
    }
    if req.key.len() > MAX_KEY_LEN {
        return Err(AppError::Validation(format!(
            "key too long: {} bytes (max {})",
            req.key.len(),
            MAX_KEY_LEN
        )));
    }
    if req.key.contains('\0') {
        return Err(AppError::Validation(
            "key must not contain NUL bytes".to_string(),
        ));
    }
    Ok(())
}

/// Execute enqueue use case
///
/// # Arguments
///
/// * `store` - Job store
/// * `time_provider` - Time provider (injected for determinism)
/// * `req` - Enqueue request
pub async fn execute(
    store: &dyn JobStore,
    time_provider: &dyn TimeProvider,
    req: EnqueueRequest,
) -> Result<Job> {
    validate_request(&req)?;

    let now = time_provider.now_millis();
    let job = store.insert(&req.into_new_job(), now).await?;

    debug!(job_id = job.id, key = %job.key, "Job enqueued");
    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_key_empty() {
        let result = validate_request(&EnqueueRequest::new("", json!({})));
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_validate_key_too_long() {
        let result = validate_request(&EnqueueRequest::new("a".repeat(256), json!({})));
        assert!(result.unwrap_err().to_string().contains("too long"));
    }

    #[test]
    fn test_validate_key_null_byte() {
        let result = validate_request(&EnqueueRequest::new("mail\0er", json!({})));
        assert!(result.unwrap_err().to_string().contains("NUL"));
    }

    #[test]
    fn test_validate_valid_request() {
        let req = EnqueueRequest::new("emails", json!({"to": "a@example.com"}));
        assert!(validate_request(&req).is_ok());
        assert!(validate_request(&EnqueueRequest::new("a".repeat(255), json!(null))).is_ok());
    }
}

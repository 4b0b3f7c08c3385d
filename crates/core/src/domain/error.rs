// Domain Error Types

use super::job::{JobId, Receipt};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Cannot resolve job {0} without a receipt")]
    UnauthorizedResolve(JobId),

    #[error("Stale resolve for job {id} (receipt {receipt}): lease lost, job terminal or missing")]
    StaleResolve { id: JobId, receipt: Receipt },

    #[error("Job {0} is already leased, terminal or missing")]
    AlreadyLeased(JobId),
}

pub type Result<T> = std::result::Result<T, DomainError>;

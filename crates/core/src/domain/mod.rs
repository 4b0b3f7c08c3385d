// Domain Layer - Pure business logic and entities

pub mod disposition;
pub mod error;
pub mod job;

// Re-exports
pub use disposition::Disposition;
pub use error::DomainError;
pub use job::{Job, JobId, JobKey, JobPayload, JobStatus, LeaseProperties, NewJob, Receipt};

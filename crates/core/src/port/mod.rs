// Port Layer - Interfaces for external dependencies

pub mod job_store;
pub mod memory_store;
pub mod time_provider;

// Re-exports
pub use job_store::{ClaimQuery, JobStore, ResolveUpdate};
pub use memory_store::InMemoryJobStore;
pub use time_provider::{ManualTimeProvider, SystemTimeProvider, TimeProvider};

// Outbox Infrastructure - SQLite Adapter
// Implements: JobStore (claim / resolve / activate as single conditional statements)

mod connection;
mod job_store;
mod migration;

pub use connection::create_pool;
pub use job_store::SqliteJobStore;
pub use migration::run_migrations;

// Note: sqlx::Error conversion is done by job_store::map_sqlx_error
// (orphan rules forbid implementing From<sqlx::Error> for AppError here)

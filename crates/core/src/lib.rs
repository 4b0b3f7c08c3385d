// Outbox Core - Domain Logic, Ports & Worker Engine
// NO infrastructure dependencies

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Application Layer - Queue use cases, handler contract and worker engine

pub mod context;
pub mod handler;
pub mod queue;
pub mod worker;

// Re-exports
pub use context::JobContext;
pub use handler::{Handler, HandlerError, HandlerResult, Typed, TypedHandler, TypedJob};
pub use queue::{EnqueueRequest, GetNextParams, QueueService, ResolveParams};
pub use worker::{
    shutdown_channel, BatchOutcome, ShutdownSender, ShutdownToken, Worker, WorkerEngine,
};

// Panic isolation for handler invocations

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::error;

/// Result of a panic-guarded execution
#[derive(Debug)]
pub enum PanicGuardResult<T> {
    /// Execution completed (the value may itself be an error)
    Success(T),
    /// Execution panicked
    Panicked(String),
}

/// Drive a future to completion, catching any panic raised while polling it.
///
/// Unlike spawning, the future may borrow from the caller, so state it mutated
/// before panicking (e.g. a job context's activated lease) stays observable.
///
/// # Example
/// ```text
/// match execute_guarded_async(handler.handle(&mut ctx)).await {
///     PanicGuardResult::Success(result) => result,
///     PanicGuardResult::Panicked(msg) => Err(HandlerError::Panicked(msg)),
/// }
/// ```
pub async fn execute_guarded_async<F, T>(future: F) -> PanicGuardResult<T>
where
    F: Future<Output = T>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(value) => PanicGuardResult::Success(value),
        Err(payload) => {
            let panic_msg = panic_message(payload.as_ref());
            error!(panic_msg = %panic_msg, "Handler task panicked");
            PanicGuardResult::Panicked(panic_msg)
        }
    }
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

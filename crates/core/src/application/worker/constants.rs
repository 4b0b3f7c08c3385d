// Worker constants (no magic values)
use std::time::Duration;

/// Sleep between polls of an empty queue when the handler has no timeout (5s)
pub const DEFAULT_IDLE_SLEEP_DURATION: Duration = Duration::from_secs(5);

/// Sleep after a failed poll before retrying (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Batch size when the handler does not set a concurrency
pub const DEFAULT_CONCURRENCY: u32 = 1;

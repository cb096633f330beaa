// Worker constants
use std::time::Duration;

/// How long shutdown waits for in-flight jobs before aborting the slots
pub const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(30);

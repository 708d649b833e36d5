//! Scheduler tuning knobs.

use std::time::Duration;

/// Default bound on one tick's metric query.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default time `shutdown` waits for in-flight ticks to finish.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// A metric query slower than this is abandoned and the period counts
    /// as missing data.
    pub query_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

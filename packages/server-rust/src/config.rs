use std::time::Duration;

use crate::telemetry::LogFormat;

/// Orchestration configuration.
///
/// Controls remote-call timeouts and background task intervals. Every field
/// can be set from the command line or a `PROCESSING_*` environment variable
/// when the struct is flattened into a `clap` parser.
#[derive(Debug, Clone, clap::Args)]
pub struct ProcessingConfig {
    /// Timeout for one remote role-containment check, in milliseconds.
    /// A check that does not answer in time denies the candidate.
    #[arg(long, env = "PROCESSING_ROLE_CHECK_TIMEOUT_MS", default_value_t = 2_000)]
    pub role_check_timeout_ms: u64,
    /// Upper bound on an engine's `run` hand-off, in milliseconds.
    #[arg(long, env = "PROCESSING_DISPATCH_TIMEOUT_MS", default_value_t = 5_000)]
    pub dispatch_timeout_ms: u64,
    /// Interval between overdue-execution sweeps, in milliseconds.
    #[arg(long, env = "PROCESSING_TIMEOUT_WATCH_INTERVAL_MS", default_value_t = 10_000)]
    pub timeout_watch_interval_ms: u64,
    /// Queue capacity of the local workload engine.
    #[arg(long, env = "PROCESSING_LOCAL_ENGINE_CAPACITY", default_value_t = 256)]
    pub local_engine_capacity: usize,
    /// Log output format.
    #[arg(long, env = "PROCESSING_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl ProcessingConfig {
    #[must_use]
    pub fn role_check_timeout(&self) -> Duration {
        Duration::from_millis(self.role_check_timeout_ms)
    }

    #[must_use]
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    #[must_use]
    pub fn timeout_watch_interval(&self) -> Duration {
        Duration::from_millis(self.timeout_watch_interval_ms)
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            role_check_timeout_ms: 2_000,
            dispatch_timeout_ms: 5_000,
            timeout_watch_interval_ms: 10_000,
            local_engine_capacity: 256,
            log_format: LogFormat::Pretty,
        }
    }
}

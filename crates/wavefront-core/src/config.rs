//! Runtime configuration.
//!
//! Behavior knobs come from environment variables with conservative
//! defaults. Invalid values fall back to the default with a warning rather
//! than failing startup.

use std::time::Duration;

/// `LOCK_TIMEOUT_MS` default: how long lock acquisition may block.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 30_000;

/// `ACTIVITY_MAX_BYTES` default: activity log rotation threshold (100 KiB).
pub const DEFAULT_ACTIVITY_MAX_BYTES: u64 = 102_400;

/// `STALE_TASK_SECONDS` default: running watchdog entries older than this
/// are failed on recovery.
pub const DEFAULT_STALE_TASK_SECONDS: u64 = 3_600;

/// `WORKER_DEADLINE_SECONDS` default: per-task worker deadline.
pub const DEFAULT_WORKER_DEADLINE_SECONDS: u64 = 3_600;

/// How many archived activity logs rotation keeps around.
pub const ACTIVITY_ARCHIVE_KEEP: usize = 5;

/// Interval between polls while awaiting worker/registry changes.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
/// Resolved runtime configuration for one invocation.
pub struct RuntimeConfig {
    /// Upper bound on lock acquisition waits.
    pub lock_timeout: Duration,
    /// Activity log size that triggers rotation.
    pub activity_max_bytes: u64,
    /// Age beyond which a running watchdog entry is considered stale.
    pub stale_task_threshold: Duration,
    /// Per-task worker deadline.
    pub worker_deadline: Duration,
    /// Fire a micro-checkpoint every N task completions, when set.
    ///
    /// The threshold is empirical and deliberately has no default; leaving
    /// it unset disables the heuristic.
    pub micro_checkpoint_task_interval: Option<u32>,
    /// Fire a micro-checkpoint when uncommitted worker output exceeds this
    /// many bytes, when set. No default, same as the task interval.
    pub micro_checkpoint_context_bytes: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            activity_max_bytes: DEFAULT_ACTIVITY_MAX_BYTES,
            stale_task_threshold: Duration::from_secs(DEFAULT_STALE_TASK_SECONDS),
            worker_deadline: Duration::from_secs(DEFAULT_WORKER_DEADLINE_SECONDS),
            micro_checkpoint_task_interval: None,
            micro_checkpoint_context_bytes: None,
        }
    }
}

impl RuntimeConfig {
    /// Resolve configuration from the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = read_var_u64("LOCK_TIMEOUT_MS") {
            config.lock_timeout = Duration::from_millis(ms);
        }
        if let Some(bytes) = read_var_u64("ACTIVITY_MAX_BYTES") {
            config.activity_max_bytes = bytes;
        }
        if let Some(secs) = read_var_u64("STALE_TASK_SECONDS") {
            config.stale_task_threshold = Duration::from_secs(secs);
        }
        if let Some(secs) = read_var_u64("WORKER_DEADLINE_SECONDS") {
            config.worker_deadline = Duration::from_secs(secs);
        }
        if let Some(n) = read_var_u64("MICRO_CHECKPOINT_TASK_INTERVAL") {
            config.micro_checkpoint_task_interval = u32::try_from(n).ok().filter(|n| *n > 0);
        }
        if let Some(bytes) = read_var_u64("MICRO_CHECKPOINT_CONTEXT_BYTES") {
            config.micro_checkpoint_context_bytes = Some(bytes);
        }
        config
    }
}

fn read_var_u64(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("ignoring invalid {name}={raw}; using the default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = RuntimeConfig::default();
        assert_eq!(config.lock_timeout, Duration::from_millis(30_000));
        assert_eq!(config.activity_max_bytes, 102_400);
        assert_eq!(config.stale_task_threshold, Duration::from_secs(3_600));
        assert!(config.micro_checkpoint_task_interval.is_none());
        assert!(config.micro_checkpoint_context_bytes.is_none());
    }
}

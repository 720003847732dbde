//! Timing configuration for the registry and publisher.

use std::time::Duration;

/// Default reap retention window.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);
/// Default period between reap sweeps.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Default delay between a successful job's terminal event and its removal.
pub const DEFAULT_CLEAR_GRACE: Duration = Duration::from_millis(1000);
/// Default publisher poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Default publisher channel lifetime.
pub const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(5 * 60);

/// Registry retention settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobsConfig {
    pub retention: Duration,
    pub reap_interval: Duration,
    pub clear_grace: Duration,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            retention: DEFAULT_RETENTION,
            reap_interval: DEFAULT_REAP_INTERVAL,
            clear_grace: DEFAULT_CLEAR_GRACE,
        }
    }
}

impl JobsConfig {
    /// Load from `JOB_RETENTION_SECS`, `JOB_REAP_INTERVAL_SECS`, `PROGRESS_CLEAR_GRACE_MS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            retention: env_secs("JOB_RETENTION_SECS").unwrap_or(defaults.retention),
            reap_interval: env_secs("JOB_REAP_INTERVAL_SECS").unwrap_or(defaults.reap_interval),
            clear_grace: env_millis("PROGRESS_CLEAR_GRACE_MS").unwrap_or(defaults.clear_grace),
        }
    }
}

/// Progress publisher settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublisherConfig {
    pub poll_interval: Duration,
    pub max_lifetime: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_lifetime: DEFAULT_MAX_LIFETIME,
        }
    }
}

impl PublisherConfig {
    /// Load from `PROGRESS_POLL_MS`, `PROGRESS_MAX_LIFETIME_SECS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: env_millis("PROGRESS_POLL_MS").unwrap_or(defaults.poll_interval),
            max_lifetime: env_secs("PROGRESS_MAX_LIFETIME_SECS").unwrap_or(defaults.max_lifetime),
        }
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    env_u64(key).map(Duration::from_secs)
}

fn env_millis(key: &str) -> Option<Duration> {
    env_u64(key).map(Duration::from_millis)
}

// Zero would make the interval timers panic.
fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .filter(|v| *v > 0)
}

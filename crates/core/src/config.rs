//! Service configuration with per-field defaults, TOML round-trip.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Recognized tuning options. Every field has a default so a partial
/// TOML file (or none at all) is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxonConfig {
    /// Seconds of inactivity before a channel expires.
    #[serde(default = "default_channel_ttl")]
    pub channel_ttl_secs: u64,
    /// Idle seconds before the HTTP pusher injects a keep-alive.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    /// Overall wall-clock budget for one job.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,
    /// Upper bound on fan-out pool size. 0 means available
    /// parallelism.
    #[serde(default)]
    pub pool_size_cap: usize,
    /// Bounded wait used by every poll loop (tail, monitor,
    /// aggregation).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_channel_ttl() -> u64 {
    60
}

fn default_ping_interval() -> u64 {
    30
}

fn default_job_timeout() -> u64 {
    600
}

fn default_poll_interval() -> u64 {
    1
}

impl Default for AxonConfig {
    fn default() -> Self {
        Self {
            channel_ttl_secs: default_channel_ttl(),
            ping_interval_secs: default_ping_interval(),
            job_timeout_secs: default_job_timeout(),
            pool_size_cap: 0,
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl AxonConfig {
    /// Parse from a TOML string.
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Channel TTL as a [`Duration`].
    pub fn channel_ttl(&self) -> Duration {
        Duration::from_secs(self.channel_ttl_secs)
    }

    /// Ping interval as a [`Duration`].
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Job timeout as a [`Duration`].
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

//! Driver tuning knobs.
//!
//! Every bound here exists so that `Session::next` can never hang: connect,
//! read and reconnect all have a fixed upper limit. The core reads nothing from
//! the environment; [`DriverConfig::from_env`] is an opt-in for tools.

use crate::types::SampleChecks;
use std::time::Duration;

/// Bounded reconnect policy applied when the connection drops mid-stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts before the session fails. Zero disables reconnecting.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl ReconnectPolicy {
    /// Delay before the given attempt (1-based), doubling up to `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Upper bound for establishing one connection.
    pub connect_timeout: Duration,
    /// Socket read timeout; one `receive` never blocks longer than this.
    pub poll_interval: Duration,
    /// Longest `next()` waits without producing a sample.
    pub sample_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    /// Accumulation buffer size that triggers a resync.
    pub max_buffer: usize,
    pub checks: SampleChecks,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
            sample_timeout: Duration::from_secs(2),
            reconnect: ReconnectPolicy::default(),
            max_buffer: 16 * 1024,
            checks: SampleChecks::default(),
        }
    }
}

impl DriverConfig {
    /// Defaults overridden by `XREAL_*` environment variables.
    ///
    /// Unset or unparseable variables keep their default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut checks = defaults.checks;
        if read_env_bool("XREAL_CHECK_GRAVITY", false) {
            checks |= SampleChecks::GRAVITY;
        }

        let config = Self {
            connect_timeout: read_env_millis("XREAL_CONNECT_TIMEOUT_MS", defaults.connect_timeout),
            poll_interval: read_env_millis("XREAL_POLL_INTERVAL_MS", defaults.poll_interval),
            sample_timeout: read_env_millis("XREAL_SAMPLE_TIMEOUT_MS", defaults.sample_timeout),
            reconnect: ReconnectPolicy {
                max_attempts: read_env_u32(
                    "XREAL_RECONNECT_ATTEMPTS",
                    defaults.reconnect.max_attempts,
                ),
                initial_backoff: read_env_millis(
                    "XREAL_RECONNECT_BACKOFF_MS",
                    defaults.reconnect.initial_backoff,
                ),
                max_backoff: defaults.reconnect.max_backoff,
            },
            max_buffer: defaults.max_buffer,
            checks,
        };

        log::debug!("Driver config: {:?}", config);
        config
    }
}

fn read_env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(default)
}

fn read_env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn read_env_millis(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|&ms| ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(default)
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

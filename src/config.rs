use crate::global_variables::{AMQP_URL, COUNT_LOG_FILE, DEFAULT_CYCLE_SECS, SIGNAL_LOG_FILE};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_AMQP_URL: &str = "JUNCTION_AMQP_URL";
pub const ENV_COUNT_LOG: &str = "JUNCTION_COUNT_LOG";
pub const ENV_SIGNAL_LOG: &str = "JUNCTION_SIGNAL_LOG";
pub const ENV_CYCLE_SECS: &str = "JUNCTION_CYCLE_SECS";
pub const ENV_BROADCAST: &str = "JUNCTION_BROADCAST";

/// Runtime settings for the controller binaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub amqp_url: String,
    /// Append-only CSV file receiving every vehicle count.
    pub count_log_path: PathBuf,
    /// CSV file the monitoring listener writes signal updates to.
    pub signal_log_path: PathBuf,
    /// Period of the external cycle driver while the timer is running.
    pub cycle_period: Duration,
    /// Publish every accepted state change to RabbitMQ.
    pub broadcast: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            amqp_url: AMQP_URL.to_string(),
            count_log_path: PathBuf::from(COUNT_LOG_FILE),
            signal_log_path: PathBuf::from(SIGNAL_LOG_FILE),
            cycle_period: Duration::from_secs(DEFAULT_CYCLE_SECS),
            broadcast: false,
        }
    }
}

impl ControllerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, keeping the default for
    /// anything missing or unparsable.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_AMQP_URL) {
            config.amqp_url = url;
        }
        if let Some(path) = lookup(ENV_COUNT_LOG) {
            config.count_log_path = PathBuf::from(path);
        }
        if let Some(path) = lookup(ENV_SIGNAL_LOG) {
            config.signal_log_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(ENV_CYCLE_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.cycle_period = Duration::from_secs(secs),
                _ => log::warn!(
                    "Ignoring {}={:?}, keeping {}s",
                    ENV_CYCLE_SECS,
                    raw,
                    config.cycle_period.as_secs()
                ),
            }
        }
        if let Some(raw) = lookup(ENV_BROADCAST) {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => config.broadcast = true,
                "0" | "false" | "no" | "off" => config.broadcast = false,
                _ => log::warn!("Ignoring {}={:?}", ENV_BROADCAST, raw),
            }
        }

        config
    }
}

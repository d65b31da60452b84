//! Configuration types.

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interval between scheduling ticks.
    pub tick_interval: Duration,
    /// Optional cron expression driving the tick instead of the interval.
    pub tick_cron: Option<String>,
    /// Ceiling for a dispatch with no terminal status; past it the attempt
    /// is forcibly marked `error` and its admission slot released.
    pub dispatch_timeout: Duration,
    /// Maximum leads evaluated concurrently within one tick.
    pub max_parallel_evaluations: usize,
    /// Concurrency budget applied to reengagement dispatches (dialing
    /// rules carry their own `simultaneous_channels`).
    pub reengagement_concurrency: u32,
    /// Configuration warnings kept in memory for the operator API.
    pub warning_buffer_cap: usize,
    /// Port for the read-only operator API.
    pub ops_port: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            tick_cron: None,
            dispatch_timeout: Duration::from_secs(30),
            max_parallel_evaluations: 16,
            reengagement_concurrency: 4,
            warning_buffer_cap: 256,
            ops_port: 8080,
        }
    }
}

impl EngineConfig {
    /// Build a config from `CADENCE_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("CADENCE_TICK_SECS") {
            config.tick_interval = Duration::from_secs(parse_env("CADENCE_TICK_SECS", &raw)?);
        }
        if let Ok(cron) = std::env::var("CADENCE_TICK_CRON") {
            config.tick_cron = Some(cron);
        }
        if let Ok(raw) = std::env::var("CADENCE_DISPATCH_TIMEOUT_SECS") {
            config.dispatch_timeout =
                Duration::from_secs(parse_env("CADENCE_DISPATCH_TIMEOUT_SECS", &raw)?);
        }
        if let Ok(raw) = std::env::var("CADENCE_REENGAGEMENT_CONCURRENCY") {
            config.reengagement_concurrency = parse_env("CADENCE_REENGAGEMENT_CONCURRENCY", &raw)?;
        }
        if let Ok(raw) = std::env::var("CADENCE_OPS_PORT") {
            config.ops_port = parse_env("CADENCE_OPS_PORT", &raw)?;
        }

        Ok(config)
    }
}

fn parse_env<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("cannot parse {raw:?}"),
    })
}

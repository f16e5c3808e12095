//! Registry configuration

use std::time::Duration;

/// Default producer tick period
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(3);

/// Default upper bound on a single delivery attempt
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Registry configuration options
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How often each producer refreshes and broadcasts its run's value
    pub tick_period: Duration,

    /// Upper bound on a single delivery attempt; a send still pending after
    /// this is treated as failed and the subscriber is dropped
    pub send_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            tick_period: DEFAULT_TICK_PERIOD,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

impl RegistryConfig {
    /// Set the producer tick period
    pub fn tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    /// Set the per-subscriber send timeout
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Build a config from the environment, falling back to defaults
    ///
    /// `SIMCAST_TICK_MS` and `SIMCAST_SEND_TIMEOUT_MS` override the
    /// corresponding fields when set to a positive integer.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(period) = env_ms("SIMCAST_TICK_MS") {
            config.tick_period = period;
        }
        if let Some(timeout) = env_ms("SIMCAST_SEND_TIMEOUT_MS") {
            config.send_timeout = timeout;
        }

        config
    }
}

fn env_ms(key: &str) -> Option<Duration> {
    let raw = std::env::var(key).ok()?;

    match raw.parse::<u64>() {
        Ok(ms) if ms > 0 => Some(Duration::from_millis(ms)),
        _ => {
            tracing::warn!(key, value = %raw, "Ignoring invalid duration override");
            None
        }
    }
}

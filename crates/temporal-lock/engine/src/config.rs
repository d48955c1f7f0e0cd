//! Configuration for the temporal lock engine
//!
//! Supplied once at construction and immutable afterwards.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use temporal_lock_types::{LockError, LockResult};

/// Environment variable prefix recognised by [`EngineConfig::from_env`].
pub const ENV_PREFIX: &str = "TEMPORAL_LOCK";

/// Policy bounds and scheduler tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Largest accepted lock duration, in seconds
    #[serde(default = "default_max_duration")]
    pub max_duration_seconds: u64,

    /// Largest accepted event timeout, in seconds
    #[serde(default = "default_max_timeout")]
    pub max_timeout_seconds: u64,

    /// Largest accepted number of event conditions on one lock
    #[serde(default = "default_max_events")]
    pub max_events_per_lock: usize,

    /// Scheduler polling period; bounds expiration-detection latency
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Most scheduler entries dispatched per tick
    #[serde(default = "default_max_ops_per_batch")]
    pub max_ops_per_batch: usize,

    /// Buffered notifications per subscriber before lagging
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_duration_seconds: default_max_duration(),
            max_timeout_seconds: default_max_timeout(),
            max_events_per_lock: default_max_events(),
            tick_interval_ms: default_tick_interval_ms(),
            max_ops_per_batch: default_max_ops_per_batch(),
            notification_capacity: default_notification_capacity(),
        }
    }
}

fn default_max_duration() -> u64 {
    30 * 24 * 60 * 60 // 30 days
}

fn default_max_timeout() -> u64 {
    30 * 24 * 60 * 60
}

fn default_max_events() -> usize {
    10
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_max_ops_per_batch() -> usize {
    100
}

fn default_notification_capacity() -> usize {
    256
}

impl EngineConfig {
    /// Layer `TEMPORAL_LOCK_*` environment variables over the defaults.
    ///
    /// e.g. `TEMPORAL_LOCK_TICK_INTERVAL_MS=250`.
    pub fn from_env() -> LockResult<Self> {
        let defaults = config::Config::try_from(&EngineConfig::default())
            .map_err(|e| LockError::InvalidConfig(e.to_string()))?;

        let config: EngineConfig = config::Config::builder()
            .add_source(defaults)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| LockError::InvalidConfig(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> LockResult<()> {
        if self.tick_interval_ms == 0 {
            return Err(LockError::InvalidConfig(
                "tick_interval_ms must be greater than zero".into(),
            ));
        }
        if self.max_ops_per_batch == 0 {
            return Err(LockError::InvalidConfig(
                "max_ops_per_batch must be greater than zero".into(),
            ));
        }
        if self.notification_capacity == 0 {
            return Err(LockError::InvalidConfig(
                "notification_capacity must be greater than zero".into(),
            ));
        }
        // chrono durations are bounded by i64 milliseconds
        let ceiling = (i64::MAX / 1000) as u64;
        if self.max_duration_seconds > ceiling || self.max_timeout_seconds > ceiling {
            return Err(LockError::InvalidConfig(format!(
                "duration and timeout maxima must not exceed {ceiling} seconds"
            )));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Configuration suited to tests: fast ticks, small bounds.
    pub fn testing() -> Self {
        Self {
            max_duration_seconds: 86_400,
            max_timeout_seconds: 7 * 86_400,
            max_events_per_lock: 5,
            tick_interval_ms: 10,
            max_ops_per_batch: 100,
            notification_capacity: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert!(EngineConfig::testing().validate().is_ok());
    }

    #[test]
    fn zero_tick_interval_is_rejected() {
        let config = EngineConfig {
            tick_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(LockError::InvalidConfig(_))));
    }

    #[test]
    fn zero_batch_is_rejected() {
        let config = EngineConfig {
            max_ops_per_batch: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: EngineConfig =
            serde_json::from_value(serde_json::json!({"max_events_per_lock": 3})).unwrap();
        assert_eq!(config.max_events_per_lock, 3);
        assert_eq!(config.tick_interval_ms, 1000);
    }

    #[test]
    fn from_env_without_overrides_matches_defaults() {
        // Only meaningful when no TEMPORAL_LOCK_* variables are set.
        if std::env::vars().any(|(k, _)| k.starts_with(ENV_PREFIX)) {
            return;
        }
        assert_eq!(EngineConfig::from_env().unwrap(), EngineConfig::default());
    }
}

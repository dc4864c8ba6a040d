//! Tracker configuration.
//!
//! Loaded from a JSON file; every field has a default so an empty object is a
//! valid configuration. Secrets (backend and routing tokens) are never read from
//! here.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logging::LogConfig;
use crate::movement::MovementSimulator;
use crate::routing::RouteFetcherKind;

/// Default vehicle speed: a jeepney in city traffic.
const DEFAULT_SPEED_KMH: f64 = 40.0;

/// Default position report cadence.
const DEFAULT_TICK_MS: u64 = 1000;

const DEFAULT_ROUTE_CACHE_CAPACITY: usize = 256;

/// Whether the passenger source is polled again during a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResyncPolicy {
    /// Use the snapshot taken at session start for the whole session.
    #[default]
    Never,
    /// Poll again each time a new target is about to be chosen.
    BetweenCycles,
}

/// What to do when the routing service fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteRetryConfig {
    /// Consecutive failures tolerated before the session gives up.
    pub max_consecutive_failures: u32,
    /// Pause before the next dispatch attempt after a failure.
    pub delay_ms: u64,
}

impl Default for RouteRetryConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
            delay_ms: 2000,
        }
    }
}

impl RouteRetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Everything a tracking session needs apart from its collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub speed_kmh: f64,
    pub tick_ms: u64,
    pub route: RouteFetcherKind,
    pub route_cache_capacity: usize,
    /// Drive a straight line when the routing service fails.
    pub fallback_to_straight_line: bool,
    pub route_retry: RouteRetryConfig,
    pub resync: ResyncPolicy,
    pub logging: LogConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
            tick_ms: DEFAULT_TICK_MS,
            route: RouteFetcherKind::default(),
            route_cache_capacity: DEFAULT_ROUTE_CACHE_CAPACITY,
            fallback_to_straight_line: true,
            route_retry: RouteRetryConfig::default(),
            resync: ResyncPolicy::default(),
            logging: LogConfig::default(),
        }
    }
}

impl TrackerConfig {
    /// Read and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.simulator()?;
        if self.route_retry.max_consecutive_failures == 0 {
            return Err(ConfigError::Invalid(
                "route_retry.max_consecutive_failures must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The movement simulator described by `speed_kmh` and `tick_ms`.
    pub fn simulator(&self) -> Result<MovementSimulator, ConfigError> {
        MovementSimulator::new(self.speed_kmh, self.tick())
    }

    pub fn with_speed_kmh(mut self, speed_kmh: f64) -> Self {
        self.speed_kmh = speed_kmh;
        self
    }

    pub fn with_tick_ms(mut self, tick_ms: u64) -> Self {
        self.tick_ms = tick_ms;
        self
    }

    pub fn with_resync(mut self, resync: ResyncPolicy) -> Self {
        self.resync = resync;
        self
    }

    pub fn with_route_retry(mut self, max_consecutive_failures: u32, delay_ms: u64) -> Self {
        self.route_retry = RouteRetryConfig {
            max_consecutive_failures,
            delay_ms,
        };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_object_yields_defaults() {
        let config = TrackerConfig::from_json_str("{}").expect("valid config");
        assert_eq!(config, TrackerConfig::default());
        assert_eq!(config.speed_kmh, 40.0);
        assert_eq!(config.tick(), Duration::from_secs(1));
        assert_eq!(config.resync, ResyncPolicy::Never);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config = TrackerConfig::from_json_str(
            r#"{"tick_ms": 50, "resync": "between_cycles", "route_retry": {"delay_ms": 10}}"#,
        )
        .expect("valid config");
        assert_eq!(config.tick_ms, 50);
        assert_eq!(config.resync, ResyncPolicy::BetweenCycles);
        assert_eq!(config.route_retry.delay_ms, 10);
        assert_eq!(config.route_retry.max_consecutive_failures, 3);
        assert_eq!(config.speed_kmh, 40.0);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            TrackerConfig::from_json_str(r#"{"speed_kmh": -5.0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            TrackerConfig::from_json_str(r#"{"tick_ms": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            TrackerConfig::from_json_str(r#"{"route_retry": {"max_consecutive_failures": 0}}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            TrackerConfig::from_json_str("not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"speed_kmh": 25.0, "route": {{"kind": "mapbox", "profile": "driving-traffic"}}}}"#
        )
        .expect("write config");

        let config = TrackerConfig::from_json_file(file.path()).expect("valid config");
        assert_eq!(config.speed_kmh, 25.0);
        assert_eq!(
            config.route,
            RouteFetcherKind::Mapbox {
                endpoint: "https://api.mapbox.com".to_string(),
                profile: "driving-traffic".to_string(),
            }
        );
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = TrackerConfig::from_json_file("/nonexistent/pickup-config.json");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}

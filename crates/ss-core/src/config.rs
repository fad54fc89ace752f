//! Monitor configuration and user settings

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Like count below which an item is skipped, until the user picks one.
pub const DEFAULT_THRESHOLD: u64 = 1000;
/// Consecutive automatic skips before the monitor keeps an item regardless.
pub const MAX_CONSECUTIVE_SKIPS: u32 = 20;
/// Quiet period after the last content change before evaluating.
pub const SETTLE_DELAY_MS: u64 = 800;
pub const POLL_INTERVAL_MS: u64 = 400;
pub const POLL_MAX_WAIT_MS: u64 = 4000;
pub const DISCOVERY_INTERVAL_MS: u64 = 500;
pub const DISCOVERY_MAX_RETRIES: u32 = 10;

/// Feed containers, most specific first.
pub const CONTAINER_SELECTORS: [&str; 4] = [
    "ytd-shorts",
    "ytd-reel-video-renderer",
    "#shorts-container",
    "ytd-shorts-video-player-renderer",
];

/// Longest delay a config may ask for.
pub const MAX_DELAY_MS: u64 = 60 * 60 * 1000;
/// Most poll ticks a single evaluation may take.
pub const MAX_POLL_TICKS: u64 = 10_000;

/// Error type for config validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("{field} = {value}ms exceeds the {max}ms limit")]
    TooLong { field: &'static str, value: u64, max: u64 },
    #[error("Polling every {interval}ms for {max_wait}ms takes more than {max} ticks")]
    TooManyPolls { interval: u64, max_wait: u64, max: u64 },
    #[error("No container selectors configured")]
    NoContainerSelectors,
}

/// Timing and lookup parameters of the feed monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub default_threshold: u64,
    pub max_consecutive_skips: u32,
    pub settle_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub poll_max_wait_ms: u64,
    pub discovery_interval_ms: u64,
    pub discovery_max_retries: u32,
    pub container_selectors: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            default_threshold: DEFAULT_THRESHOLD,
            max_consecutive_skips: MAX_CONSECUTIVE_SKIPS,
            settle_delay_ms: SETTLE_DELAY_MS,
            poll_interval_ms: POLL_INTERVAL_MS,
            poll_max_wait_ms: POLL_MAX_WAIT_MS,
            discovery_interval_ms: DISCOVERY_INTERVAL_MS,
            discovery_max_retries: DISCOVERY_MAX_RETRIES,
            container_selectors: CONTAINER_SELECTORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl MonitorConfig {
    /// Check that every wait is bounded and every poll loop makes progress.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Zero { field: "poll_interval_ms" });
        }
        if self.discovery_interval_ms == 0 && self.discovery_max_retries > 0 {
            return Err(ConfigError::Zero { field: "discovery_interval_ms" });
        }

        let delays = [
            ("settle_delay_ms", self.settle_delay_ms),
            ("poll_interval_ms", self.poll_interval_ms),
            ("poll_max_wait_ms", self.poll_max_wait_ms),
            ("discovery_interval_ms", self.discovery_interval_ms),
        ];
        for (field, value) in delays {
            if value > MAX_DELAY_MS {
                return Err(ConfigError::TooLong { field, value, max: MAX_DELAY_MS });
            }
        }

        if self.poll_max_wait_ms / self.poll_interval_ms > MAX_POLL_TICKS {
            return Err(ConfigError::TooManyPolls {
                interval: self.poll_interval_ms,
                max_wait: self.poll_max_wait_ms,
                max: MAX_POLL_TICKS,
            });
        }
        if self.container_selectors.is_empty() {
            return Err(ConfigError::NoContainerSelectors);
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_max_wait(&self) -> Duration {
        Duration::from_millis(self.poll_max_wait_ms)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }
}

/// User settings, as persisted by the options page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub threshold: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl Settings {
    /// Convert a stored threshold (a JS number) to a count.
    ///
    /// The options page only stores non-negative integers; anything else is
    /// rejected so the current threshold stays in place.
    pub fn threshold_from_stored(raw: f64) -> Option<u64> {
        if raw.is_finite() && raw >= 0.0 {
            Some(raw.round() as u64)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.default_threshold, 1000);
        assert_eq!(config.max_consecutive_skips, 20);
        assert_eq!(config.settle_delay(), Duration::from_millis(800));
        assert_eq!(config.poll_interval(), Duration::from_millis(400));
        assert_eq!(config.poll_max_wait(), Duration::from_millis(4000));
        assert_eq!(config.discovery_interval(), Duration::from_millis(500));
        assert_eq!(config.container_selectors[0], "ytd-shorts");
        assert_eq!(Settings::default().threshold, 1000);
    }

    #[test]
    fn test_partial_config_json() {
        let config: MonitorConfig = serde_json::from_str(r#"{"settle_delay_ms": 100}"#).unwrap();
        assert_eq!(config.settle_delay_ms, 100);
        assert_eq!(config.poll_interval_ms, POLL_INTERVAL_MS);
        assert_eq!(config.container_selectors.len(), 4);

        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.threshold, DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_validate() {
        assert_eq!(MonitorConfig::default().validate(), Ok(()));

        let zero_poll = MonitorConfig { poll_interval_ms: 0, ..MonitorConfig::default() };
        assert_eq!(zero_poll.validate(), Err(ConfigError::Zero { field: "poll_interval_ms" }));

        let zero_discovery = MonitorConfig { discovery_interval_ms: 0, ..MonitorConfig::default() };
        assert!(zero_discovery.validate().is_err());
        let no_retries = MonitorConfig {
            discovery_interval_ms: 0,
            discovery_max_retries: 0,
            ..MonitorConfig::default()
        };
        assert_eq!(no_retries.validate(), Ok(()));

        let long_wait = MonitorConfig { poll_max_wait_ms: u64::MAX, ..MonitorConfig::default() };
        assert!(matches!(long_wait.validate(), Err(ConfigError::TooLong { field: "poll_max_wait_ms", .. })));

        let tiny_interval = MonitorConfig {
            poll_interval_ms: 1,
            poll_max_wait_ms: MAX_DELAY_MS,
            ..MonitorConfig::default()
        };
        assert!(matches!(tiny_interval.validate(), Err(ConfigError::TooManyPolls { .. })));

        let no_selectors = MonitorConfig { container_selectors: Vec::new(), ..MonitorConfig::default() };
        assert_eq!(no_selectors.validate(), Err(ConfigError::NoContainerSelectors));
    }

    #[test]
    fn test_threshold_from_stored() {
        assert_eq!(Settings::threshold_from_stored(500.0), Some(500));
        assert_eq!(Settings::threshold_from_stored(0.0), Some(0));
        assert_eq!(Settings::threshold_from_stored(-1.0), None);
        assert_eq!(Settings::threshold_from_stored(f64::NAN), None);
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::ValidatedUrl;
use crate::gesture::GestureStrategy;
use crate::model::Coordinate;

pub const DEFAULT_API_BASE_URL: &str = "https://sudmaps.pabiosoft.com/api";
pub const DEFAULT_LONG_PRESS_THRESHOLD_MS: u64 = 2_000;
pub const DEFAULT_LONG_PRESS_EPSILON_MS: u64 = 100;
pub const DEFAULT_PRESS_TIMER_MS: u64 = 500;
pub const DEFAULT_CENTER: (f64, f64) = (48.856614, 2.3522219);
pub const DEFAULT_ZOOM: f64 = 13.0;
pub const USER_LOCATION_ZOOM: f64 = 15.0;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("malformed config: {0}")]
    Parse(String),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// Joins `path` onto the base URL, adding the separating slash when missing.
    pub fn endpoint(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    pub strategy: GestureStrategy,
    /// Minimum hold before a map click counts as a long-press.
    pub long_press_threshold_ms: u64,
    /// Slack added to the threshold when arming the check timer.
    pub long_press_epsilon_ms: u64,
    /// Press-in timer used where the map widget reports press-in/press-out.
    pub press_timer_ms: u64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            strategy: GestureStrategy::default(),
            long_press_threshold_ms: DEFAULT_LONG_PRESS_THRESHOLD_MS,
            long_press_epsilon_ms: DEFAULT_LONG_PRESS_EPSILON_MS,
            press_timer_ms: DEFAULT_PRESS_TIMER_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub default_center: Coordinate,
    pub default_zoom: f64,
    pub user_location_zoom: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            default_center: Coordinate::new_unchecked(DEFAULT_CENTER.0, DEFAULT_CENTER.1),
            default_zoom: DEFAULT_ZOOM,
            user_location_zoom: USER_LOCATION_ZOOM,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub gestures: GestureConfig,
    pub map: MapConfig,
}

impl AppConfig {
    /// Parses a JSON document; absent fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ValidatedUrl::new(self.api.base_url.clone()).map_err(|e| ConfigError::Invalid {
            field: "api.base_url",
            reason: e.to_string(),
        })?;

        if self.gestures.long_press_threshold_ms == 0 || self.gestures.press_timer_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "gestures",
                reason: "timers must be greater than zero".into(),
            });
        }

        for (field, zoom) in [
            ("map.default_zoom", self.map.default_zoom),
            ("map.user_location_zoom", self.map.user_location_zoom),
        ] {
            if !(0.0..=22.0).contains(&zoom) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("zoom {zoom} outside 0..=22"),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_deployment() {
        let config = AppConfig::default();
        assert_eq!(config.api.base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.gestures.long_press_threshold_ms, 2_000);
        assert_eq!(config.gestures.press_timer_ms, 500);
        assert_eq!(config.gestures.strategy, GestureStrategy::PressTimer);
        assert_eq!(config.map.default_zoom, 13.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_endpoint_joins_slashes() {
        let api = ApiConfig::new("https://api.example.com/api/");
        assert_eq!(api.endpoint("/locations"), "https://api.example.com/api/locations");
        assert_eq!(api.endpoint("locations"), "https://api.example.com/api/locations");
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = AppConfig::from_json(
            r#"{"api": {"base_url": "https://api.example.com/api"}, "gestures": {"press_timer_ms": 650, "strategy": "ClickTiming"}}"#,
        )
        .unwrap();
        assert_eq!(config.api.base_url, "https://api.example.com/api");
        assert_eq!(config.gestures.strategy, GestureStrategy::ClickTiming);
        assert_eq!(config.gestures.press_timer_ms, 650);
        assert_eq!(config.gestures.long_press_threshold_ms, 2_000);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            AppConfig::from_json(r#"{"api": {"base_url": "ftp://x.org"}}"#),
            Err(ConfigError::Invalid { field: "api.base_url", .. })
        ));
        assert!(matches!(
            AppConfig::from_json(r#"{"gestures": {"press_timer_ms": 0}}"#),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            AppConfig::from_json("not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_map_center_from_json() {
        let config = AppConfig::from_json(
            r#"{"map": {"default_center": {"latitude": -17.9, "longitude": 25.8}}}"#,
        )
        .unwrap();
        assert_eq!(config.map.default_center.latitude(), -17.9);
        assert_eq!(config.map.default_zoom, DEFAULT_ZOOM);
    }
}

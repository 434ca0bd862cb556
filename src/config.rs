// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Application configuration management.
//!
//! This module handles persistent configuration storage using TOML format:
//! the dashboard location, clock style, weather overlay timing and the
//! optional OpenWeatherMap API key.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use weather_overlay::{OverlayConfig, MAX_ZOOM};

/// Environment variable that takes precedence over the configured API key
pub const API_KEY_ENV: &str = "OPENWEATHERMAP_API_KEY";

const APP_NAME: &str = "globe-dashboard";
const CONFIG_NAME: &str = "config";

/// Clock display style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum TimeFormat {
    #[default]
    #[serde(rename = "12h")]
    #[value(name = "12h")]
    TwelveHour,
    #[serde(rename = "24h")]
    #[value(name = "24h")]
    TwentyFourHour,
}

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    /// Configuration schema version for migrations
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    /// Location used for current conditions (e.g. "Indianapolis, Indiana")
    #[serde(default = "default_location")]
    pub location: String,

    /// OpenWeatherMap API key (optional, env var takes precedence)
    #[serde(default)]
    pub openweathermap_api_key: Option<String>,

    /// Tile zoom level for the globe overlays (keep low, 2-3)
    #[serde(default = "default_zoom")]
    pub zoom: u8,

    /// Seconds between overlay refreshes
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Overlay crossfade duration in milliseconds
    #[serde(default = "default_fade_duration_ms")]
    pub fade_duration_ms: u64,

    /// Seconds between current-conditions lookups
    #[serde(default = "default_conditions_refresh_secs")]
    pub conditions_refresh_secs: u64,

    /// Clock style
    #[serde(default)]
    pub time_format: TimeFormat,

    /// Show cloud coverage overlay
    #[serde(default = "default_true")]
    pub show_clouds: bool,

    /// Show precipitation overlay
    #[serde(default = "default_true")]
    pub show_precipitation: bool,

    /// Globe panel size in points
    #[serde(default = "default_globe_size")]
    pub globe_size: f32,
}

// Default value functions for serde
fn default_config_version() -> u32 {
    1
}

fn default_location() -> String {
    "Indianapolis, Indiana".to_string()
}

fn default_zoom() -> u8 {
    2
}

fn default_refresh_interval_secs() -> u64 {
    60
}

fn default_fade_duration_ms() -> u64 {
    900
}

fn default_conditions_refresh_secs() -> u64 {
    900
}

fn default_true() -> bool {
    true
}

fn default_globe_size() -> f32 {
    720.0
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            location: default_location(),
            openweathermap_api_key: None,
            zoom: default_zoom(),
            refresh_interval_secs: default_refresh_interval_secs(),
            fade_duration_ms: default_fade_duration_ms(),
            conditions_refresh_secs: default_conditions_refresh_secs(),
            time_format: TimeFormat::default(),
            show_clouds: true,
            show_precipitation: true,
            globe_size: default_globe_size(),
        }
    }
}

impl AppConfig {
    /// Load configuration from disk
    pub fn load() -> Result<Self, confy::ConfyError> {
        confy::load(APP_NAME, CONFIG_NAME)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), confy::ConfyError> {
        confy::store(APP_NAME, CONFIG_NAME, self)
    }

    /// Get the config file path for display to user
    pub fn get_config_path() -> Result<std::path::PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
    }

    /// Resolve API key from environment variable or config
    #[must_use]
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_api_key(
            std::env::var(API_KEY_ENV).ok(),
            self.openweathermap_api_key.as_deref(),
        )
    }

    /// Overlay settings derived from this configuration.
    ///
    /// The zoom level is clamped to what a full-world atlas supports.
    #[must_use]
    pub fn overlay_config(&self) -> OverlayConfig {
        OverlayConfig {
            zoom: self.zoom.min(MAX_ZOOM),
            refresh_interval: Duration::from_secs(self.refresh_interval_secs.max(1)),
            fade_duration: Duration::from_millis(self.fade_duration_ms),
            ..OverlayConfig::default()
        }
    }

    /// Interval between current-conditions lookups.
    #[must_use]
    pub fn conditions_refresh(&self) -> Duration {
        Duration::from_secs(self.conditions_refresh_secs.max(60))
    }
}

/// Pick the environment key first, then the configured one; empty keys count as missing.
fn resolve_api_key(env_key: Option<String>, config_key: Option<&str>) -> Option<String> {
    env_key
        .filter(|k| !k.trim().is_empty())
        .or_else(|| config_key.map(str::to_string).filter(|k| !k.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.zoom, 2);
        assert_eq!(config.time_format, TimeFormat::TwelveHour);

        let overlay = config.overlay_config();
        assert_eq!(overlay.refresh_interval, Duration::from_secs(60));
        assert_eq!(overlay.fade_duration, Duration::from_millis(900));
        assert_eq!((overlay.texture_width, overlay.texture_height), (2048, 1024));
    }

    #[test]
    fn test_zoom_clamped() {
        let config = AppConfig {
            zoom: 12,
            ..AppConfig::default()
        };
        assert_eq!(config.overlay_config().zoom, MAX_ZOOM);
    }

    #[test]
    fn test_api_key_precedence() {
        assert_eq!(
            resolve_api_key(Some("env".to_string()), Some("file")),
            Some("env".to_string())
        );
        assert_eq!(
            resolve_api_key(Some(String::new()), Some("file")),
            Some("file".to_string())
        );
        assert_eq!(resolve_api_key(None, Some("  ")), None);
        assert_eq!(resolve_api_key(None, None), None);
    }

    #[test]
    fn test_conditions_refresh_floor() {
        let config = AppConfig {
            conditions_refresh_secs: 5,
            refresh_interval_secs: 0,
            ..AppConfig::default()
        };
        assert_eq!(config.conditions_refresh(), Duration::from_secs(60));
        assert_eq!(config.overlay_config().refresh_interval, Duration::from_secs(1));
    }
}

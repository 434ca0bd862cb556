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

//! Current weather conditions for a named location.
//!
//! Lookups never raise: every failure becomes a [`ConditionsError`] whose
//! display text is meant to be shown in place of the data.

use std::time::Duration;

use log::{debug, warn};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default OpenWeatherMap current-weather endpoint.
pub const DEFAULT_WEATHER_HOST: &str = "https://api.openweathermap.org/data/2.5/weather";

/// Current conditions in imperial units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    /// Temperature in °F, rounded.
    pub temperature: i32,
    /// Short condition text, e.g. "Clouds" or "Rain".
    pub condition: String,
    /// Wind speed in mph, rounded.
    pub wind_speed: i32,
    /// Relative humidity in percent.
    pub humidity: u32,
    /// "City, Country".
    pub location: String,
}

/// Failure of a current-conditions lookup, displayable to the user.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConditionsError {
    #[error("OpenWeatherMap API key not configured")]
    MissingApiKey,

    #[error("Location \"{0}\" not found")]
    LocationNotFound(String),

    #[error("Weather API error: {0}")]
    Status(String),

    #[error("Failed to fetch weather: {0}")]
    Request(String),
}

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    main: MainReadings,
    #[serde(default)]
    weather: Vec<WeatherDescription>,
    #[serde(default)]
    wind: Option<WindReadings>,
    name: String,
    #[serde(default)]
    sys: Option<SystemInfo>,
}

#[derive(Debug, Deserialize)]
struct MainReadings {
    temp: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct WeatherDescription {
    main: String,
}

#[derive(Debug, Deserialize)]
struct WindReadings {
    #[serde(default)]
    speed: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SystemInfo {
    #[serde(default)]
    country: Option<String>,
}

/// Parse an OpenWeatherMap current-weather JSON body.
pub fn parse_conditions(body: &str) -> Result<CurrentConditions, ConditionsError> {
    let response: WeatherResponse =
        serde_json::from_str(body).map_err(|e| ConditionsError::Request(e.to_string()))?;

    let condition = response
        .weather
        .first()
        .map(|w| w.main.clone())
        .ok_or_else(|| ConditionsError::Request("response has no weather condition".to_string()))?;

    let wind_speed = response.wind.and_then(|w| w.speed).unwrap_or(0.0);
    let location = match response.sys.and_then(|s| s.country) {
        Some(country) => format!("{}, {}", response.name, country),
        None => response.name,
    };

    Ok(CurrentConditions {
        temperature: response.main.temp.round() as i32,
        condition,
        wind_speed: wind_speed.round() as i32,
        humidity: response.main.humidity.round().max(0.0) as u32,
        location,
    })
}

/// Map a non-success HTTP status to the error shown for `location`.
#[must_use]
pub fn status_error(status: StatusCode, location: &str) -> ConditionsError {
    if status == StatusCode::NOT_FOUND {
        ConditionsError::LocationNotFound(location.to_string())
    } else {
        ConditionsError::Status(status.to_string())
    }
}

/// Client for the current-weather endpoint.
#[derive(Clone)]
pub struct ConditionsClient {
    client: reqwest::Client,
    host: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for ConditionsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionsClient")
            .field("host", &self.host)
            .field("has_api_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

impl ConditionsClient {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

    /// Create a client; a missing key is reported on every lookup.
    #[must_use]
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_host(api_key, DEFAULT_WEATHER_HOST.to_string())
    }

    #[must_use]
    pub fn with_host(api_key: Option<String>, host: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build weather HTTP client, using defaults: {}", e);
                reqwest::Client::new()
            });

        Self {
            client,
            host,
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Request URL for `location` (location and key are query-encoded).
    pub fn request_url(&self, location: &str) -> Result<Url, ConditionsError> {
        let api_key = self.api_key.as_deref().ok_or(ConditionsError::MissingApiKey)?;
        Url::parse_with_params(
            &self.host,
            &[("q", location), ("appid", api_key), ("units", "imperial")],
        )
        .map_err(|e| ConditionsError::Request(e.to_string()))
    }

    /// Fetch current conditions for `location`.
    pub async fn fetch(&self, location: &str) -> Result<CurrentConditions, ConditionsError> {
        let url = self.request_url(location)?;
        debug!("Fetching current conditions for {}", location);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ConditionsError::Request(e.without_url().to_string()))?;

        if !response.status().is_success() {
            return Err(status_error(response.status(), location));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ConditionsError::Request(e.without_url().to_string()))?;

        parse_conditions(&body)
    }
}

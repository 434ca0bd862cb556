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

//! Clock, date and current-conditions strip along the top of the window.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use egui::{Color32, RichText};
use log::{debug, info, warn};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use weather_overlay::{ConditionsClient, ConditionsError, CurrentConditions};

use crate::config::{AppConfig, TimeFormat};

/// Latest result of the conditions poller
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionsState {
    Loading,
    Ready(CurrentConditions),
    Failed(ConditionsError),
}

type SharedConditions = Arc<Mutex<ConditionsState>>;

/// Clock text and date text for `now`.
#[must_use]
pub fn format_clock(now: NaiveDateTime, format: TimeFormat) -> (String, String) {
    let time = match format {
        TimeFormat::TwelveHour => now.format("%I:%M %p"),
        TimeFormat::TwentyFourHour => now.format("%H:%M"),
    };
    (time.to_string(), now.format("%A, %B %-d").to_string())
}

/// Headline and detail lines for the conditions area.
#[must_use]
pub fn conditions_text(state: &ConditionsState) -> (String, Option<String>) {
    match state {
        ConditionsState::Loading => ("Loading weather...".to_string(), None),
        ConditionsState::Ready(c) => (
            format!("{}°F  {}", c.temperature, c.condition),
            Some(format!("{} mph  {}%  {}", c.wind_speed, c.humidity, c.location)),
        ),
        ConditionsState::Failed(err) => (err.to_string(), None),
    }
}

async fn poll_conditions(
    client: ConditionsClient,
    location: String,
    interval: Duration,
    state: SharedConditions,
    cancel_token: CancellationToken,
) {
    info!("Polling current conditions for {} every {:?}", location, interval);

    loop {
        let result = tokio::select! {
            result = client.fetch(&location) => result,
            () = cancel_token.cancelled() => break,
        };

        let missing_key = matches!(result, Err(ConditionsError::MissingApiKey));
        let next = match result {
            Ok(conditions) => {
                debug!("Conditions for {}: {:?}", location, conditions);
                ConditionsState::Ready(conditions)
            }
            Err(e) => {
                warn!("Conditions lookup failed: {}", e);
                ConditionsState::Failed(e)
            }
        };
        *state.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = next;

        // A key only appears on restart.
        if missing_key {
            break;
        }

        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            () = cancel_token.cancelled() => break,
        }
    }

    debug!("Conditions poller for {} stopped", location);
}

pub struct TopBar {
    time_format: TimeFormat,
    conditions: SharedConditions,
    cancel_token: CancellationToken,
}

impl std::fmt::Debug for TopBar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopBar")
            .field("time_format", &self.time_format)
            .finish_non_exhaustive()
    }
}

impl TopBar {
    /// Start polling conditions for the configured location.
    #[must_use]
    pub fn new(runtime: &Runtime, config: &AppConfig) -> Self {
        let conditions = Arc::new(Mutex::new(ConditionsState::Loading));
        let cancel_token = CancellationToken::new();

        runtime.spawn(poll_conditions(
            ConditionsClient::new(config.resolve_api_key()),
            config.location.clone(),
            config.conditions_refresh(),
            Arc::clone(&conditions),
            cancel_token.clone(),
        ));

        Self {
            time_format: config.time_format,
            conditions,
            cancel_token,
        }
    }

    #[must_use]
    pub fn conditions(&self) -> ConditionsState {
        self.conditions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Stop the conditions poller.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    pub fn show(&self, ui: &mut egui::Ui) {
        let (time, date) = format_clock(Local::now().naive_local(), self.time_format);
        let state = self.conditions();
        let (headline, detail) = conditions_text(&state);
        let headline_color = match state {
            ConditionsState::Failed(_) => Color32::from_rgb(220, 50, 50),
            _ => Color32::WHITE,
        };

        ui.horizontal(|ui| {
            ui.vertical(|ui| {
                ui.label(RichText::new(time).size(28.0).strong().color(Color32::WHITE));
                ui.label(RichText::new(date).color(Color32::GRAY));
            });
            ui.add_space(40.0);
            ui.vertical(|ui| {
                ui.label(RichText::new(headline).size(20.0).color(headline_color));
                if let Some(detail) = detail {
                    ui.label(RichText::new(detail).color(Color32::GRAY));
                }
            });
        });
    }
}

impl Drop for TopBar {
    fn drop(&mut self) {
        self.shutdown();
    }
}

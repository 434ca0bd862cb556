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

//! Rotating globe panel with the weather overlay shells.
//!
//! Mounting spawns one [`LayerRefresher`] per enabled layer on the app's
//! tokio runtime; every frame the shared overlays are rasterised into a
//! single egui texture.

mod render;

use std::sync::Arc;
use std::time::Instant;

use egui::{TextureHandle, TextureOptions};
use log::{info, warn};
use tokio::runtime::Runtime;
use weather_overlay::{
    lock_overlay, shared_overlay, HttpTileFetcher, LayerRefresher, OpenWeatherMapSource,
    RefreshState, SharedOverlay, WeatherLayer,
};

use crate::config::{AppConfig, API_KEY_ENV};
use render::{render_globe, to_color_image, Camera, SphereLayer};

/// Side length of the rasterised globe in pixels.
const RENDER_SIZE: u32 = 400;

/// Layers enabled by `config`, innermost first.
#[must_use]
pub fn enabled_layers(config: &AppConfig) -> Vec<WeatherLayer> {
    WeatherLayer::ALL
        .into_iter()
        .filter(|layer| match layer {
            WeatherLayer::Clouds => config.show_clouds,
            WeatherLayer::Precipitation => config.show_precipitation,
        })
        .collect()
}

pub struct GlobeView {
    camera: Camera,
    overlays: Vec<SharedOverlay>,
    refreshers: Vec<LayerRefresher>,
    texture: Option<TextureHandle>,
    last_frame: Option<Instant>,
    status: Option<String>,
    size: f32,
}

impl std::fmt::Debug for GlobeView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobeView")
            .field("camera", &self.camera)
            .field("layers", &self.refreshers.len())
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl GlobeView {
    /// Create the view and start refreshing every enabled layer.
    ///
    /// Without an API key the globe still spins but shows no weather.
    #[must_use]
    pub fn mount(runtime: &Runtime, config: &AppConfig) -> Self {
        let mut view = Self {
            camera: Camera::default(),
            overlays: Vec::new(),
            refreshers: Vec::new(),
            texture: None,
            last_frame: None,
            status: None,
            size: config.globe_size,
        };

        let layers = enabled_layers(config);
        if layers.is_empty() {
            info!("All weather overlays disabled");
            return view;
        }

        let Some(api_key) = config.resolve_api_key() else {
            warn!("No OpenWeatherMap API key; weather overlays disabled");
            view.status = Some(format!("Set {API_KEY_ENV} to show weather overlays"));
            return view;
        };

        let overlay_config = config.overlay_config();
        let _guard = runtime.enter();
        for layer in layers {
            let overlay = shared_overlay(layer, &overlay_config);
            let fetcher = HttpTileFetcher::new(OpenWeatherMapSource::new(layer, api_key.clone()));
            info!("Mounting {} overlay at zoom {}", layer, overlay_config.zoom);
            view.refreshers.push(LayerRefresher::spawn(
                Arc::clone(&overlay),
                fetcher,
                overlay_config.clone(),
            ));
            view.overlays.push(overlay);
        }
        view
    }

    /// Whether any layer is fetching right now.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.refreshers
            .iter()
            .any(|r| r.state() == RefreshState::Refreshing)
    }

    /// Stop every refresher and release its overlay. Safe to call twice.
    pub fn unmount(&mut self) {
        for refresher in self.refreshers.drain(..) {
            info!("Unmounting {} overlay", refresher.layer());
            refresher.shutdown();
        }
        self.overlays.clear();
    }

    /// Render one frame of the spinning globe.
    fn render_frame(&mut self) -> egui::ColorImage {
        let now = Instant::now();
        if let Some(last) = self.last_frame {
            self.camera.advance(now.duration_since(last));
        }
        self.last_frame = Some(now);

        let guards: Vec<_> = self.overlays.iter().map(lock_overlay).collect();
        let layers: Vec<SphereLayer<'_>> = guards
            .iter()
            .filter(|overlay| overlay.is_alive())
            .map(|overlay| SphereLayer::from_overlay(overlay))
            .collect();
        to_color_image(&render_globe(RENDER_SIZE, self.camera, &layers))
    }

    pub fn show(&mut self, ui: &mut egui::Ui) {
        let frame = self.render_frame();
        let texture = match &mut self.texture {
            Some(texture) => {
                texture.set(frame, TextureOptions::LINEAR);
                texture.clone()
            }
            None => {
                let texture = ui.ctx().load_texture("globe", frame, TextureOptions::LINEAR);
                self.texture = Some(texture.clone());
                texture
            }
        };

        let available = ui.available_size();
        let side = self.size.min(available.x).min(available.y - 40.0).max(64.0);

        ui.vertical_centered(|ui| {
            ui.add(egui::Image::from_texture(egui::load::SizedTexture::new(
                texture.id(),
                egui::vec2(side, side),
            )));

            if let Some(status) = &self.status {
                ui.label(egui::RichText::new(status).color(egui::Color32::from_rgb(255, 200, 100)));
            } else if !self.refreshers.is_empty() {
                let mut caption = OpenWeatherMapSource::attribution().to_string();
                if self.is_refreshing() {
                    caption.push_str("  (updating)");
                }
                ui.label(egui::RichText::new(caption).small().color(egui::Color32::GRAY));
            }
        });
    }
}

impl Drop for GlobeView {
    fn drop(&mut self) {
        self.unmount();
    }
}

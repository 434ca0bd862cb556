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

//! Global weather overlays for sphere-mapped globes.
//!
//! This library turns OpenWeatherMap raster tiles into textures that can be
//! wrapped directly around a globe. It is organised in layers that can be
//! used independently or composed together:
//!
//! - **Tile layer**: weather layers, slippy-map tile coordinates and URLs
//! - **Fetch layer**: concurrent per-tile downloads joined into explicit outcomes
//! - **Atlas layer**: exact grid placement of tiles into one Web-Mercator image
//! - **Reprojection**: Web-Mercator atlas to equirectangular texture
//! - **Overlay layer**: double-buffered textures with a timed opacity crossfade
//! - **Refresh layer**: per-layer background loop with explicit shutdown
//! - **Conditions**: current-conditions lookups for a named location
//!
//! # Quick Start
//!
//! Use [`LayerRefresher`] for full-stack operation:
//!
//! ```no_run
//! use weather_overlay::{
//!     shared_overlay, HttpTileFetcher, LayerRefresher, OpenWeatherMapSource, OverlayConfig,
//!     WeatherLayer,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let config = OverlayConfig::default();
//!     let overlay = shared_overlay(WeatherLayer::Clouds, &config);
//!     let source = OpenWeatherMapSource::new(WeatherLayer::Clouds, "api-key".to_string());
//!
//!     let refresher = LayerRefresher::spawn(overlay.clone(), HttpTileFetcher::new(source), config);
//!
//!     // ... render `overlay` every frame ...
//!
//!     refresher.shutdown();
//! }
//! ```
//!
//! # Using Individual Layers
//!
//! ```
//! use image::{Rgba, RgbaImage};
//! use weather_overlay::reproject::reproject;
//!
//! let atlas = RgbaImage::from_pixel(512, 512, Rgba([255, 255, 255, 128]));
//! let texture = reproject(&atlas, 1024, 512).unwrap();
//! assert_eq!(texture.dimensions(), (1024, 512));
//! ```

pub mod atlas;
pub mod conditions;
pub mod fetch;
pub mod overlay;
pub mod reproject;
pub mod refresh;
pub mod tile;

use std::time::Duration;

pub use atlas::TileAtlas;
pub use conditions::{ConditionsClient, ConditionsError, CurrentConditions};
pub use fetch::{fetch_world_tiles, HttpTileFetcher, TileError, TileFetcher, TileOutcome};
pub use overlay::{
    lock_overlay, run_crossfade, shared_overlay, CrossFade, Material, Overlay, OverlayError,
    OverlayStyle, SharedOverlay, Surface,
};
pub use refresh::{refresh_overlay, CycleReport, LayerRefresher, RefreshState, RefreshStats};
pub use tile::{world_tiles, OpenWeatherMapSource, TileCoord, WeatherLayer, MAX_ZOOM, TILE_SIZE};

/// Configuration shared by every overlay refresh cycle.
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Zoom level of the world tile grid (2^zoom tiles per side).
    pub zoom: u8,
    /// Side length of one tile in pixels.
    pub tile_size: u32,
    /// Width of the equirectangular texture.
    pub texture_width: u32,
    /// Height of the equirectangular texture.
    pub texture_height: u32,
    /// Delay between the end of one refresh and the start of the next.
    pub refresh_interval: Duration,
    /// Duration of the opacity crossfade after a refresh.
    pub fade_duration: Duration,
    /// Sampling period of the crossfade (one display refresh).
    pub frame_interval: Duration,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            zoom: 2,
            tile_size: TILE_SIZE,
            texture_width: 2048,
            texture_height: 1024,
            refresh_interval: Duration::from_secs(60),
            fade_duration: Duration::from_millis(900),
            frame_interval: Duration::from_millis(16),
        }
    }
}

impl OverlayConfig {
    /// Side length of the stitched atlas in pixels.
    #[must_use]
    pub fn atlas_size(&self) -> u32 {
        (1u32 << self.zoom) * self.tile_size
    }
}

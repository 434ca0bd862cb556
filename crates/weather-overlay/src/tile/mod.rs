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

//! Weather layers, tile coordinates and the OpenWeatherMap tile source.

use reqwest::Url;

use crate::fetch::TileError;
use crate::overlay::OverlayStyle;

/// Default tile side length in pixels.
pub const TILE_SIZE: u32 = 256;

/// Highest zoom level accepted for a full-world atlas (8192px per side).
pub const MAX_ZOOM: u8 = 5;

/// Default OpenWeatherMap tile endpoint.
pub const DEFAULT_TILE_HOST: &str = "https://tile.openweathermap.org/map";

/// Available weather layer types from OpenWeatherMap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeatherLayer {
    Clouds,
    Precipitation,
}

impl WeatherLayer {
    /// Every layer, in back-to-front drawing order.
    pub const ALL: [WeatherLayer; 2] = [WeatherLayer::Clouds, WeatherLayer::Precipitation];

    /// Get the OpenWeatherMap layer name for URL construction
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherLayer::Clouds => "clouds_new",
            WeatherLayer::Precipitation => "precipitation_new",
        }
    }

    /// Get human-readable display name
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            WeatherLayer::Clouds => "Clouds",
            WeatherLayer::Precipitation => "Precipitation",
        }
    }

    /// Sphere placement and resting opacity for this layer.
    ///
    /// Precipitation sits just above clouds so rain stays visible through
    /// cloud cover.
    #[must_use]
    pub fn style(&self) -> OverlayStyle {
        match self {
            WeatherLayer::Clouds => OverlayStyle {
                radius_offset: 0.55,
                opacity: 0.55,
            },
            WeatherLayer::Precipitation => OverlayStyle {
                radius_offset: 0.65,
                opacity: 0.7,
            },
        }
    }
}

impl std::fmt::Display for WeatherLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// One square raster tile in the slippy-map scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    #[must_use]
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Whether x and y lie inside the grid for this zoom.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if self.zoom > MAX_ZOOM {
            return false;
        }
        let n = tiles_per_side(self.zoom);
        self.x < n && self.y < n
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Number of tiles along one side of the world grid.
///
/// # Panics
///
/// Panics if `zoom` exceeds [`MAX_ZOOM`].
#[must_use]
pub fn tiles_per_side(zoom: u8) -> u32 {
    assert!(zoom <= MAX_ZOOM, "zoom level {zoom} exceeds the supported maximum of {MAX_ZOOM}");
    1u32 << zoom
}

/// Every tile coordinate covering the whole world at `zoom`, column-major.
///
/// # Panics
///
/// Panics if `zoom` exceeds [`MAX_ZOOM`].
#[must_use]
pub fn world_tiles(zoom: u8) -> Vec<TileCoord> {
    let n = tiles_per_side(zoom);
    (0..n)
        .flat_map(|x| (0..n).map(move |y| TileCoord::new(zoom, x, y)))
        .collect()
}

/// Tile source for one OpenWeatherMap weather layer
#[derive(Clone)]
pub struct OpenWeatherMapSource {
    layer: WeatherLayer,
    api_key: String,
    host: String,
}

// The API key stays out of debug output and logs.
impl std::fmt::Debug for OpenWeatherMapSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenWeatherMapSource")
            .field("layer", &self.layer)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl OpenWeatherMapSource {
    /// Create a new OpenWeatherMap tile source for the specified layer
    #[must_use]
    pub fn new(layer: WeatherLayer, api_key: String) -> Self {
        Self::with_host(layer, api_key, DEFAULT_TILE_HOST.to_string())
    }

    /// Create a tile source against a custom tile host.
    #[must_use]
    pub fn with_host(layer: WeatherLayer, api_key: String, host: String) -> Self {
        Self {
            layer,
            api_key,
            host: host.trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn layer(&self) -> WeatherLayer {
        self.layer
    }

    /// `{host}/{layer}/{z}/{x}/{y}.png?appid={key}` with the key query-encoded.
    pub fn tile_url(&self, coord: TileCoord) -> Result<Url, TileError> {
        let base = format!(
            "{}/{}/{}/{}/{}.png",
            self.host,
            self.layer.as_str(),
            coord.zoom,
            coord.x,
            coord.y
        );
        Url::parse_with_params(&base, &[("appid", self.api_key.as_str())])
            .map_err(|e| TileError::InvalidUrl(e.to_string()))
    }

    /// Attribution text required by OpenWeatherMap.
    #[must_use]
    pub fn attribution() -> &'static str {
        "Weather data © OpenWeatherMap"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_world_tiles_cover_grid() {
        for zoom in 0..=4u8 {
            let tiles = world_tiles(zoom);
            let n = 1u32 << zoom;

            assert_eq!(tiles.len(), 4usize.pow(u32::from(zoom)));
            assert!(tiles.iter().all(|t| t.zoom == zoom && t.x < n && t.y < n));

            let unique: HashSet<_> = tiles.iter().collect();
            assert_eq!(unique.len(), tiles.len());
        }
    }

    #[test]
    fn test_tile_url() {
        let source = OpenWeatherMapSource::new(WeatherLayer::Clouds, "abc123".to_string());
        let url = source.tile_url(TileCoord::new(2, 3, 1)).unwrap();
        assert_eq!(
            url.as_str(),
            "https://tile.openweathermap.org/map/clouds_new/2/3/1.png?appid=abc123"
        );
    }

    #[test]
    fn test_tile_url_encodes_key_and_trims_host() {
        let source = OpenWeatherMapSource::with_host(
            WeatherLayer::Precipitation,
            "a b&c".to_string(),
            "http://localhost:8080/tiles/".to_string(),
        );
        let url = source.tile_url(TileCoord::new(0, 0, 0)).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/tiles/precipitation_new/0/0/0.png?appid=a+b%26c"
        );
    }

    #[test]
    fn test_debug_hides_api_key() {
        let source = OpenWeatherMapSource::new(WeatherLayer::Clouds, "secret-key".to_string());
        assert!(!format!("{source:?}").contains("secret-key"));
    }

    #[test]
    fn test_max_zoom_grid() {
        assert_eq!(tiles_per_side(MAX_ZOOM), 32);
        assert_eq!(world_tiles(MAX_ZOOM).len(), 1024);
    }

    #[test]
    #[should_panic(expected = "exceeds the supported maximum")]
    fn test_zoom_beyond_max_rejected() {
        let _ = tiles_per_side(40);
    }

    #[test]
    fn test_coord_validity() {
        assert!(TileCoord::new(2, 3, 3).is_valid());
        assert!(!TileCoord::new(2, 4, 0).is_valid());
        assert!(!TileCoord::new(0, 0, 1).is_valid());
        assert!(!TileCoord::new(MAX_ZOOM + 1, 0, 0).is_valid());
    }

    #[test]
    fn test_precipitation_sits_above_clouds() {
        assert!(
            WeatherLayer::Precipitation.style().radius_offset
                > WeatherLayer::Clouds.style().radius_offset
        );
    }
}

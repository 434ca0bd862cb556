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

//! Software rasteriser for the orthographic globe.
//!
//! Every output pixel is cast onto the base sphere and each overlay shell,
//! converted to latitude/longitude and looked up in the equirectangular
//! textures. Shells are composited inner to outer.

use std::f64::consts::{FRAC_PI_2, PI, TAU};
use std::time::Duration;

use image::{Rgba, RgbaImage};
use weather_overlay::Overlay;

/// Radius of the base globe; overlay shells sit at `GLOBE_RADIUS + radius_offset`.
pub const GLOBE_RADIUS: f32 = 100.0;

/// Longitude advanced per 60 Hz frame.
pub const SPIN_PER_FRAME: f64 = 0.0007;

const REFERENCE_FRAME: Duration = Duration::from_micros(16_667);
const VIEW_MARGIN: f32 = 1.05;
const GRATICULE_STEP_DEG: f64 = 30.0;
const GRATICULE_WIDTH_DEG: f64 = 0.6;

const SPACE: [u8; 3] = [6, 8, 14];
const OCEAN: [f32; 3] = [18.0, 52.0, 96.0];
const GRATICULE: [f32; 3] = [70.0, 110.0, 160.0];
const HALO: [f32; 3] = [90.0, 150.0, 255.0];

/// Point on the globe facing the viewer, in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub lat: f64,
    pub lon: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            lat: 20f64.to_radians(),
            lon: (-30f64).to_radians(),
        }
    }
}

impl Camera {
    /// Spin the globe eastward by `elapsed` worth of frames.
    pub fn advance(&mut self, elapsed: Duration) {
        let frames = elapsed.as_secs_f64() / REFERENCE_FRAME.as_secs_f64();
        self.lon = wrap_longitude(self.lon - SPIN_PER_FRAME * frames);
    }

    /// Geographic (lat, lon) of a unit view-space vector, z toward the viewer.
    ///
    /// Applies `R_y(lon) · R_x(-lat)` so the view centre maps to the camera point.
    #[must_use]
    pub fn view_to_geo(&self, x: f64, y: f64, z: f64) -> (f64, f64) {
        let (sin_lat, cos_lat) = self.lat.sin_cos();
        let y1 = y * cos_lat + z * sin_lat;
        let z1 = -y * sin_lat + z * cos_lat;

        let (sin_lon, cos_lon) = self.lon.sin_cos();
        let x2 = x * cos_lon + z1 * sin_lon;
        let z2 = -x * sin_lon + z1 * cos_lon;

        (y1.clamp(-1.0, 1.0).asin(), x2.atan2(z2))
    }
}

fn wrap_longitude(lon: f64) -> f64 {
    (lon + PI).rem_euclid(TAU) - PI
}

/// One overlay shell: its radius and the slots to composite, back first.
#[derive(Debug)]
pub struct SphereLayer<'a> {
    pub radius: f32,
    pub slots: Vec<(&'a RgbaImage, f32)>,
}

impl<'a> SphereLayer<'a> {
    /// Both slots of `overlay`, inactive under active.
    #[must_use]
    pub fn from_overlay(overlay: &'a Overlay) -> Self {
        let radius = GLOBE_RADIUS + overlay.style().radius_offset;
        let slots = [overlay.inactive(), overlay.active()]
            .into_iter()
            .filter(|s| s.material().opacity > 0.0 && s.texture().width() > 0)
            .map(|s| (s.texture(), s.material().opacity))
            .collect();
        Self { radius, slots }
    }
}

/// Nearest texel of an equirectangular texture at (lat, lon).
#[must_use]
pub fn sample_equirect(texture: &RgbaImage, lat: f64, lon: f64) -> Rgba<u8> {
    if texture.width() == 0 || texture.height() == 0 {
        return Rgba([0, 0, 0, 0]);
    }
    let u = (lon + PI) / TAU;
    let v = (FRAC_PI_2 - lat) / PI;
    let x = (u * f64::from(texture.width() - 1)).round().clamp(0.0, f64::from(texture.width() - 1));
    let y = (v * f64::from(texture.height() - 1)).round().clamp(0.0, f64::from(texture.height() - 1));
    *texture.get_pixel(x as u32, y as u32)
}

/// Rasterise the globe and its overlay shells into a `size`×`size` image.
#[must_use]
pub fn render_globe(size: u32, camera: Camera, layers: &[SphereLayer<'_>]) -> RgbaImage {
    let mut shells: Vec<&SphereLayer<'_>> = layers.iter().filter(|l| !l.slots.is_empty()).collect();
    shells.sort_by(|a, b| a.radius.total_cmp(&b.radius));

    let outer = layers
        .iter()
        .map(|l| l.radius)
        .fold(GLOBE_RADIUS, f32::max);
    let extent = f64::from(outer * VIEW_MARGIN);
    let half = f64::from(size) / 2.0;
    let light = normalize([-0.4, 0.5, 0.77]);

    let mut image = RgbaImage::new(size, size);
    for (px, py, pixel) in image.enumerate_pixels_mut() {
        let x = (f64::from(px) + 0.5 - half) / half * extent;
        let y = (half - f64::from(py) - 0.5) / half * extent;
        let d2 = x * x + y * y;

        let mut color = [f32::from(SPACE[0]), f32::from(SPACE[1]), f32::from(SPACE[2])];
        let r = f64::from(GLOBE_RADIUS);

        if d2 <= r * r {
            let normal = [x / r, y / r, (1.0 - d2 / (r * r)).max(0.0).sqrt()];
            let (lat, lon) = camera.view_to_geo(normal[0], normal[1], normal[2]);
            let lambert = dot(normal, light).max(0.0);
            let shade = (0.35 + 0.65 * lambert) as f32;
            let base = if on_graticule(lat, lon) { GRATICULE } else { OCEAN };
            color = base.map(|c| c * shade);
        } else {
            let d = d2.sqrt();
            let glow = (1.0 - (d - r) / (r * 0.04)).clamp(0.0, 1.0) as f32;
            color = blend(color, HALO, glow * 0.6);
        }

        for shell in &shells {
            let rs = f64::from(shell.radius);
            if d2 > rs * rs {
                continue;
            }
            let z = (1.0 - d2 / (rs * rs)).max(0.0).sqrt();
            let (lat, lon) = camera.view_to_geo(x / rs, y / rs, z);
            for (texture, opacity) in &shell.slots {
                let texel = sample_equirect(texture, lat, lon);
                let alpha = f32::from(texel[3]) / 255.0 * opacity.clamp(0.0, 1.0);
                let rgb = [f32::from(texel[0]), f32::from(texel[1]), f32::from(texel[2])];
                color = blend(color, rgb, alpha);
            }
        }

        *pixel = Rgba([color[0] as u8, color[1] as u8, color[2] as u8, 255]);
    }
    image
}

/// Convert a rendered frame for upload to egui.
#[must_use]
pub fn to_color_image(image: &RgbaImage) -> egui::ColorImage {
    egui::ColorImage::from_rgba_unmultiplied(
        [image.width() as usize, image.height() as usize],
        image.as_raw(),
    )
}

fn on_graticule(lat: f64, lon: f64) -> bool {
    let near = |deg: f64| {
        let offset = deg.rem_euclid(GRATICULE_STEP_DEG);
        offset < GRATICULE_WIDTH_DEG || GRATICULE_STEP_DEG - offset < GRATICULE_WIDTH_DEG
    };
    near(lat.to_degrees()) || near(lon.to_degrees())
}

fn blend(under: [f32; 3], over: [f32; 3], alpha: f32) -> [f32; 3] {
    let a = alpha.clamp(0.0, 1.0);
    [
        under[0] * (1.0 - a) + over[0] * a,
        under[1] * (1.0 - a) + over[1] * a,
        under[2] * (1.0 - a) + over[2] * a,
    ]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn normalize(v: [f64; 3]) -> [f64; 3] {
    let len = dot(v, v).sqrt();
    [v[0] / len, v[1] / len, v[2] / len]
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn solid(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(color))
    }

    #[test]
    fn test_view_centre_maps_to_camera() {
        let camera = Camera::default();
        let (lat, lon) = camera.view_to_geo(0.0, 0.0, 1.0);
        assert!((lat - camera.lat).abs() < EPS);
        assert!((lon - camera.lon).abs() < EPS);
    }

    #[test]
    fn test_view_top_is_north() {
        let camera = Camera { lat: 0.0, lon: 0.5 };
        let (lat, _) = camera.view_to_geo(0.0, 1.0, 0.0);
        assert!((lat - FRAC_PI_2).abs() < EPS);

        // Right of centre is east of the camera longitude.
        let (_, east) = camera.view_to_geo(0.5, 0.0, 0.75f64.sqrt());
        assert!(east > 0.5);
    }

    #[test]
    fn test_camera_spin_wraps() {
        let mut camera = Camera { lat: 0.0, lon: -PI + 0.0001 };
        camera.advance(REFERENCE_FRAME);
        assert!(camera.lon > 3.0, "wrapped to {}", camera.lon);

        let mut camera = Camera { lat: 0.0, lon: 0.0 };
        camera.advance(REFERENCE_FRAME * 10);
        assert!((camera.lon + SPIN_PER_FRAME * 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_sample_equirect_corners() {
        let mut texture = solid(4, 2, [0, 0, 0, 255]);
        texture.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        texture.put_pixel(3, 1, Rgba([0, 0, 255, 255]));

        assert_eq!(sample_equirect(&texture, FRAC_PI_2, -PI)[0], 255);
        assert_eq!(sample_equirect(&texture, -FRAC_PI_2, PI)[2], 255);
    }

    #[test]
    fn test_render_base_globe() {
        let image = render_globe(64, Camera::default(), &[]);
        assert_eq!(image.dimensions(), (64, 64));

        let corner = image.get_pixel(0, 0);
        assert_eq!([corner[0], corner[1], corner[2]], SPACE);

        let centre = image.get_pixel(32, 32);
        assert!(centre[2] > centre[0], "ocean should be blue: {centre:?}");
    }

    #[test]
    fn test_opaque_overlay_covers_centre() {
        let red = solid(8, 4, [255, 0, 0, 255]);
        let layers = [SphereLayer {
            radius: 100.5,
            slots: vec![(&red, 1.0)],
        }];
        let image = render_globe(64, Camera::default(), &layers);
        assert_eq!(image.get_pixel(32, 32).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_overlay_opacity_weights_texels() {
        let red = solid(8, 4, [255, 0, 0, 255]);
        let bare = render_globe(32, Camera::default(), &[]);
        let faint = render_globe(
            32,
            Camera::default(),
            &[SphereLayer {
                radius: 100.5,
                slots: vec![(&red, 0.5)],
            }],
        );

        let under = bare.get_pixel(16, 16);
        let over = faint.get_pixel(16, 16);
        let expected = (f32::from(under[0]) * 0.5 + 127.5) as u8;
        assert!(over[0].abs_diff(expected) <= 1, "{} vs {}", over[0], expected);
    }

    #[test]
    fn test_overlay_samples_camera_longitude() {
        // West half red, east half blue.
        let mut texture = solid(8, 4, [0, 0, 255, 255]);
        for y in 0..4 {
            for x in 0..4 {
                texture.put_pixel(x, y, Rgba([255, 0, 0, 255]));
            }
        }
        let layers = [SphereLayer {
            radius: 100.5,
            slots: vec![(&texture, 1.0)],
        }];

        let west = Camera { lat: 0.0, lon: (-90f64).to_radians() };
        assert_eq!(render_globe(32, west, &layers).get_pixel(16, 16)[0], 255);

        let east = Camera { lat: 0.0, lon: 90f64.to_radians() };
        assert_eq!(render_globe(32, east, &layers).get_pixel(16, 16)[2], 255);
    }

    #[test]
    fn test_color_image_matches_frame() {
        let image = render_globe(16, Camera::default(), &[]);
        let color = to_color_image(&image);
        assert_eq!(color.size, [16, 16]);
        assert_eq!(color.pixels.len(), 256);
    }
}

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

//! Double-buffered weather overlay state.
//!
//! An [`Overlay`] owns two texture/material slots layered on the same
//! sphere. At rest the active slot is visible and the other is fully
//! transparent. A refresh writes the inactive texture, cross-fades the
//! two materials and flips the active index.
//!
//! Every mutating method checks the overlay's liveness flag first, so
//! nothing touches the overlay once it has been torn down.

mod crossfade;

pub use crossfade::{run_crossfade, CrossFade};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use image::RgbaImage;
use thiserror::Error;

use crate::tile::WeatherLayer;
use crate::OverlayConfig;

/// Errors raised by overlay refresh cycles.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OverlayError {
    #[error("overlay has been torn down")]
    TornDown,

    #[error("invalid raster dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("zoom level {0} exceeds the supported maximum of {}", crate::tile::MAX_ZOOM)]
    UnsupportedZoom(u8),
}

/// Sphere placement and resting opacity of one overlay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    /// Distance above the globe surface (globe radius is 100).
    pub radius_offset: f32,
    /// Opacity of the active material at rest.
    pub opacity: f32,
}

/// Surface material of one overlay slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub opacity: f32,
}

/// One half of the double buffer.
#[derive(Debug, Clone)]
pub struct Surface {
    texture: RgbaImage,
    material: Material,
}

impl Surface {
    #[must_use]
    pub fn texture(&self) -> &RgbaImage {
        &self.texture
    }

    #[must_use]
    pub fn material(&self) -> Material {
        self.material
    }
}

/// Overlay shared between the refresh loop and the renderer.
pub type SharedOverlay = Arc<Mutex<Overlay>>;

/// Create a shared overlay sized for `config`.
#[must_use]
pub fn shared_overlay(layer: WeatherLayer, config: &OverlayConfig) -> SharedOverlay {
    Arc::new(Mutex::new(Overlay::new(
        layer,
        layer.style(),
        config.texture_width,
        config.texture_height,
    )))
}

/// Lock a shared overlay, recovering the state from a poisoned mutex.
pub fn lock_overlay(overlay: &SharedOverlay) -> MutexGuard<'_, Overlay> {
    overlay.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Double-buffered equirectangular overlay for one weather layer.
#[derive(Debug)]
pub struct Overlay {
    layer: WeatherLayer,
    style: OverlayStyle,
    slots: [Surface; 2],
    active: usize,
    alive: bool,
    revision: u64,
    updated_at: Option<DateTime<Utc>>,
}

impl Overlay {
    /// Create an overlay with two transparent textures; slot 0 starts active.
    #[must_use]
    pub fn new(layer: WeatherLayer, style: OverlayStyle, width: u32, height: u32) -> Self {
        let slot = |opacity| Surface {
            texture: RgbaImage::new(width, height),
            material: Material { opacity },
        };

        Self {
            layer,
            style,
            slots: [slot(style.opacity), slot(0.0)],
            active: 0,
            alive: true,
            revision: 0,
            updated_at: None,
        }
    }

    #[must_use]
    pub fn layer(&self) -> WeatherLayer {
        self.layer
    }

    #[must_use]
    pub fn style(&self) -> OverlayStyle {
        self.style
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Index of the slot currently shown at rest.
    #[must_use]
    pub fn active_index(&self) -> usize {
        self.active
    }

    #[must_use]
    pub fn inactive_index(&self) -> usize {
        1 - self.active
    }

    #[must_use]
    pub fn slots(&self) -> &[Surface; 2] {
        &self.slots
    }

    #[must_use]
    pub fn active(&self) -> &Surface {
        &self.slots[self.active]
    }

    #[must_use]
    pub fn inactive(&self) -> &Surface {
        &self.slots[self.inactive_index()]
    }

    /// Count of mutations applied since creation.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// When a refreshed texture was last swapped in.
    #[must_use]
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Texture dimensions shared by both slots.
    #[must_use]
    pub fn texture_size(&self) -> (u32, u32) {
        self.slots[0].texture.dimensions()
    }

    /// Fail with [`OverlayError::TornDown`] once the overlay is released.
    pub fn ensure_alive(&self) -> Result<(), OverlayError> {
        if self.alive {
            Ok(())
        } else {
            Err(OverlayError::TornDown)
        }
    }

    /// Replace the inactive slot's texture.
    ///
    /// Returns the previous texture so callers can reuse its allocation.
    pub fn replace_inactive_texture(&mut self, texture: RgbaImage) -> Result<RgbaImage, OverlayError> {
        self.ensure_alive()?;

        if texture.dimensions() != self.texture_size() {
            let (width, height) = texture.dimensions();
            return Err(OverlayError::InvalidDimensions { width, height });
        }

        let slot = self.inactive_index();
        self.revision += 1;
        Ok(std::mem::replace(&mut self.slots[slot].texture, texture))
    }

    /// Current opacities as `(active, inactive)`.
    #[must_use]
    pub fn opacities(&self) -> (f32, f32) {
        (
            self.active().material.opacity,
            self.inactive().material.opacity,
        )
    }

    /// Set the opacities of the active and inactive materials.
    pub fn set_opacities(&mut self, active: f32, inactive: f32) -> Result<(), OverlayError> {
        self.ensure_alive()?;

        let inactive_slot = self.inactive_index();
        self.slots[self.active].material.opacity = active.clamp(0.0, 1.0);
        self.slots[inactive_slot].material.opacity = inactive.clamp(0.0, 1.0);
        self.revision += 1;
        Ok(())
    }

    /// Flip which slot is active.
    pub fn swap_active(&mut self) -> Result<(), OverlayError> {
        self.ensure_alive()?;

        self.active = self.inactive_index();
        self.updated_at = Some(Utc::now());
        self.revision += 1;
        Ok(())
    }

    /// Release both textures and refuse every later mutation.
    ///
    /// Idempotent. Teardown itself does not bump the revision.
    pub fn teardown(&mut self) {
        if !self.alive {
            return;
        }
        self.alive = false;
        for slot in &mut self.slots {
            slot.texture = RgbaImage::new(0, 0);
            slot.material.opacity = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn overlay() -> Overlay {
        Overlay::new(WeatherLayer::Clouds, WeatherLayer::Clouds.style(), 8, 4)
    }

    #[test]
    fn test_new_overlay_has_one_visible_slot() {
        let overlay = overlay();
        assert_eq!(overlay.active_index(), 0);
        assert_eq!(overlay.opacities(), (0.55, 0.0));
        assert_eq!(overlay.texture_size(), (8, 4));
        assert!(overlay.is_alive());
    }

    #[test]
    fn test_replace_writes_inactive_slot_only() {
        let mut overlay = overlay();
        let texture = RgbaImage::from_pixel(8, 4, Rgba([1, 2, 3, 4]));

        overlay.replace_inactive_texture(texture.clone()).unwrap();

        assert_eq!(overlay.inactive().texture(), &texture);
        assert_eq!(overlay.active().texture(), &RgbaImage::new(8, 4));
        assert_eq!(overlay.revision(), 1);
    }

    #[test]
    fn test_replace_rejects_wrong_size() {
        let mut overlay = overlay();
        let result = overlay.replace_inactive_texture(RgbaImage::new(4, 4));
        assert_eq!(
            result.unwrap_err(),
            OverlayError::InvalidDimensions { width: 4, height: 4 }
        );
        assert_eq!(overlay.revision(), 0);
    }

    #[test]
    fn test_swap_flips_index() {
        let mut overlay = overlay();
        overlay.set_opacities(0.0, 0.55).unwrap();
        overlay.swap_active().unwrap();

        assert_eq!(overlay.active_index(), 1);
        assert_eq!(overlay.opacities(), (0.55, 0.0));
        assert!(overlay.updated_at().is_some());
    }

    #[test]
    fn test_torn_down_overlay_refuses_mutation() {
        let mut overlay = overlay();
        overlay.teardown();
        let revision = overlay.revision();

        assert_eq!(overlay.set_opacities(1.0, 0.0), Err(OverlayError::TornDown));
        assert_eq!(overlay.swap_active(), Err(OverlayError::TornDown));
        assert!(overlay.replace_inactive_texture(RgbaImage::new(0, 0)).is_err());
        assert_eq!(overlay.revision(), revision);
        assert_eq!(overlay.texture_size(), (0, 0));

        overlay.teardown();
        assert!(!overlay.is_alive());
    }
}

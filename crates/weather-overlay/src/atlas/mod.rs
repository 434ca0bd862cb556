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

//! Stitching of world tiles into a single Web-Mercator atlas.

use image::{imageops, RgbaImage};
use log::debug;

use crate::fetch::TileOutcome;
use crate::tile::{tiles_per_side, TileCoord};

/// Full-world raster built from every tile of one zoom level.
///
/// The pixel buffer is read-only once stitched.
#[derive(Debug)]
pub struct TileAtlas {
    zoom: u8,
    tile_size: u32,
    image: RgbaImage,
    placed: usize,
    missing: usize,
}

impl TileAtlas {
    /// Place every loaded tile at `(x * tile_size, y * tile_size)`.
    ///
    /// Failed tiles are skipped and leave their cell fully transparent.
    /// Tiles larger than `tile_size` are clipped to their cell; outcomes for
    /// another zoom or outside the grid are ignored.
    ///
    /// # Panics
    ///
    /// Panics if `zoom` exceeds [`MAX_ZOOM`](crate::tile::MAX_ZOOM).
    #[must_use]
    pub fn stitch<I>(zoom: u8, tile_size: u32, outcomes: I) -> Self
    where
        I: IntoIterator<Item = (TileCoord, TileOutcome)>,
    {
        let side = tiles_per_side(zoom).saturating_mul(tile_size);
        let mut image = RgbaImage::new(side, side);
        let mut placed = 0;
        let mut missing = 0;

        for (coord, outcome) in outcomes {
            if coord.zoom != zoom || !coord.is_valid() {
                debug!("Ignoring tile {} outside the zoom {} grid", coord, zoom);
                continue;
            }

            match outcome {
                TileOutcome::Loaded(tile) => {
                    let tile = if tile.width() > tile_size || tile.height() > tile_size {
                        imageops::crop_imm(&tile, 0, 0, tile_size, tile_size).to_image()
                    } else {
                        tile
                    };
                    imageops::replace(
                        &mut image,
                        &tile,
                        i64::from(coord.x * tile_size),
                        i64::from(coord.y * tile_size),
                    );
                    placed += 1;
                }
                TileOutcome::Failed(_) => missing += 1,
            }
        }

        Self {
            zoom,
            tile_size,
            image,
            placed,
            missing,
        }
    }

    #[must_use]
    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    #[must_use]
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Stitched pixels.
    #[must_use]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Number of tiles drawn into the atlas.
    #[must_use]
    pub fn placed_tiles(&self) -> usize {
        self.placed
    }

    /// Number of tiles whose fetch failed.
    #[must_use]
    pub fn missing_tiles(&self) -> usize {
        self.missing
    }
}

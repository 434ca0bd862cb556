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

//! Web-Mercator to equirectangular reprojection.
//!
//! The source is a square Mercator atlas covering longitudes [-180°, 180°]
//! and the full Mercator latitude range. The destination rows are linear in
//! latitude, so every destination row maps to one source row through the
//! inverse Mercator relation. Longitude is linear in both projections and
//! needs no warp. Sampling is nearest-neighbour.

use std::f64::consts::PI;

use image::RgbaImage;

use crate::overlay::OverlayError;

/// Normalised Mercator y (0 at the top edge, 1 at the bottom) for a latitude in degrees.
///
/// The poles fall outside [0, 1] (±∞ at exactly ±90°).
#[must_use]
pub fn mercator_y(latitude_deg: f64) -> f64 {
    let lat_rad = latitude_deg.to_radians();
    (1.0 - (PI / 4.0 + lat_rad / 2.0).tan().ln() / PI) / 2.0
}

/// Latitude in degrees of destination row `j` in a texture `dst_height` rows tall.
///
/// A texture shorter than two rows has a single row at the north pole.
#[must_use]
pub fn row_latitude(j: u32, dst_height: u32) -> f64 {
    let v = f64::from(j) / f64::from(dst_height.saturating_sub(1).max(1));
    90.0 - v * 180.0
}

/// Source atlas row sampled by destination row `j`.
#[must_use]
pub fn source_row(j: u32, dst_height: u32, src_height: u32) -> u32 {
    let merc_y = mercator_y(row_latitude(j, dst_height));
    nearest_index(merc_y, src_height)
}

/// Source atlas column sampled by destination column `i`.
#[must_use]
pub fn source_column(i: u32, dst_width: u32, src_width: u32) -> u32 {
    let u = f64::from(i) / f64::from(dst_width - 1);
    nearest_index(u, src_width)
}

/// Round `fraction * (len - 1)` and clamp to `[0, len - 1]`.
///
/// The clamp happens before the integer conversion so infinite fractions
/// at the poles land on the edge rows.
fn nearest_index(fraction: f64, len: u32) -> u32 {
    let max = f64::from(len.saturating_sub(1));
    let index = (fraction * max).round();
    if index.is_nan() {
        return 0;
    }
    index.clamp(0.0, max) as u32
}

/// Reproject a Mercator atlas into an existing equirectangular texture.
///
/// Every destination pixel is written; the source is only read.
pub fn reproject_into(src: &RgbaImage, dst: &mut RgbaImage) -> Result<(), OverlayError> {
    let (sw, sh) = src.dimensions();
    let (dw, dh) = dst.dimensions();

    if sw == 0 || sh == 0 {
        return Err(OverlayError::InvalidDimensions {
            width: sw,
            height: sh,
        });
    }
    if dw < 2 || dh < 2 {
        return Err(OverlayError::InvalidDimensions {
            width: dw,
            height: dh,
        });
    }

    let columns: Vec<u32> = (0..dw).map(|i| source_column(i, dw, sw)).collect();

    for j in 0..dh {
        let sy = source_row(j, dh, sh);
        for (i, &sx) in columns.iter().enumerate() {
            dst.put_pixel(i as u32, j, *src.get_pixel(sx, sy));
        }
    }

    Ok(())
}

/// Reproject a Mercator atlas into a new `dst_width` × `dst_height` texture.
pub fn reproject(src: &RgbaImage, dst_width: u32, dst_height: u32) -> Result<RgbaImage, OverlayError> {
    let mut dst = RgbaImage::new(dst_width, dst_height);
    reproject_into(src, &mut dst)?;
    Ok(dst)
}

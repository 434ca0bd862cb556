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

//! Timed linear opacity crossfade between the two overlay slots.

use std::time::Duration;

use tokio::time::{interval, Instant, MissedTickBehavior};

use super::{lock_overlay, OverlayError, SharedOverlay};

/// Linear interpolation from `(start_a, start_b)` to `(0, start_a)`.
///
/// The incoming material rises to the outgoing material's starting opacity,
/// not to 1, so an interrupted earlier fade does not brighten the layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossFade {
    start_a: f32,
    start_b: f32,
}

impl CrossFade {
    #[must_use]
    pub fn new(start_a: f32, start_b: f32) -> Self {
        Self {
            start_a: start_a.max(0.0),
            start_b: start_b.max(0.0),
        }
    }

    /// Opacity the incoming material ends at.
    #[must_use]
    pub fn target(&self) -> f32 {
        self.start_a
    }

    /// Opacities `(outgoing, incoming)` at fraction `k` (clamped to [0, 1]).
    #[must_use]
    pub fn sample(&self, k: f32) -> (f32, f32) {
        let k = k.clamp(0.0, 1.0);
        if k >= 1.0 {
            return (0.0, self.start_a);
        }
        (
            self.start_a * (1.0 - k),
            self.start_b + (self.start_a - self.start_b) * k,
        )
    }

    /// Fraction of `duration` covered by `elapsed`, saturating at 1.
    #[must_use]
    pub fn fraction(elapsed: Duration, duration: Duration) -> f32 {
        if duration.is_zero() {
            return 1.0;
        }
        (elapsed.as_secs_f32() / duration.as_secs_f32()).min(1.0)
    }
}

/// Fade the active material out and the inactive one in, then flip slots.
///
/// Opacities are recomputed from wall-clock time once per `frame_interval`
/// tick and resolve when the fraction reaches 1. Fails with
/// [`OverlayError::TornDown`] if the overlay is released mid-fade.
pub async fn run_crossfade(
    overlay: &SharedOverlay,
    duration: Duration,
    frame_interval: Duration,
) -> Result<(), OverlayError> {
    let fade = {
        let overlay = lock_overlay(overlay);
        overlay.ensure_alive()?;
        let (active, inactive) = overlay.opacities();
        CrossFade::new(active, inactive)
    };

    let started = Instant::now();
    let mut frames = interval(frame_interval.max(Duration::from_millis(1)));
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        frames.tick().await;

        let k = CrossFade::fraction(started.elapsed(), duration);
        let (outgoing, incoming) = fade.sample(k);

        let mut overlay = lock_overlay(overlay);
        overlay.set_opacities(outgoing, incoming)?;

        if k >= 1.0 {
            return overlay.swap_active();
        }
    }
}

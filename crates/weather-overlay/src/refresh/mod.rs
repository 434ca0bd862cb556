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

//! Per-layer overlay refresh loop.
//!
//! Each weather layer runs one loop in a background task: refresh
//! immediately, then once per refresh interval until shut down. A refresh
//! is fetch → stitch → reproject → crossfade. Failed cycles are logged and
//! skipped; the next one is always scheduled.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use image::RgbaImage;
use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::atlas::TileAtlas;
use crate::fetch::{fetch_world_tiles, TileFetcher};
use crate::overlay::{lock_overlay, run_crossfade, OverlayError, SharedOverlay};
use crate::reproject::reproject_into;
use crate::tile::{WeatherLayer, MAX_ZOOM};
use crate::OverlayConfig;

/// Refresh loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// Waiting for the next scheduled refresh.
    Idle,
    /// Fetching, reprojecting or cross-fading.
    Refreshing,
    /// Shut down; no further refreshes will run.
    Stopped,
}

/// Summary of one completed refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Tiles requested from the fetcher.
    pub requested: usize,
    /// Tiles drawn into the atlas.
    pub placed: usize,
    /// Tiles that failed and were left blank.
    pub failed: usize,
}

/// Running statistics for a refresh loop.
#[derive(Debug, Clone, Default)]
pub struct RefreshStats {
    pub cycles_completed: u64,
    pub cycles_skipped: u64,
    pub last_report: Option<CycleReport>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Run one full refresh cycle for `overlay`.
///
/// Fetches every world tile, stitches and reprojects them into the
/// overlay's inactive texture, then cross-fades it in. Returns
/// [`OverlayError::TornDown`] without touching the overlay if it was torn
/// down while tiles were in flight.
pub async fn refresh_overlay<F: TileFetcher>(
    overlay: &SharedOverlay,
    fetcher: &Arc<F>,
    config: &OverlayConfig,
) -> Result<CycleReport, OverlayError> {
    if config.zoom > MAX_ZOOM {
        return Err(OverlayError::UnsupportedZoom(config.zoom));
    }
    let (width, height) = {
        let overlay = lock_overlay(overlay);
        overlay.ensure_alive()?;
        overlay.texture_size()
    };

    let outcomes = fetch_world_tiles(fetcher, config.zoom).await;
    let requested = 1usize << (2 * u32::from(config.zoom));

    lock_overlay(overlay).ensure_alive()?;

    let atlas = TileAtlas::stitch(config.zoom, config.tile_size, outcomes);
    let mut texture = RgbaImage::new(width, height);
    reproject_into(atlas.image(), &mut texture)?;

    let report = CycleReport {
        requested,
        placed: atlas.placed_tiles(),
        failed: requested - atlas.placed_tiles(),
    };
    drop(atlas);

    lock_overlay(overlay).replace_inactive_texture(texture)?;
    run_crossfade(overlay, config.fade_duration, config.frame_interval).await?;

    Ok(report)
}

/// Handle to a running refresh loop for one layer.
///
/// The loop runs in a background task and refreshes its overlay on a fixed
/// interval. Use [`LayerRefresher::shutdown`] (or drop the handle) to stop
/// it and release the overlay.
pub struct LayerRefresher {
    layer: WeatherLayer,
    overlay: SharedOverlay,
    state_rx: watch::Receiver<RefreshState>,
    stats: Arc<Mutex<RefreshStats>>,
    cancel_token: CancellationToken,
}

impl std::fmt::Debug for LayerRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerRefresher")
            .field("layer", &self.layer)
            .field("state", &*self.state_rx.borrow())
            .finish_non_exhaustive()
    }
}

impl LayerRefresher {
    /// Spawn a refresh loop for `overlay` on the current tokio runtime.
    ///
    /// The first refresh starts immediately.
    #[must_use]
    pub fn spawn<F: TileFetcher>(overlay: SharedOverlay, fetcher: F, config: OverlayConfig) -> Self {
        let layer = lock_overlay(&overlay).layer();
        let (state_tx, state_rx) = watch::channel(RefreshState::Idle);
        let stats = Arc::new(Mutex::new(RefreshStats::default()));
        let cancel_token = CancellationToken::new();

        tokio::spawn(refresh_loop(
            layer,
            Arc::clone(&overlay),
            Arc::new(fetcher),
            config,
            state_tx,
            Arc::clone(&stats),
            cancel_token.clone(),
        ));

        Self {
            layer,
            overlay,
            state_rx,
            stats,
            cancel_token,
        }
    }

    #[must_use]
    pub fn layer(&self) -> WeatherLayer {
        self.layer
    }

    #[must_use]
    pub fn state(&self) -> RefreshState {
        *self.state_rx.borrow()
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RefreshState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn stats(&self) -> RefreshStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cancel the pending refresh and tear the overlay down.
    ///
    /// An in-flight cycle may finish its tile requests, but its results are
    /// discarded.
    pub fn shutdown(&self) {
        if self.cancel_token.is_cancelled() {
            return;
        }
        info!("Stopping {} overlay refresh", self.layer);
        self.cancel_token.cancel();
        lock_overlay(&self.overlay).teardown();
    }
}

impl Drop for LayerRefresher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn refresh_loop<F: TileFetcher>(
    layer: WeatherLayer,
    overlay: SharedOverlay,
    fetcher: Arc<F>,
    config: OverlayConfig,
    state_tx: watch::Sender<RefreshState>,
    stats: Arc<Mutex<RefreshStats>>,
    cancel_token: CancellationToken,
) {
    info!(
        "Starting {} overlay refresh (zoom {}, every {}s)",
        layer,
        config.zoom,
        config.refresh_interval.as_secs()
    );

    loop {
        if cancel_token.is_cancelled() {
            break;
        }

        state_tx.send_replace(RefreshState::Refreshing);

        match refresh_overlay(&overlay, &fetcher, &config).await {
            Ok(report) => {
                debug!(
                    "{} overlay refreshed: {}/{} tiles",
                    layer, report.placed, report.requested
                );
                if report.failed > 0 {
                    info!("{} overlay refreshed with {} blank tiles", layer, report.failed);
                }
                let mut stats = stats.lock().unwrap_or_else(PoisonError::into_inner);
                stats.cycles_completed += 1;
                stats.last_report = Some(report);
                stats.last_success = Some(Utc::now());
                stats.last_error = None;
            }
            Err(OverlayError::TornDown) => {
                info!("{} overlay torn down during refresh, discarding result", layer);
                break;
            }
            Err(e) => {
                warn!("Skipping {} overlay refresh: {}", layer, e);
                let mut stats = stats.lock().unwrap_or_else(PoisonError::into_inner);
                stats.cycles_skipped += 1;
                stats.last_error = Some(e.to_string());
            }
        }

        state_tx.send_replace(RefreshState::Idle);

        tokio::select! {
            () = sleep(config.refresh_interval) => {}
            () = cancel_token.cancelled() => break,
        }
    }

    state_tx.send_replace(RefreshState::Stopped);
    info!("{} overlay refresh stopped", layer);
}

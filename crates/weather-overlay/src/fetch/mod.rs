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

//! Concurrent tile fetching.
//!
//! One task is spawned per tile and the whole set is joined before the
//! stage completes. Every tile settles into a [`TileOutcome`]; a failed
//! tile never fails the stage.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use log::{debug, warn};
use thiserror::Error;
use tokio::task::JoinSet;

use crate::tile::{world_tiles, OpenWeatherMapSource, TileCoord};

/// Errors that can occur while fetching a single tile.
#[derive(Debug, Error)]
pub enum TileError {
    #[error("invalid tile url: {0}")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("tile server returned HTTP {0}")]
    Status(u16),

    #[error("invalid tile image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("tile task failed: {0}")]
    Task(String),
}

/// Result of fetching one tile.
#[derive(Debug)]
pub enum TileOutcome {
    /// The tile was downloaded and decoded.
    Loaded(RgbaImage),
    /// The tile is missing; its atlas region stays blank.
    Failed(TileError),
}

impl TileOutcome {
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self, TileOutcome::Loaded(_))
    }
}

/// Source of encoded tile images.
///
/// Implement this trait to fetch tiles from somewhere other than the
/// OpenWeatherMap HTTP endpoint.
pub trait TileFetcher: Send + Sync + 'static {
    /// Fetch the encoded (PNG) bytes of one tile.
    fn fetch(&self, coord: TileCoord) -> impl Future<Output = Result<Vec<u8>, TileError>> + Send;
}

/// Fetches tiles from a templated HTTP imagery endpoint.
#[derive(Debug, Clone)]
pub struct HttpTileFetcher {
    client: reqwest::Client,
    source: OpenWeatherMapSource,
}

impl HttpTileFetcher {
    /// Per-request timeout for tile downloads.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

    #[must_use]
    pub fn new(source: OpenWeatherMapSource) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build tile HTTP client, using defaults: {}", e);
                reqwest::Client::new()
            });
        Self::with_client(client, source)
    }

    /// Use an existing client (connection pool shared with other requests).
    #[must_use]
    pub fn with_client(client: reqwest::Client, source: OpenWeatherMapSource) -> Self {
        Self { client, source }
    }

    #[must_use]
    pub fn source(&self) -> &OpenWeatherMapSource {
        &self.source
    }
}

impl TileFetcher for HttpTileFetcher {
    async fn fetch(&self, coord: TileCoord) -> Result<Vec<u8>, TileError> {
        let url = self.source.tile_url(coord)?;
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(TileError::Status(response.status().as_u16()));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Decode an encoded tile into RGBA pixels.
pub fn decode_tile(bytes: &[u8]) -> Result<RgbaImage, TileError> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

/// Fetch every tile of the world grid at `zoom` concurrently.
///
/// Completes once every request has settled. Outcomes are returned in
/// completion order; tiles whose task panicked are omitted and stay blank.
pub async fn fetch_world_tiles<F: TileFetcher>(
    fetcher: &Arc<F>,
    zoom: u8,
) -> Vec<(TileCoord, TileOutcome)> {
    let coords = world_tiles(zoom);
    let mut tasks = JoinSet::new();

    for coord in coords.iter().copied() {
        let fetcher = Arc::clone(fetcher);
        tasks.spawn(async move {
            let outcome = match fetcher.fetch(coord).await.and_then(|b| decode_tile(&b)) {
                Ok(image) => TileOutcome::Loaded(image),
                Err(e) => {
                    debug!("Tile {} unavailable: {}", coord, e);
                    TileOutcome::Failed(e)
                }
            };
            (coord, outcome)
        });
    }

    let mut outcomes = Vec::with_capacity(coords.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => outcomes.push(result),
            Err(e) => warn!("Tile fetch task failed: {}", e),
        }
    }

    outcomes
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};
    use std::collections::HashSet;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use crate::atlas::TileAtlas;
    use crate::tile::WeatherLayer;

    /// Serve every HTTP request on a local port with an empty `status` response.
    ///
    /// Returns the base URL and a counter of requests answered.
    pub(crate) async fn serve_status(status: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let served = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&served);

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let counter = Arc::clone(&counter);
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let response =
                        format!("HTTP/1.1 {status}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        (format!("http://{addr}"), served)
    }

    /// Encode a solid-colour PNG tile.
    pub(crate) fn png_tile(size: u32, color: Rgba<u8>) -> Vec<u8> {
        let image = RgbaImage::from_pixel(size, size, color);
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    /// Colour that identifies a tile by its grid position.
    pub(crate) fn tile_color(coord: TileCoord) -> Rgba<u8> {
        Rgba([coord.x as u8 * 40 + 10, coord.y as u8 * 40 + 10, 200, 255])
    }

    /// In-memory fetcher serving coloured tiles, with optional failures.
    pub(crate) struct MockFetcher {
        pub(crate) tile_size: u32,
        pub(crate) failing: HashSet<TileCoord>,
        pub(crate) panicking: HashSet<TileCoord>,
        pub(crate) delay: Option<Duration>,
        pub(crate) requests: AtomicUsize,
        pub(crate) requested: Mutex<Vec<TileCoord>>,
    }

    impl MockFetcher {
        pub(crate) fn new(tile_size: u32) -> Self {
            Self {
                tile_size,
                failing: HashSet::new(),
                panicking: HashSet::new(),
                delay: None,
                requests: AtomicUsize::new(0),
                requested: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn request_count(&self) -> usize {
            self.requests.load(Ordering::SeqCst)
        }
    }

    impl TileFetcher for MockFetcher {
        async fn fetch(&self, coord: TileCoord) -> Result<Vec<u8>, TileError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            self.requested.lock().unwrap().push(coord);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            assert!(!self.panicking.contains(&coord), "tile backend crashed on {coord}");
            if self.failing.contains(&coord) {
                return Err(TileError::Status(404));
            }
            Ok(png_tile(self.tile_size, tile_color(coord)))
        }
    }

    #[tokio::test]
    async fn test_fetch_requests_every_tile_once() {
        let fetcher = Arc::new(MockFetcher::new(4));
        let outcomes = fetch_world_tiles(&fetcher, 2).await;

        assert_eq!(fetcher.request_count(), 16);
        assert_eq!(outcomes.len(), 16);
        assert!(outcomes.iter().all(|(_, o)| o.is_loaded()));

        let requested: HashSet<_> = fetcher.requested.lock().unwrap().iter().copied().collect();
        assert_eq!(requested, world_tiles(2).into_iter().collect());
    }

    #[tokio::test]
    async fn test_failed_tile_is_reported_not_raised() {
        let mut fetcher = MockFetcher::new(4);
        fetcher.failing.insert(TileCoord::new(1, 0, 1));
        let fetcher = Arc::new(fetcher);

        let outcomes = fetch_world_tiles(&fetcher, 1).await;

        assert_eq!(outcomes.len(), 4);
        let failed: Vec<_> = outcomes
            .iter()
            .filter(|(_, o)| !o.is_loaded())
            .map(|(c, _)| *c)
            .collect();
        assert_eq!(failed, vec![TileCoord::new(1, 0, 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_joins_all_before_returning() {
        let mut fetcher = MockFetcher::new(2);
        fetcher.delay = Some(Duration::from_secs(5));
        let fetcher = Arc::new(fetcher);

        let started = tokio::time::Instant::now();
        let outcomes = fetch_world_tiles(&fetcher, 1).await;

        // Requests run concurrently: four 5s tiles settle in 5s, not 20s.
        assert_eq!(outcomes.len(), 4);
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_http_error_status_becomes_failed_tile() {
        let (base, served) = serve_status("404 Not Found").await;
        let source = OpenWeatherMapSource::with_host(
            WeatherLayer::Clouds,
            "k3y".to_string(),
            format!("{base}/map"),
        );
        let fetcher = Arc::new(HttpTileFetcher::new(source));

        let outcomes = fetch_world_tiles(&fetcher, 1).await;

        assert_eq!(outcomes.len(), 4);
        assert_eq!(served.load(Ordering::SeqCst), 4);
        for (coord, outcome) in &outcomes {
            assert!(
                matches!(outcome, TileOutcome::Failed(TileError::Status(404))),
                "{coord}: {outcome:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_http_server_error_status() {
        let (base, _) = serve_status("500 Internal Server Error").await;
        let source = OpenWeatherMapSource::with_host(
            WeatherLayer::Precipitation,
            "k3y".to_string(),
            base,
        );
        let fetcher = HttpTileFetcher::new(source);

        let result = fetcher.fetch(TileCoord::new(0, 0, 0)).await;
        assert!(matches!(result, Err(TileError::Status(500))), "{result:?}");
    }

    #[tokio::test]
    async fn test_panicked_tile_task_leaves_cell_blank() {
        let mut fetcher = MockFetcher::new(4);
        fetcher.panicking.insert(TileCoord::new(1, 1, 0));
        let fetcher = Arc::new(fetcher);

        let outcomes = fetch_world_tiles(&fetcher, 1).await;
        assert_eq!(fetcher.request_count(), 4);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|(c, _)| *c != TileCoord::new(1, 1, 0)));

        let atlas = TileAtlas::stitch(1, 4, outcomes);
        assert_eq!(atlas.placed_tiles(), 3);
        assert_eq!(atlas.image().get_pixel(5, 1)[3], 0);
        assert_eq!(
            *atlas.image().get_pixel(1, 5),
            tile_color(TileCoord::new(1, 0, 1))
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_tile(b"not a png"), Err(TileError::Decode(_))));
    }
}

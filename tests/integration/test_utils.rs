//! Test utilities for integration tests.
//!
//! Provides a mock tile server that renders tiles on demand for the
//! file-based URL layout (`{base}{depth}/{row}_{col}_{zoom}.{ext}`) and
//! records every request it sees.

use async_trait::async_trait;
use bytes::Bytes;
use image::{GrayImage, ImageFormat, Luma};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use catmaid_tiles::error::FetchError;
use catmaid_tiles::io::{Credentials, TileResponse, TileSource};
use catmaid_tiles::spatial::Xyz;
use catmaid_tiles::stack::{Stack, StackMirror, TileSourceType};

/// Stack dimension used by most tests (x, y, z).
pub const DIMENSION: (u64, u64, u64) = (100, 200, 300);

pub const TILE_WIDTH: u32 = 254;
pub const TILE_HEIGHT: u32 = 128;

/// Expected value of the global scaled-space pixel at (z, y, x).
pub fn pattern(z: i64, y: i64, x: i64) -> u8 {
    ((z * 5 + y * 3 + x) % 251) as u8
}

/// A file-based PNG mirror with the standard test tile size.
pub fn mirror(base: &str) -> StackMirror {
    StackMirror::new(base, TILE_HEIGHT, TILE_WIDTH, TileSourceType::FileBased, "png").unwrap()
}

/// Stack with the standard dimension and the given broken slices.
pub fn stack(broken_slices: &[i64], mirrors: Vec<StackMirror>) -> Stack {
    let (x, y, z) = DIMENSION;
    Stack::new(Xyz::new(x, y, z), broken_slices.iter().copied(), None).with_mirrors(mirrors)
}

// =============================================================================
// Mock Tile Source
// =============================================================================

/// A request as seen by [`MockTileSource`].
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub url: String,
    pub auth: Option<Credentials>,
}

/// Mock tile server.
///
/// Tiles are rendered from [`pattern`] using the depth, row and column in
/// the URL. Substring rules override that per URL: a status code, a
/// transport failure, or a delay.
pub struct MockTileSource {
    content_type: String,
    statuses: Vec<(String, u16)>,
    unreachable: Vec<String>,
    delays: Vec<(String, Duration)>,
    request_count: AtomicUsize,
    requests: Mutex<Vec<SeenRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTileSource {
    pub fn new() -> Self {
        Self {
            content_type: "image/png".to_string(),
            statuses: Vec::new(),
            unreachable: Vec::new(),
            delays: Vec::new(),
            request_count: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Report a different content type (the body stays PNG).
    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = content_type.to_string();
        self
    }

    /// Answer URLs containing `pattern` with `status` and an empty body.
    pub fn with_status(mut self, pattern: &str, status: u16) -> Self {
        self.statuses.push((pattern.to_string(), status));
        self
    }

    /// Fail URLs containing `pattern` as if the connection timed out.
    pub fn with_unreachable(mut self, pattern: &str) -> Self {
        self.unreachable.push(pattern.to_string());
        self
    }

    /// Delay answers to URLs containing `pattern`.
    pub fn with_delay(mut self, pattern: &str, delay: Duration) -> Self {
        self.delays.push((pattern.to_string(), delay));
        self
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }

    /// Highest number of requests that were in progress at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn respond(&self, url: &str) -> Result<TileResponse, FetchError> {
        if let Some((_, delay)) = self.delays.iter().find(|(p, _)| url.contains(p.as_str())) {
            tokio::time::sleep(*delay).await;
        }

        if self.unreachable.iter().any(|p| url.contains(p.as_str())) {
            return Err(FetchError::Timeout {
                url: url.to_string(),
            });
        }

        if let Some((_, status)) = self.statuses.iter().find(|(p, _)| url.contains(p.as_str())) {
            return Ok(TileResponse {
                status: *status,
                content_type: Some("text/html".to_string()),
                body: Bytes::new(),
            });
        }

        let (depth, row, col) = parse_file_based(url)
            .ok_or_else(|| FetchError::Decode(format!("mock cannot parse {url}")))?;

        Ok(TileResponse {
            status: 200,
            content_type: Some(self.content_type.clone()),
            body: render_tile(depth, row, col),
        })
    }
}

impl Default for MockTileSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TileSource for MockTileSource {
    async fn get(
        &self,
        url: &str,
        auth: Option<&Credentials>,
        _timeout: Duration,
    ) -> Result<TileResponse, FetchError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(SeenRequest {
            url: url.to_string(),
            auth: auth.cloned(),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        // let other tasks overlap with this one
        tokio::task::yield_now().await;

        let result = self.respond(url).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Extract (depth, row, col) from `.../{depth}/{row}_{col}_{zoom}.{ext}`.
fn parse_file_based(url: &str) -> Option<(i64, i64, i64)> {
    let mut segments = url.rsplit('/');
    let file = segments.next()?;
    let depth = segments.next()?.parse().ok()?;

    let stem = file.split('.').next()?;
    let mut parts = stem.split('_');
    let row = parts.next()?.parse().ok()?;
    let col = parts.next()?.parse().ok()?;
    Some((depth, row, col))
}

/// PNG of one tile cut from the global [`pattern`].
pub fn render_tile(depth: i64, row: i64, col: i64) -> Bytes {
    let y0 = row * TILE_HEIGHT as i64;
    let x0 = col * TILE_WIDTH as i64;
    let img = GrayImage::from_fn(TILE_WIDTH, TILE_HEIGHT, |x, y| {
        Luma([pattern(depth, y0 + y as i64, x0 + x as i64)])
    });

    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    Bytes::from(buf.into_inner())
}

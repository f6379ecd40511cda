//! # catmaid-tiles
//!
//! Client library for fetching arbitrary 3-D regions out of the tiled,
//! multi-resolution image stacks served by CATMAID.
//!
//! A stack is a set of 2-D greyscale image tiles, one grid per z slice and
//! zoom level, served by one or more mirrors with their own URL schemes.
//! Given a region in project, stack or scaled pixel space, the library
//! works out which tiles cover it, fetches them (serially or concurrently),
//! decodes and caches them, and stitches the pieces into one contiguous
//! array in the caller's chosen axis order.
//!
//! ## Features
//!
//! - **Three coordinate spaces**: project (real-world), stack (voxels) and
//!   scaled (pixels at a zoom level)
//! - **Mirror handling**: select by position or title, or probe for the
//!   fastest
//! - **Tile cache**: LRU bounded by tile count and bytes
//! - **Broken slices**: filled with a constant without any requests
//! - **Concurrent fetching**: bounded number of tile requests in flight
//!
//! ## Architecture
//!
//! - [`spatial`] - Axes, orientations and coordinate transforms
//! - [`stack`] - Stacks, mirrors, tile indices and stack info records
//! - [`io`] - Tile sources (HTTP or custom) and tile decoding
//! - [`tile`] - Tile cache and the region fetcher
//! - [`client`] - Authenticated CATMAID REST client
//! - [`config`] - CLI types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use catmaid_tiles::{CatmaidClient, FetcherOptions, HttpTileSource, ImageFetcher, RoiMode};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CatmaidClient::new("https://example.org/catmaid/", Some("token".into()))?
//!     .with_project_id(1);
//! let mut fetcher = ImageFetcher::from_catmaid(
//!     &client,
//!     5,
//!     Arc::new(HttpTileSource::new()),
//!     FetcherOptions::default(),
//! )
//! .await?;
//!
//! // z, y, x
//! let volume = fetcher
//!     .get([[0, 0, 0], [10, 512, 512]], RoiMode::Stack, 0)
//!     .await?;
//! assert_eq!(volume.shape(), &[10, 512, 512]);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod io;
pub mod spatial;
pub mod stack;
pub mod tile;

// Re-export commonly used types
pub use client::{make_url, CatmaidClient, ClientCredentials};
pub use error::{ClientError, FetchError, ImageError, SpatialError, StackError};
pub use io::{decode_tile, Credentials, HttpTileSource, TileResponse, TileSource};
pub use spatial::{Axis, AxisOrder, CoordinateTransformer, StackOrientation, Xyz};
pub use stack::{
    fill_tiled_cuboid, BrokenSlices, MirrorRecord, ProjectPlacement, Stack, StackInfo, StackMirror,
    TileIndex, TileSourceType,
};
pub use tile::{
    reorient_volume, BrokenSliceHandling, FetcherOptions, ImageFetcher, MirrorSelector, Roi,
    RoiMode, ScaledRoi, Scheduling, TileCache, VolumeSink, DEFAULT_CACHE_ITEMS, DEFAULT_TIMEOUT,
    DEFAULT_WORKERS,
};

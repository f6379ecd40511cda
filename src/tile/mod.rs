//! Tile caching and region assembly.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              ImageFetcher               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  TileCache   │  │   TileLayout    │  │
//! │  │  (decoded    │  │  (trim, reorder │  │
//! │  │   tiles)     │  │   and place)    │  │
//! │  └──────────────┘  └────────┬────────┘  │
//! └────────────────────┬────────┼───────────┘
//!                      │        ▼
//!                      │   VolumeSink (Array3<u8>, ...)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │        TileSource (HTTP or mock)        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`ImageFetcher`]: entry point; turns a region into tiles and back
//! - [`TileCache`]: LRU cache of decoded tiles bounded by count and bytes
//! - [`VolumeSink`]: anything a fetched region can be written into
//! - [`FetcherOptions`]: axis order, timeout, cache bounds, fill value,
//!   credentials and scheduling

mod cache;
mod fetcher;
mod sink;

pub use cache::{TileCache, DEFAULT_CACHE_ITEMS};
pub use fetcher::{
    reorient_volume, BrokenSliceHandling, FetcherOptions, ImageFetcher, MirrorSelector, Roi,
    RoiMode, ScaledRoi, Scheduling, DEFAULT_TIMEOUT, DEFAULT_WORKERS,
};
pub use sink::VolumeSink;

//! Spatial primitives: axes, coordinate triples and coordinate spaces.
//!
//! # Coordinate spaces
//!
//! ```text
//!   project space ──(translation, resolution, orientation)──► stack space
//!   (real units)                                              (voxels, zoom 0)
//!                                                                  │
//!                                                       ÷ 2^zoom (x, y; z opt.)
//!                                                                  ▼
//!                                                            scaled space
//!                                                       (pixels at one zoom level)
//! ```

mod axis;
mod transform;

pub use axis::{Axis, AxisOrder, Xyz};
pub use transform::{CoordinateTransformer, StackOrientation};

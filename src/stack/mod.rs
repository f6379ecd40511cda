//! Stacks, their mirrors, and tile addressing.

mod info;
mod mirror;
#[allow(clippy::module_inception)]
mod stack;
mod tile_index;

pub use info::{BrokenSlices, StackInfo};
pub use mirror::{MirrorRecord, StackMirror, TileSourceType};
pub use stack::{ProjectPlacement, Stack};
pub use tile_index::{fill_tiled_cuboid, TileIndex};

use std::collections::BTreeSet;
use std::fmt;

use crate::error::StackError;
use crate::spatial::Xyz;

/// Address of one tile in a mirror's pyramid.
///
/// Ordering follows `(depth, row, col)` first, so a sorted set of indices
/// walks the grid slice by slice, row by row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileIndex {
    pub depth: i64,
    pub row: i64,
    pub col: i64,
    pub zoom_level: i32,
    pub height: u32,
    pub width: u32,
}

impl TileIndex {
    pub const fn new(
        depth: i64,
        row: i64,
        col: i64,
        zoom_level: i32,
        height: u32,
        width: u32,
    ) -> Self {
        Self {
            depth,
            row,
            col,
            zoom_level,
            height,
            width,
        }
    }

    /// Top-left pixel of this tile in scaled stack space.
    pub fn coords(&self) -> Xyz<i64> {
        Xyz::new(
            self.width as i64 * self.col,
            self.height as i64 * self.row,
            self.depth,
        )
    }

    /// Whether both indices live on the same grid (zoom level and tile size).
    pub fn is_comparable(&self, other: &TileIndex) -> bool {
        self.zoom_level == other.zoom_level
            && self.height == other.height
            && self.width == other.width
    }

    /// Number of pixels in one tile.
    pub fn pixel_count(&self) -> usize {
        self.height as usize * self.width as usize
    }
}

impl fmt::Display for TileIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "z={} row={} col={} @ zoom {} ({}x{})",
            self.depth, self.row, self.col, self.zoom_level, self.width, self.height
        )
    }
}

/// Every tile in the inclusive cuboid spanned by two corner tiles.
///
/// All members share `min`'s zoom level and tile size.
///
/// # Errors
///
/// `IncomparableTiles` if the corners are on different grids.
pub fn fill_tiled_cuboid(min: TileIndex, max: TileIndex) -> Result<BTreeSet<TileIndex>, StackError> {
    if !min.is_comparable(&max) {
        return Err(StackError::IncomparableTiles);
    }

    let mut tiles = BTreeSet::new();
    for depth in min.depth..=max.depth {
        for row in min.row..=max.row {
            for col in min.col..=max.col {
                tiles.insert(TileIndex {
                    depth,
                    row,
                    col,
                    ..min
                });
            }
        }
    }
    Ok(tiles)
}

use std::fmt;

use serde::Deserialize;

use super::tile_index::TileIndex;
use crate::error::StackError;
use crate::io::Credentials;
use crate::spatial::Xyz;

// =============================================================================
// Tile Source Type
// =============================================================================

/// The tile source type codes a CATMAID server can report for a mirror.
///
/// Only some of them have a URL layout this crate can generate; see
/// [`TileSourceType::is_supported`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TileSourceType {
    FileBased = 1,
    RequestQuery = 2,
    Hdf5 = 3,
    FileBasedWithZoomDirs = 4,
    DirBased = 5,
    DvidImageblk = 6,
    RenderService = 7,
    DvidImagetile = 8,
    Flixserver = 9,
    H2n5Tiles = 10,
}

impl TileSourceType {
    /// Codes with a known URL layout.
    pub const SUPPORTED: [TileSourceType; 5] = [
        TileSourceType::FileBased,
        TileSourceType::RequestQuery,
        TileSourceType::FileBasedWithZoomDirs,
        TileSourceType::DirBased,
        TileSourceType::RenderService,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_supported(self) -> bool {
        Self::SUPPORTED.contains(&self)
    }
}

impl TryFrom<i64> for TileSourceType {
    type Error = StackError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        use TileSourceType::*;
        Ok(match code {
            1 => FileBased,
            2 => RequestQuery,
            3 => Hdf5,
            4 => FileBasedWithZoomDirs,
            5 => DirBased,
            6 => DvidImageblk,
            7 => RenderService,
            8 => DvidImagetile,
            9 => Flixserver,
            10 => H2n5Tiles,
            other => return Err(StackError::UnknownTileSourceType(other)),
        })
    }
}

impl fmt::Display for TileSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

// =============================================================================
// Mirror record
// =============================================================================

/// One entry of the `mirrors` list in a stack info response.
#[derive(Debug, Clone, Deserialize)]
pub struct MirrorRecord {
    pub image_base: String,
    pub tile_height: u32,
    pub tile_width: u32,
    pub tile_source_type: i64,
    pub file_extension: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub position: i64,
}

// =============================================================================
// Stack Mirror
// =============================================================================

/// One tile server holding a copy of a stack.
#[derive(Debug, Clone, PartialEq)]
pub struct StackMirror {
    image_base: String,
    tile_height: u32,
    tile_width: u32,
    tile_source_type: TileSourceType,
    file_extension: String,
    title: String,
    position: i64,
    auth: Option<Credentials>,
}

impl StackMirror {
    /// Create a mirror.
    ///
    /// `image_base` gains a trailing slash and `file_extension` loses a
    /// leading dot if needed. Title defaults to empty and position to 0.
    ///
    /// # Errors
    ///
    /// - `UnsupportedTileSourceType` if no URL layout is known for the type
    /// - `InvalidTileGeometry` if either tile dimension is zero
    pub fn new(
        image_base: impl Into<String>,
        tile_height: u32,
        tile_width: u32,
        tile_source_type: TileSourceType,
        file_extension: &str,
    ) -> Result<Self, StackError> {
        if !tile_source_type.is_supported() {
            return Err(StackError::UnsupportedTileSourceType(tile_source_type.code()));
        }
        if tile_height == 0 || tile_width == 0 {
            return Err(StackError::InvalidTileGeometry {
                tile_width,
                tile_height,
            });
        }

        let mut image_base = image_base.into();
        if !image_base.ends_with('/') {
            image_base.push('/');
        }

        Ok(Self {
            image_base,
            tile_height,
            tile_width,
            tile_source_type,
            file_extension: file_extension
                .strip_prefix('.')
                .unwrap_or(file_extension)
                .to_string(),
            title: String::new(),
            position: 0,
            auth: None,
        })
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_position(mut self, position: i64) -> Self {
        self.position = position;
        self
    }

    /// Basic-auth credentials for this mirror only.
    pub fn with_auth(mut self, auth: Credentials) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Build from a stack info mirror entry.
    pub fn from_record(record: &MirrorRecord) -> Result<Self, StackError> {
        let source_type = TileSourceType::try_from(record.tile_source_type)?;
        let mirror = Self::new(
            record.image_base.as_str(),
            record.tile_height,
            record.tile_width,
            source_type,
            &record.file_extension,
        )?
        .with_position(record.position);

        Ok(match &record.title {
            Some(title) => mirror.with_title(title.as_str()),
            None => mirror,
        })
    }

    pub fn image_base(&self) -> &str {
        &self.image_base
    }

    pub fn tile_height(&self) -> u32 {
        self.tile_height
    }

    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    pub fn tile_source_type(&self) -> TileSourceType {
        self.tile_source_type
    }

    pub fn file_extension(&self) -> &str {
        &self.file_extension
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn auth(&self) -> Option<&Credentials> {
        self.auth.as_ref()
    }

    /// Find the tile containing a scaled-space pixel, and the pixel's offset
    /// from that tile's top-left corner.
    pub fn get_tile_index(&self, pixel: Xyz<i64>, zoom_level: i32) -> (TileIndex, Xyz<i64>) {
        let tile = TileIndex {
            depth: pixel.z,
            row: pixel.y.div_euclid(self.tile_height as i64),
            col: pixel.x.div_euclid(self.tile_width as i64),
            zoom_level,
            height: self.tile_height,
            width: self.tile_width,
        };
        let offset = pixel.sub(tile.coords());
        (tile, offset)
    }

    /// Absolute URL of a tile on this mirror.
    ///
    /// # Errors
    ///
    /// `IncompatibleTileGeometry` if the tile's size differs from the
    /// mirror's in either dimension.
    pub fn generate_url(&self, tile: &TileIndex) -> Result<String, StackError> {
        if tile.height != self.tile_height || tile.width != self.tile_width {
            return Err(StackError::IncompatibleTileGeometry {
                tile_width: tile.width,
                tile_height: tile.height,
                mirror_width: self.tile_width,
                mirror_height: self.tile_height,
            });
        }

        let base = &self.image_base;
        let ext = &self.file_extension;
        let TileIndex {
            depth,
            row,
            col,
            zoom_level: zoom,
            ..
        } = *tile;

        let url = match self.tile_source_type {
            TileSourceType::FileBased => format!("{base}{depth}/{row}_{col}_{zoom}.{ext}"),
            TileSourceType::RequestQuery => {
                let coords = tile.coords();
                format!(
                    "{base}?x={x}&y={y}&width={w}&height={h}&row=y&col=x&scale={scale}&z={depth}",
                    x = coords.x,
                    y = coords.y,
                    w = self.tile_width,
                    h = self.tile_height,
                    scale = 2f64.powi(-zoom),
                )
            }
            TileSourceType::FileBasedWithZoomDirs => {
                format!("{base}{depth}/{zoom}/{row}_{col}.{ext}")
            }
            TileSourceType::DirBased => format!("{base}{zoom}/{depth}/{row}/{col}.{ext}"),
            TileSourceType::RenderService => format!(
                "{base}largeDataTileSource/{w}/{h}/{zoom}/{depth}/{row}/{col}.{ext}",
                w = self.tile_width,
                h = self.tile_height,
            ),
            other => return Err(StackError::UnsupportedTileSourceType(other.code())),
        };
        Ok(url)
    }
}

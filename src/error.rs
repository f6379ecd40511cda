use thiserror::Error;

/// Errors from axis, orientation and coordinate-space handling
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpatialError {
    /// Stack orientation is not one of 0/1/2 or "xy"/"xz"/"zy"
    #[error("Invalid stack orientation: {0} (expected 0, 1, 2, 'xy', 'xz' or 'zy')")]
    InvalidOrientation(String),

    /// Axis order is not a permutation of "xyz"
    #[error("Invalid axis order: {0:?} (expected a permutation of 'xyz')")]
    InvalidAxisOrder(String),
}

/// Errors related to the stack and mirror model
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StackError {
    /// Tile source type has no URL template
    #[error("Tile source type {0} is not supported (supported: 1, 2, 4, 5, 7)")]
    UnsupportedTileSourceType(u8),

    /// Tile source type code is not known at all
    #[error("Unknown tile source type code: {0}")]
    UnknownTileSourceType(i64),

    /// Mirror reports a tile size with a zero dimension
    #[error("Invalid tile geometry {tile_width}x{tile_height}: dimensions must be non-zero")]
    InvalidTileGeometry { tile_width: u32, tile_height: u32 },

    /// Tile index was built for a different tile size than the mirror serves
    #[error(
        "Tile geometry {tile_width}x{tile_height} is not compatible with mirror geometry \
         {mirror_width}x{mirror_height}"
    )]
    IncompatibleTileGeometry {
        tile_width: u32,
        tile_height: u32,
        mirror_width: u32,
        mirror_height: u32,
    },

    /// Tile indices differ in zoom level or tile size
    #[error("Tile indices are not comparable (different zoom level or tile size)")]
    IncomparableTiles,

    /// Every mirror timed out or refused the connection
    #[error("No reachable mirrors found")]
    NoMirrorReachable,

    /// Stack info record is malformed
    #[error("Invalid stack info: {0}")]
    InvalidStackInfo(String),
}

/// Network and decoding errors for a single tile request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Request exceeded its timeout
    #[error("Request timed out: {url}")]
    Timeout { url: String },

    /// Network or connection error
    #[error("Connection error for {url}: {message}")]
    Connection { url: String, message: String },

    /// Server answered with a non-success status (other than 404 for tiles)
    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    /// Only greyscale-convertible PNG and JPEG tiles are supported
    #[error("Unsupported tile content type: {0} (only image/png and image/jpeg)")]
    UnsupportedContentType(String),

    /// Tile body could not be decoded as an image
    #[error("Failed to decode tile: {0}")]
    Decode(String),

    /// Background fetch task panicked or was cancelled
    #[error("Tile fetch task failed: {0}")]
    Task(String),
}

/// Errors returned by the image fetch engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImageError {
    /// PROJECT mode requires a stack placed in a project
    #[error("ROI mode '{0}' is not supported: the stack is not related to a project")]
    UnsupportedRoiMode(String),

    /// Zoom levels must be whole numbers
    #[error("Non-integer zoom level is not supported: {0}")]
    UnsupportedZoomLevel(f64),

    /// ROI maximum lies below its minimum, or the volume is too large to
    /// allocate
    #[error("Invalid ROI: minimum {min:?}, maximum {max:?}")]
    InvalidRoi { min: [i64; 3], max: [i64; 3] },

    /// ROI converted to pixels is NaN, infinite or out of integer range
    #[error("ROI is not representable in pixels: minimum {min:?}, maximum {max:?}")]
    UnrepresentableRoi { min: [f64; 3], max: [f64; 3] },

    /// Volumes handed to reorientation must be 2-D or 3-D
    #[error("Unknown dimension of volume: should be 2D or 3D, got {0}D")]
    InvalidVolumeRank(usize),

    /// Only fill-mode broken slice handling exists
    #[error("Broken slice handling '{0}' is not implemented; only 'fill' is")]
    BrokenSliceHandlingNotImplemented(String),

    /// Explicitly selected mirror does not belong to the stack
    #[error("Selected mirror is not in stack's mirrors")]
    MirrorNotInStack,

    /// Stack has no mirrors to fetch from
    #[error("Stack has no mirrors")]
    NoMirrors,

    /// Caller-supplied output does not match the ROI extents
    #[error("Output shape {actual:?} does not match ROI shape {expected:?}")]
    OutputShapeMismatch {
        expected: [usize; 3],
        actual: [usize; 3],
    },

    #[error(transparent)]
    Stack(#[from] StackError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Errors from the authenticated REST client
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// Body was not the expected JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Base URL or path could not be joined
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Credentials file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Request needs a project but the client has none set
    #[error("No project ID set on client")]
    MissingProjectId,

    /// Neither a base URL nor a credentials file was given
    #[error("No server base URL given")]
    MissingBaseUrl,

    #[error(transparent)]
    Stack(#[from] StackError),

    #[error(transparent)]
    Image(#[from] ImageError),
}

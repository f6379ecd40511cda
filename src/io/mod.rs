mod decode;
mod http;
mod source;

pub use decode::{decode_tile, SUPPORTED_CONTENT_TYPES};
pub use http::HttpTileSource;
pub use source::{Credentials, TileResponse, TileSource};

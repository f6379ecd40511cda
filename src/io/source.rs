use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;

use crate::error::FetchError;

/// HTTP basic-auth username and password.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A completed response from a tile server, whatever its status.
#[derive(Debug, Clone)]
pub struct TileResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl TileResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

/// Trait for issuing GET requests against tile servers.
///
/// This is the only network seam the fetch engine and mirror probing depend
/// on, so tests can substitute a mock that serves canned tiles and counts
/// requests. Implementations must return `Ok` for every response the server
/// actually sent (including 4xx/5xx) and reserve `Err` for transport
/// failures: timeouts and connection errors.
#[async_trait]
pub trait TileSource: Send + Sync {
    /// Fetch `url`, giving up after `timeout`.
    async fn get(
        &self,
        url: &str,
        auth: Option<&Credentials>,
        timeout: Duration,
    ) -> Result<TileResponse, FetchError>;
}

#[async_trait]
impl<T: TileSource + ?Sized> TileSource for Arc<T> {
    async fn get(
        &self,
        url: &str,
        auth: Option<&Credentials>,
        timeout: Duration,
    ) -> Result<TileResponse, FetchError> {
        (**self).get(url, auth, timeout).await
    }
}

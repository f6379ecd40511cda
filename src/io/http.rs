use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

use super::source::{Credentials, TileResponse, TileSource};
use crate::error::FetchError;

/// reqwest-backed implementation of `TileSource`.
///
/// Holds one connection-pooling client; clones share the pool.
#[derive(Clone, Default)]
pub struct HttpTileSource {
    client: Client,
}

impl HttpTileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client (proxy, TLS roots, user agent, ...).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TileSource for HttpTileSource {
    async fn get(
        &self,
        url: &str,
        auth: Option<&Credentials>,
        timeout: Duration,
    ) -> Result<TileResponse, FetchError> {
        let mut request = self.client.get(url).timeout(timeout);
        if let Some(creds) = auth {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(url, e))?;

        Ok(TileResponse {
            status,
            content_type,
            body,
        })
    }
}

fn transport_error(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Connection {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

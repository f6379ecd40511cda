//! Authenticated access to a CATMAID server's REST API.
//!
//! Every request carries the API token in an `X-Authorization: Token ...`
//! header, and HTTP basic credentials when the server sits behind them.

use std::fmt;
use std::path::Path;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::ClientError;
use crate::io::Credentials;
use crate::stack::StackInfo;

const TOKEN_HEADER: &str = "X-Authorization";

/// Join path components onto a base URL as if every component were a
/// directory, whatever slashes they start or end with.
///
/// ```
/// use catmaid_tiles::client::make_url;
///
/// let url = make_url("https://example.org/catmaid", ["/1/", "stack", "5/info"]).unwrap();
/// assert_eq!(url.as_str(), "https://example.org/catmaid/1/stack/5/info");
/// ```
pub fn make_url<I>(base_url: &str, parts: I) -> Result<Url, url::ParseError>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut url = Url::parse(base_url)?;
    for part in parts {
        let part = part.as_ref();
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url = url.join(part.strip_prefix('/').unwrap_or(part))?;
    }
    Ok(url)
}

/// Contents of a JSON credentials file.
#[derive(Clone, Deserialize)]
pub struct ClientCredentials {
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub auth_name: Option<String>,
    #[serde(default)]
    pub auth_pass: Option<String>,
    #[serde(default)]
    pub project_id: Option<i64>,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("auth_name", &self.auth_name)
            .field("project_id", &self.project_id)
            .finish()
    }
}

/// Client for one CATMAID server, optionally bound to a project.
#[derive(Clone)]
pub struct CatmaidClient {
    base_url: Url,
    token: Option<String>,
    auth: Option<Credentials>,
    project_id: Option<i64>,
    http: Client,
}

impl fmt::Debug for CatmaidClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatmaidClient")
            .field("base_url", &self.base_url.as_str())
            .field("auth", &self.auth)
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

impl CatmaidClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ClientError> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            token,
            auth: None,
            project_id: None,
            http: Client::new(),
        })
    }

    /// HTTP basic credentials sent with every request.
    pub fn with_auth(mut self, auth: Credentials) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_project_id(mut self, project_id: i64) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    pub fn from_credentials(creds: ClientCredentials) -> Result<Self, ClientError> {
        let mut client = Self::new(&creds.base_url, creds.token)?;
        if let (Some(name), Some(pass)) = (creds.auth_name, creds.auth_pass) {
            client = client.with_auth(Credentials::new(name, pass));
        }
        client.project_id = creds.project_id;
        Ok(client)
    }

    /// Load a client from a JSON credentials file with `base_url`, `token`,
    /// `auth_name`, `auth_pass` and optionally `project_id`.
    ///
    /// `project_id` is ignored unless `with_project_id` is set.
    pub fn from_json(path: impl AsRef<Path>, with_project_id: bool) -> Result<Self, ClientError> {
        let text = std::fs::read_to_string(path)?;
        let mut creds: ClientCredentials = serde_json::from_str(&text)?;
        if !with_project_id {
            creds.project_id = None;
        }
        Self::from_credentials(creds)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn auth(&self) -> Option<&Credentials> {
        self.auth.as_ref()
    }

    pub fn project_id(&self) -> Option<i64> {
        self.project_id
    }

    pub fn set_project_id(&mut self, project_id: Option<i64>) {
        self.project_id = project_id;
    }

    /// Absolute URL for a path relative to the server root.
    pub fn make_request_url<I>(&self, parts: I) -> Result<Url, ClientError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Ok(make_url(self.base_url.as_str(), parts)?)
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.token {
            if let Ok(value) = HeaderValue::from_str(&format!("Token {token}")) {
                headers.insert(TOKEN_HEADER, value);
            }
        }
        headers
    }

    fn authorise(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.headers(self.headers());
        match &self.auth {
            Some(creds) => request.basic_auth(&creds.username, Some(&creds.password)),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, url: &Url) -> Result<reqwest::Response, ClientError> {
        let response = self.authorise(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    /// GET `path` with query parameters, returning the raw body.
    pub async fn get_text(&self, path: &str, params: &[(&str, String)]) -> Result<String, ClientError> {
        let url = self.make_request_url([path])?;
        debug!(url = %url, "GET");
        let response = self.send(self.http.get(url.clone()).query(params), &url).await?;
        Ok(response.text().await?)
    }

    /// GET `path` with query parameters, parsing the body as JSON.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ClientError> {
        let text = self.get_text(path, params).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// POST a form to `path`, returning the raw body.
    pub async fn post_text(&self, path: &str, form: &[(&str, String)]) -> Result<String, ClientError> {
        let url = self.make_request_url([path])?;
        debug!(url = %url, "POST");
        let response = self.send(self.http.post(url.clone()).form(form), &url).await?;
        Ok(response.text().await?)
    }

    /// POST a form to `path`, parsing the body as JSON.
    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, ClientError> {
        let text = self.post_text(path, form).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Stack info for one of this client's project's stacks.
    pub async fn stack_info(&self, stack_id: i64) -> Result<StackInfo, ClientError> {
        let project_id = self.project_id.ok_or(ClientError::MissingProjectId)?;
        let value: serde_json::Value = self
            .get(&format!("{project_id}/stack/{stack_id}/info"), &[])
            .await?;
        Ok(StackInfo::from_json(value)?)
    }
}

//! Command-line configuration for the `catmaid-tiles` binary.
//!
//! Connection settings can come from flags, from environment variables
//! with the `CATMAID_` prefix, or from a JSON credentials file:
//!
//! - `CATMAID_BASE_URL` - Server root, e.g. `https://example.org/catmaid/`
//! - `CATMAID_TOKEN` - API token sent as `X-Authorization: Token ...`
//! - `CATMAID_AUTH_NAME` / `CATMAID_AUTH_PASS` - HTTP basic credentials
//! - `CATMAID_PROJECT_ID` - Project the stack belongs to
//! - `CATMAID_CREDENTIALS` - JSON file with any of the above
//!
//! Explicit flags and variables override values from the credentials file.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::client::CatmaidClient;
use crate::error::ClientError;
use crate::io::Credentials;
use crate::spatial::AxisOrder;
use crate::tile::{
    FetcherOptions, MirrorSelector, Roi, RoiMode, Scheduling, DEFAULT_CACHE_ITEMS, DEFAULT_WORKERS,
};

// =============================================================================
// Default Values
// =============================================================================

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: f64 = 1.0;

/// Default number of probe repetitions per mirror.
pub const DEFAULT_PROBE_REPS: usize = 1;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Fetch regions of tiled CATMAID image stacks.
#[derive(Parser, Debug, Clone)]
#[command(name = "catmaid-tiles")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Fetch a region of a stack and write it as PNG slices
    Fetch(FetchConfig),

    /// Measure response times of every mirror of a stack
    Mirrors(MirrorsConfig),
}

// -----------------------------------------------------------------------------
// Connection
// -----------------------------------------------------------------------------

#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// CATMAID server root URL.
    #[arg(long, env = "CATMAID_BASE_URL")]
    pub base_url: Option<String>,

    /// API token.
    #[arg(long, env = "CATMAID_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// HTTP basic auth user name.
    #[arg(long, env = "CATMAID_AUTH_NAME")]
    pub auth_name: Option<String>,

    /// HTTP basic auth password.
    #[arg(long, env = "CATMAID_AUTH_PASS", hide_env_values = true)]
    pub auth_pass: Option<String>,

    /// Project ID the stack belongs to.
    #[arg(long, env = "CATMAID_PROJECT_ID")]
    pub project_id: Option<i64>,

    /// JSON credentials file (base_url, token, auth_name, auth_pass, project_id).
    #[arg(long, env = "CATMAID_CREDENTIALS")]
    pub credentials: Option<PathBuf>,
}

impl ConnectionArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.is_none() && self.credentials.is_none() {
            return Err(
                "No server given. Set --base-url or CATMAID_BASE_URL, or --credentials".to_string(),
            );
        }

        if self.auth_name.is_some() != self.auth_pass.is_some() {
            return Err("--auth-name and --auth-pass must be given together".to_string());
        }

        if self.project_id.is_none() && self.credentials.is_none() {
            return Err(
                "No project given. Set --project-id or CATMAID_PROJECT_ID".to_string(),
            );
        }

        Ok(())
    }

    /// Build a client from the credentials file, if any, overridden by
    /// explicit settings.
    pub fn build_client(&self) -> Result<CatmaidClient, ClientError> {
        let mut client = match (&self.credentials, &self.base_url) {
            (Some(path), None) => CatmaidClient::from_json(path, true)?,
            (Some(path), Some(base_url)) => {
                let from_file = CatmaidClient::from_json(path, true)?;
                let mut client = CatmaidClient::new(base_url, self.token.clone())?;
                if let Some(auth) = from_file.auth() {
                    client = client.with_auth(auth.clone());
                }
                client.set_project_id(from_file.project_id());
                client
            }
            (None, Some(base_url)) => CatmaidClient::new(base_url, self.token.clone())?,
            (None, None) => return Err(ClientError::MissingBaseUrl),
        };

        if let (Some(name), Some(pass)) = (&self.auth_name, &self.auth_pass) {
            client = client.with_auth(Credentials::new(name.clone(), pass.clone()));
        }
        if let Some(project_id) = self.project_id {
            client.set_project_id(Some(project_id));
        }
        Ok(client)
    }
}

// -----------------------------------------------------------------------------
// Fetch
// -----------------------------------------------------------------------------

#[derive(Args, Debug, Clone)]
pub struct FetchConfig {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Stack to fetch from.
    #[arg(long)]
    pub stack_id: i64,

    /// Region as six comma-separated values: the minimum corner then the
    /// maximum corner, each in `--order` axis order.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
    pub roi: Vec<f64>,

    /// Coordinate space of the region: project, stack or scaled.
    #[arg(long, default_value = "stack")]
    pub mode: RoiMode,

    /// Zoom level; each level halves x and y resolution.
    #[arg(long, default_value_t = 0)]
    pub zoom: i32,

    /// Axis order of the region and output, a permutation of "xyz".
    #[arg(long, default_value = "zyx")]
    pub order: AxisOrder,

    /// Concurrent tile requests; 0 fetches serially.
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    pub threads: usize,

    /// Per-tile request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: f64,

    /// Maximum cached tiles; 0 disables the count bound.
    #[arg(long, default_value_t = DEFAULT_CACHE_ITEMS)]
    pub cache_items: usize,

    /// Maximum cached tile bytes.
    #[arg(long)]
    pub cache_bytes: Option<usize>,

    /// Fill value for missing and broken tiles.
    #[arg(long, default_value_t = 0)]
    pub cval: u8,

    /// Mirror to use, by position or title.
    #[arg(long, conflicts_with = "fastest_mirror")]
    pub mirror: Option<String>,

    /// Probe every mirror and use the fastest.
    #[arg(long, default_value_t = false)]
    pub fastest_mirror: bool,

    /// Directory to write one PNG per output slice into.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl FetchConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.connection.validate()?;

        if self.roi.len() != 6 {
            return Err(format!(
                "--roi needs 6 values (min then max corner), got {}",
                self.roi.len()
            ));
        }

        if self.roi.iter().any(|v| !v.is_finite()) {
            return Err("--roi values must be finite".to_string());
        }

        if !(self.timeout.is_finite() && self.timeout > 0.0) {
            return Err(format!("--timeout must be positive, got {}", self.timeout));
        }

        if self.cache_bytes == Some(0) {
            return Err("--cache-bytes must be greater than 0".to_string());
        }

        Ok(())
    }

    /// The region given by `--roi`, or `None` unless exactly six values
    /// were given.
    pub fn roi(&self) -> Option<Roi> {
        let corners: &[f64; 6] = self.roi.as_slice().try_into().ok()?;
        let [x0, y0, z0, x1, y1, z1] = *corners;
        Some(Roi::new([x0, y0, z0], [x1, y1, z1]))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }

    pub fn mirror_selector(&self) -> Option<MirrorSelector> {
        self.mirror.as_deref().and_then(|s| s.parse().ok())
    }

    pub fn fetcher_options(&self) -> FetcherOptions {
        let scheduling = match self.threads {
            0 => Scheduling::Serial,
            workers => Scheduling::Concurrent { workers },
        };

        let mut options = FetcherOptions::new()
            .with_target_order(self.order)
            .with_timeout(self.timeout())
            .with_cache_items((self.cache_items > 0).then_some(self.cache_items))
            .with_cache_bytes(self.cache_bytes)
            .with_cval(self.cval)
            .with_scheduling(scheduling);

        if let Some(selector) = self.mirror_selector() {
            options = options.with_preferred_mirror(selector);
        }
        options
    }
}

// -----------------------------------------------------------------------------
// Mirrors
// -----------------------------------------------------------------------------

#[derive(Args, Debug, Clone)]
pub struct MirrorsConfig {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Stack whose mirrors are probed.
    #[arg(long)]
    pub stack_id: i64,

    /// Requests per mirror.
    #[arg(long, default_value_t = DEFAULT_PROBE_REPS)]
    pub reps: usize,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: f64,

    /// Report total rather than per-request time.
    #[arg(long, default_value_t = false)]
    pub no_normalise: bool,

    /// Enable debug logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl MirrorsConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.connection.validate()?;

        if self.reps == 0 {
            return Err("--reps must be at least 1".to_string());
        }

        if !(self.timeout.is_finite() && self.timeout > 0.0) {
            return Err(format!("--timeout must be positive, got {}", self.timeout));
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }
}

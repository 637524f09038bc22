//! Client configuration loaded from environment variables.
//!
//! All settings come from environment variables (or a `.env` file via
//! `dotenvy`). Every key is prefixed with `AGRIMARKET_`.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;

use crate::error::ClientError;
use crate::hub::RetryPolicy;

/// Top-level client configuration.
///
/// Loaded once at startup via [`ClientConfig::from_env`], or built in code
/// with [`ClientConfig::new`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST API (e.g. `https://api.example.com`).
    pub api_base_url: Url,

    /// URL of the realtime auction hub.
    pub hub_url: Url,

    /// Path of the token exchange endpoint, relative to the API base.
    pub refresh_path: String,

    /// Path of the login endpoint, relative to the API base.
    pub login_path: String,

    /// File backing the token store. `None` keeps tokens in memory only.
    pub token_store_path: Option<PathBuf>,

    /// Tokens with less than this much lifetime left are refreshed.
    pub token_safety_margin: Duration,

    /// Timeout applied to every REST request.
    pub request_timeout: Duration,

    /// Reconnect backoff for the hub connection.
    pub reconnect: RetryPolicy,

    /// Interval between keep-alive pings on an idle hub connection.
    pub hub_keepalive: Duration,
}

impl ClientConfig {
    /// Builds a configuration with defaults for everything but the API
    /// base URL. The hub URL defaults to `<api base>/hubs/auction`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if `api_base_url` is not a valid URL.
    pub fn new(api_base_url: &str) -> Result<Self, ClientError> {
        let api_base_url = parse_url(api_base_url)?;
        let hub_url = api_base_url
            .join("hubs/auction")
            .map_err(|e| ClientError::Config(format!("hub url: {e}")))?;

        Ok(Self {
            api_base_url,
            hub_url,
            refresh_path: "/api/auth/refresh-token".to_string(),
            login_path: "/api/auth/login".to_string(),
            token_store_path: None,
            token_safety_margin: Duration::from_secs(120),
            request_timeout: Duration::from_secs(30),
            reconnect: RetryPolicy::default(),
            hub_keepalive: Duration::from_secs(15),
        })
    }

    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set or cannot be
    /// parsed. Calls `dotenvy::dotenv().ok()` to optionally load a `.env`
    /// file.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if `AGRIMARKET_API_BASE_URL` or
    /// `AGRIMARKET_HUB_URL` is set but is not a valid URL.
    pub fn from_env() -> Result<Self, ClientError> {
        dotenvy::dotenv().ok();

        let api_base = std::env::var("AGRIMARKET_API_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:5000".to_string());
        let mut config = Self::new(&api_base)?;

        if let Ok(hub) = std::env::var("AGRIMARKET_HUB_URL") {
            config.hub_url = parse_url(&hub)?;
        }
        if let Ok(path) = std::env::var("AGRIMARKET_REFRESH_PATH") {
            config.refresh_path = path;
        }
        if let Ok(path) = std::env::var("AGRIMARKET_LOGIN_PATH") {
            config.login_path = path;
        }
        config.token_store_path = std::env::var("AGRIMARKET_TOKEN_STORE_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        config.token_safety_margin =
            Duration::from_secs(parse_env("AGRIMARKET_TOKEN_SAFETY_MARGIN_SECS", 120));
        config.request_timeout =
            Duration::from_secs(parse_env("AGRIMARKET_REQUEST_TIMEOUT_SECS", 30));
        config.hub_keepalive = Duration::from_secs(parse_env("AGRIMARKET_HUB_KEEPALIVE_SECS", 15));

        let defaults = RetryPolicy::default();
        config.reconnect = RetryPolicy {
            max_attempts: parse_env("AGRIMARKET_RECONNECT_MAX_ATTEMPTS", defaults.max_attempts),
            initial_delay: Duration::from_millis(parse_env(
                "AGRIMARKET_RECONNECT_INITIAL_DELAY_MS",
                1_000,
            )),
            max_delay: Duration::from_millis(parse_env(
                "AGRIMARKET_RECONNECT_MAX_DELAY_MS",
                30_000,
            )),
            multiplier: defaults.multiplier,
        };

        Ok(config)
    }
}

fn parse_url(raw: &str) -> Result<Url, ClientError> {
    // A trailing slash keeps `Url::join` from dropping the last segment.
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|e| ClientError::Config(format!("{raw}: {e}")))
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

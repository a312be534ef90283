// Runtime settings for one upload run. Everything the HTTP client and the
// retry loop need is carried here and passed in explicitly, so tests can
// point the client at a mock server and shorten the retry delay.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const ZENODO_API_URL: &str = "https://zenodo.org/api/deposit/depositions";
pub const ZENODO_SANDBOX_API_URL: &str = "https://sandbox.zenodo.org/api/deposit/depositions";

/// Pause between two upload attempts of the same file.
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

const API_URL_VAR: &str = "ZENODO_API_URL";
const TOKEN_VAR: &str = "ZENODO_ACCESS_TOKEN";
const TOKEN_FILE: &str = ".zenodo_token";

#[derive(Clone, Debug)]
pub struct Config {
    /// Depositions collection endpoint, without trailing slash.
    pub api_url: String,
    pub access_token: String,
    pub retry_delay: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    /// `None` disables the client's request timeout.
    pub request_timeout: Option<Duration>,
}

impl Config {
    pub fn new(api_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        let api_url: String = api_url.into();
        Config {
            api_url: api_url.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            retry_delay: RETRY_DELAY,
            max_attempts: None,
            request_timeout: None,
        }
    }

    /// Build the configuration from the environment.
    ///
    /// `ZENODO_API_URL` overrides the endpoint; otherwise the public or
    /// sandbox Zenodo API is used. The token comes from
    /// `ZENODO_ACCESS_TOKEN` or, failing that, from `~/.zenodo_token`.
    pub fn from_env(sandbox: bool) -> Result<Self> {
        // A missing .env file is fine; real environment variables still apply.
        dotenvy::dotenv().ok();

        let api_url = std::env::var(API_URL_VAR).unwrap_or_else(|_| {
            if sandbox {
                ZENODO_SANDBOX_API_URL.into()
            } else {
                ZENODO_API_URL.into()
            }
        });

        let access_token = match std::env::var(TOKEN_VAR) {
            Ok(token) if !token.trim().is_empty() => token.trim().to_string(),
            _ => load_token().with_context(|| {
                format!("Missing access token. Set {TOKEN_VAR} or write it to ~/{TOKEN_FILE}")
            })?,
        };

        Ok(Config::new(api_url, access_token))
    }
}

fn token_path() -> PathBuf {
    let dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    dir.join(TOKEN_FILE)
}

/// Load the token from the user's home directory file.
fn load_token() -> Result<String> {
    let path = token_path();
    let data = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let token = data.trim();
    anyhow::ensure!(!token.is_empty(), "{} is empty", path.display());
    Ok(token.to_string())
}

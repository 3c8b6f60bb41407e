//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Tokens are never read from the TOML; they live in the credential file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use endpoint_registry::{EndpointRegistry, EndpointRule};
use serde::Deserialize;
use session_auth::DEFAULT_SIGN_IN_PATH;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    /// Extra endpoint rules, checked before the built-in table
    #[serde(default)]
    pub endpoints: Vec<EndpointRule>,
}

/// Backend connection settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Where to send the user when the session cannot be renewed.
    /// Defaults to `<base_url>/sign-in`.
    #[serde(default)]
    pub sign_in_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "default_credentials_path")]
    pub path: PathBuf,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            path: default_credentials_path(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_min_interval")]
    pub min_interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: default_min_interval(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_min_interval() -> u64 {
    session_auth::MIN_REFRESH_INTERVAL.as_secs()
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// `API_BASE_URL` overrides `api.base_url`; `CREDENTIALS_PATH` overrides
    /// `credentials.path`.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(url) = std::env::var("API_BASE_URL") {
            config.api.base_url = url;
        }
        if let Ok(p) = std::env::var("CREDENTIALS_PATH") {
            config.credentials.path = PathBuf::from(p);
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !is_http_url(&self.api.base_url) {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if let Some(url) = &self.api.sign_in_url
            && !is_http_url(url)
        {
            return Err(common::Error::Config(format!(
                "sign_in_url must start with http:// or https://, got: {url}"
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        for rule in &self.endpoints {
            rule.validate()?;
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn min_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh.min_interval_secs)
    }

    pub fn sign_in_url(&self) -> String {
        match &self.api.sign_in_url {
            Some(url) => url.clone(),
            None => format!(
                "{}{DEFAULT_SIGN_IN_PATH}",
                self.api.base_url.trim_end_matches('/')
            ),
        }
    }

    /// Built-in endpoint table with the configured rules in front.
    pub fn registry(&self) -> common::Result<EndpointRegistry> {
        EndpointRegistry::with_overrides(self.endpoints.clone())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("api-cli.toml")
    }
}

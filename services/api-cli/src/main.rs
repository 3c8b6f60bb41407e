//! API CLI
//!
//! Command-line consumer of the authenticated API client:
//! 1. Loads configuration and the credential file
//! 2. Sends requests through `ApiClient` (fallbacks, single-flight refresh)
//! 3. Prints response bodies as JSON on stdout; logs go to stderr

mod config;
mod session;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use api_client::{ApiClient, ApiRequest, ClientSettings, ReqwestTransport};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use reqwest::Method;
use serde_json::{Value, json};
use session_auth::{CredentialStore, FileCredentialStore};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::session::TerminalSession;

#[derive(Parser)]
#[command(name = "api-cli")]
#[command(version, about = "Authenticated API client", long_about = None)]
struct Cli {
    /// Config file (overrides CONFIG_PATH)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print client metrics in Prometheus format to stderr on exit
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a freshly issued token pair
    Login {
        #[arg(long, env = "API_ACCESS_TOKEN", hide_env_values = true)]
        access_token: String,

        #[arg(long, env = "API_REFRESH_TOKEN", hide_env_values = true)]
        refresh_token: String,
    },

    /// Forget stored credentials
    Logout,

    /// Show whether credentials are stored (tokens are never printed)
    Status,

    /// Show how a path is classified
    Classify { path: String },

    /// Send a request and print the response body
    Request {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE)
        method: String,

        /// Path relative to the base URL
        path: String,

        /// JSON request body
        #[arg(long)]
        data: Option<String>,

        /// Query parameter as key=value (repeatable)
        #[arg(long = "query", value_parser = parse_query)]
        query: Vec<(String, String)>,
    },
}

fn parse_query(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got: {raw}")),
    }
}

fn parse_method(raw: &str) -> Result<Method> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method: {raw}"))
}

/// Build the request for the `request` command.
fn build_request(
    method: &str,
    path: &str,
    data: Option<&str>,
    query: Vec<(String, String)>,
) -> Result<ApiRequest> {
    let mut request = ApiRequest::new(parse_method(method)?, path);
    if let Some(data) = data {
        let body: Value = serde_json::from_str(data).context("--data is not valid JSON")?;
        request = request.with_body(body);
    }
    for (key, value) in query {
        request = request.with_query(key, value);
    }
    Ok(request)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let prometheus = if cli.metrics {
        Some(
            PrometheusBuilder::new()
                .install_recorder()
                .context("failed to install metrics recorder")?,
        )
    } else {
        None
    };

    let config_path = Config::resolve_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    info!(
        path = %config_path.display(),
        base_url = %config.api.base_url,
        endpoints = config.endpoints.len(),
        "configuration loaded"
    );

    let result = run(cli.command, &config).await;

    if let Some(handle) = prometheus {
        eprint!("{}", handle.render());
    }
    result
}

async fn run(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Login {
            access_token,
            refresh_token,
        } => {
            let client = build_client(config, load_store(config).await?)?;
            client.establish_session(access_token, refresh_token).await?;
            eprintln!("Signed in.");
        }
        Commands::Logout => {
            let client = build_client(config, load_store(config).await?)?;
            client.end_session().await?;
            eprintln!("Signed out.");
        }
        Commands::Status => {
            let store = load_store(config).await?;
            print_json(&status(store.as_ref(), store.path()).await)?;
        }
        Commands::Classify { path } => {
            let registry = config.registry().context("invalid endpoint rules")?;
            print_json(&serde_json::to_value(registry.classify(&path))?)?;
        }
        Commands::Request {
            method,
            path,
            data,
            query,
        } => {
            let request = build_request(&method, &path, data.as_deref(), query)?;
            let client = build_client(config, load_store(config).await?)?;
            match client.send(request).await {
                Ok(response) => print_json(&response.body)?,
                Err(e) => {
                    let detail = e.detail().map(|d| format!(": {d}")).unwrap_or_default();
                    anyhow::bail!("{e}{detail}");
                }
            }
        }
    }
    Ok(())
}

async fn load_store(config: &Config) -> Result<Arc<FileCredentialStore>> {
    let path = &config.credentials.path;
    let store = FileCredentialStore::load(path.clone())
        .await
        .with_context(|| format!("failed to load credentials from {}", path.display()))?;
    Ok(Arc::new(store))
}

fn build_client(config: &Config, store: Arc<FileCredentialStore>) -> Result<ApiClient> {
    let http = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let transport = ReqwestTransport::new(http, config.api.base_url.clone(), config.timeout());
    let settings = ClientSettings {
        registry: config.registry().context("invalid endpoint rules")?,
        min_refresh_interval: config.min_refresh_interval(),
        sign_in_url: config.sign_in_url(),
    };
    Ok(ApiClient::new(
        Arc::new(transport),
        store,
        Arc::new(TerminalSession),
        settings,
    ))
}

/// Credential summary; token values are never included.
async fn status(store: &dyn CredentialStore, path: &Path) -> Value {
    let last_refresh_at = store
        .last_refresh_at()
        .await
        .and_then(|ms| chrono::DateTime::from_timestamp_millis(ms as i64))
        .map(|t| t.to_rfc3339());
    json!({
        "credentials_path": path.display().to_string(),
        "access_token": store.access_token().await.is_some(),
        "refresh_token": store.refresh_token().await.is_some(),
        "last_refresh_at": last_refresh_at,
    })
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

//! Configuration management for yupp-bridge.
//!
//! Configuration can be set via environment variables:
//! - `HOST` - Optional. Server host. Defaults to `0.0.0.0`.
//! - `PORT` - Optional. Server port. Defaults to `8001`.
//! - `ACCOUNTS_FILE` - Optional. Upstream account list. Defaults to `yupp.json`.
//! - `CLIENT_KEYS_FILE` - Optional. Accepted client API keys. Defaults to `client_api_keys.json`.
//! - `MODELS_FILE` - Optional. Model registry. Defaults to `model.json`.
//! - `UPSTREAM_BASE_URL` - Optional. Defaults to `https://yupp.ai`.
//! - `UPSTREAM_CONNECT_TIMEOUT_SECS` - Optional. Defaults to `30`.
//! - `MAX_ACCOUNT_ERRORS` - Optional. Errors before an account cools down. Defaults to `3`.
//! - `ACCOUNT_COOLDOWN_SECS` - Optional. Cooldown length. Defaults to `300`.
//! - `DEBUG_MODE` - Optional. Initial chunk-tracing switch. Defaults to `false`.
//! - `BOOTSTRAP_FILES` - Optional. Write placeholder files when missing. Defaults to `true`.
//!
//! The three data files are snapshots read once at startup. A missing or
//! malformed file is logged and treated as empty.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::account_pool::PoolConfig;
use crate::models::ModelRecord;

pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://yupp.ai";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Outbound connection settings.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Scheme + host of the upstream, without trailing slash.
    pub base_url: String,

    /// Connect timeout for every outbound call. Streaming bodies have no
    /// total timeout.
    pub connect_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// JSON array of `{ "token": ... }` objects
    pub accounts_file: PathBuf,

    /// JSON array of accepted client API keys
    pub client_keys_file: PathBuf,

    /// JSON array of model registry records
    pub models_file: PathBuf,

    pub upstream: UpstreamConfig,

    pub pool: PoolConfig,

    /// Initial state of the runtime chunk-tracing switch
    pub debug_mode: bool,

    /// Write placeholder data files when they are missing
    pub bootstrap_files: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric or boolean variable
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env_parse("PORT", 8001u16)?;

        let accounts_file = env_path("ACCOUNTS_FILE", "yupp.json");
        let client_keys_file = env_path("CLIENT_KEYS_FILE", "client_api_keys.json");
        let models_file = env_path("MODELS_FILE", "model.json");

        let base_url = std::env::var("UPSTREAM_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_UPSTREAM_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let connect_timeout =
            Duration::from_secs(env_parse("UPSTREAM_CONNECT_TIMEOUT_SECS", 30u64)?);

        let pool = PoolConfig {
            max_errors: env_parse("MAX_ACCOUNT_ERRORS", PoolConfig::default().max_errors)?,
            cooldown: Duration::from_secs(env_parse("ACCOUNT_COOLDOWN_SECS", 300u64)?),
        };

        let debug_mode = env_flag("DEBUG_MODE", false)?;
        let bootstrap_files = env_flag("BOOTSTRAP_FILES", true)?;

        Ok(Self {
            host,
            port,
            accounts_file,
            client_keys_file,
            models_file,
            upstream: UpstreamConfig {
                base_url,
                connect_timeout,
            },
            pool,
            debug_mode,
            bootstrap_files,
        })
    }

    /// Create a config with default values and all data files under `dir`
    /// (useful for testing).
    pub fn new(dir: &Path) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8001,
            accounts_file: dir.join("yupp.json"),
            client_keys_file: dir.join("client_api_keys.json"),
            models_file: dir.join("model.json"),
            upstream: UpstreamConfig::default(),
            pool: PoolConfig::default(),
            debug_mode: false,
            bootstrap_files: true,
        }
    }

    /// Write placeholder data files for any that are missing.
    ///
    /// Returns the paths that were created. Existing files are never touched.
    pub fn bootstrap_missing_files(&self) -> Result<Vec<PathBuf>, ConfigError> {
        let mut created = Vec::new();

        if !self.accounts_file.exists() {
            write_json(
                &self.accounts_file,
                &serde_json::json!([{ "token": "your_yupp_session_token_here" }]),
            )?;
            tracing::warn!(
                path = %self.accounts_file.display(),
                "Accounts file not found, created a placeholder. Replace it with real session tokens."
            );
            created.push(self.accounts_file.clone());
        }

        if !self.client_keys_file.exists() {
            let key = format!("sk-dummy-{}", uuid::Uuid::new_v4().simple());
            write_json(&self.client_keys_file, &serde_json::json!([key]))?;
            tracing::warn!(
                path = %self.client_keys_file.display(),
                key = %key,
                "Client key file not found, created one with a generated key"
            );
            created.push(self.client_keys_file.clone());
        }

        if !self.models_file.exists() {
            write_json(
                &self.models_file,
                &serde_json::json!([{
                    "id": "claude-3.7-sonnet:thinking",
                    "name": "anthropic/claude-3.7-sonnet:thinking<>OPR",
                    "label": "Claude 3.7 Sonnet (Thinking) (OpenRouter)",
                    "publisher": "Anthropic",
                    "family": "Claude"
                }]),
            )?;
            tracing::warn!(
                path = %self.models_file.display(),
                "Model registry not found, created a placeholder"
            );
            created.push(self.models_file.clone());
        }

        Ok(created)
    }
}

fn env_path(name: &str, default: &str) -> PathBuf {
    std::env::var(name)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

fn env_parse<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

fn env_flag(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => parse_flag(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_flag(name: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("expected a boolean, got '{}'", other),
        )),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Data files
// ─────────────────────────────────────────────────────────────────────────────

fn read_json(path: &Path) -> Result<Option<Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

fn write_json(path: &Path, value: &Value) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
    }
    let contents = serde_json::to_string_pretty(value).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, contents).map_err(io_err)?;
    std::fs::rename(&tmp_path, path).map_err(io_err)?;
    Ok(())
}

/// Read a data file that must hold a JSON array. Every failure is logged and
/// yields an empty list.
fn read_json_array(path: &Path, what: &str) -> Vec<Value> {
    match read_json(path) {
        Ok(Some(Value::Array(items))) => items,
        Ok(Some(_)) => {
            tracing::warn!(path = %path.display(), "{} file should contain a JSON array", what);
            Vec::new()
        }
        Ok(None) => {
            tracing::error!(path = %path.display(), "{} file not found", what);
            Vec::new()
        }
        Err(e) => {
            tracing::error!("Error loading {} file: {}", what, e);
            Vec::new()
        }
    }
}

/// Load upstream session tokens. Entries without a non-empty `token` are skipped.
pub fn load_account_tokens(path: &Path) -> Vec<String> {
    let tokens: Vec<String> = read_json_array(path, "Accounts")
        .iter()
        .filter_map(|acc| acc.get("token").and_then(Value::as_str))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect();
    tracing::info!("Loaded {} upstream accounts", tokens.len());
    tokens
}

/// Load accepted client API keys.
pub fn load_client_keys(path: &Path) -> Vec<String> {
    let keys: Vec<String> = read_json_array(path, "Client key")
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s),
            _ => None,
        })
        .collect();
    tracing::info!("Loaded {} client API keys", keys.len());
    keys
}

/// Load the model registry records.
pub fn load_models(path: &Path) -> Vec<ModelRecord> {
    let models: Vec<ModelRecord> = read_json_array(path, "Model registry")
        .into_iter()
        .filter_map(|v| match serde_json::from_value(v) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Skipping malformed model record: {}", e);
                None
            }
        })
        .collect();
    tracing::info!("Loaded {} models", models.len());
    models
}

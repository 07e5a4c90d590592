//! Configuration loading
//!
//! A [`Config`] is built once at startup and handed to every component that
//! needs it. Resolution order, highest priority first:
//! 1. Command-line flag or environment variable (both arrive as [`ConfigOverrides`])
//! 2. TOML config file
//! 3. Compiled default
//!
//! The token secret has one more fallback after TOML: a mounted secret
//! file (`/run/secrets/jwt_secret` unless overridden).

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_DATABASE_PATH: &str = "./data/bookcheck.db";
pub const DEFAULT_UPLOADS_DIR: &str = "./uploads";
pub const DEFAULT_SECRET_FILE: &str = "/run/secrets/jwt_secret";
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Resolved runtime configuration
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    pub uploads_dir: PathBuf,
    pub token_secret: String,
    pub token_ttl_secs: i64,
    /// Free-form deployment label reported by the health endpoint
    pub environment: String,
    /// Base for absolute asset URLs; derived from the request when unset
    pub public_base_url: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_path", &self.database_path)
            .field("uploads_dir", &self.uploads_dir)
            .field("token_secret", &"<redacted>")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("environment", &self.environment)
            .field("public_base_url", &self.public_base_url)
            .finish()
    }
}

impl Config {
    /// Config suitable for tests: in-process secret, everything else default
    pub fn for_testing(uploads_dir: impl Into<PathBuf>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            database_path: PathBuf::from(":memory:"),
            uploads_dir: uploads_dir.into(),
            token_secret: "test-secret".to_string(),
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            environment: "test".to_string(),
            public_base_url: None,
        }
    }

    /// Merge overrides, TOML file and defaults into a config
    pub fn resolve(overrides: ConfigOverrides, file: TomlConfig) -> Result<Self> {
        let secret_file = overrides
            .secret_file
            .clone()
            .or(file.secret_file.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SECRET_FILE));

        let token_secret = match overrides
            .token_secret
            .or(file.token_secret)
            .filter(|s| !s.trim().is_empty())
        {
            Some(secret) => secret,
            None => read_secret_file(&secret_file)?,
        };

        let token_ttl_secs = overrides
            .token_ttl_secs
            .or(file.token_ttl_secs)
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        if token_ttl_secs <= 0 {
            return Err(Error::Config(format!(
                "token_ttl_secs must be positive, got {}",
                token_ttl_secs
            )));
        }

        Ok(Self {
            host: overrides
                .host
                .or(file.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: overrides.port.or(file.port).unwrap_or(DEFAULT_PORT),
            database_path: overrides
                .database_path
                .or(file.database_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH)),
            uploads_dir: overrides
                .uploads_dir
                .or(file.uploads_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOADS_DIR)),
            token_secret,
            token_ttl_secs,
            environment: overrides
                .environment
                .or(file.environment)
                .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()),
            public_base_url: overrides
                .public_base_url
                .or(file.public_base_url)
                .map(|u| u.trim_end_matches('/').to_string()),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database_path: Option<PathBuf>,
    pub uploads_dir: Option<PathBuf>,
    pub token_secret: Option<String>,
    pub secret_file: Option<PathBuf>,
    pub token_ttl_secs: Option<i64>,
    pub environment: Option<String>,
    pub public_base_url: Option<String>,
}

/// On-disk TOML configuration; every key is optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database_path: Option<PathBuf>,
    pub uploads_dir: Option<PathBuf>,
    pub token_secret: Option<String>,
    pub secret_file: Option<PathBuf>,
    pub token_ttl_secs: Option<i64>,
    pub environment: Option<String>,
    pub public_base_url: Option<String>,
}

impl TomlConfig {
    /// Load a TOML config file
    ///
    /// `None` yields an empty config. A named file that is missing is
    /// logged and treated as empty; a file that exists but does not parse
    /// is a hard error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config = toml::from_str(&content).map_err(|e| {
                    Error::Config(format!("Failed to parse {}: {}", path.display(), e))
                })?;
                info!("Loaded config file {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(Error::Config(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

/// Read a mounted secret, trimming surrounding whitespace
pub fn read_secret_file(path: &Path) -> Result<String> {
    let secret = std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            Error::Config(format!(
                "No token secret configured and {} is unreadable: {}",
                path.display(),
                e
            ))
        })?;

    if secret.is_empty() {
        return Err(Error::Config(format!("Secret file {} is empty", path.display())));
    }
    info!("Loaded token secret from {}", path.display());
    Ok(secret)
}

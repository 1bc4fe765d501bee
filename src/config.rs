//! Configuration for boardsync.
//!
//! Settings are read from `boardsync.toml` and layered:
//! file → environment → CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [remote]
//! api_base = "http://localhost:3000"
//! request_timeout_secs = 10
//!
//! [refresh]
//! interval_secs = 30
//!
//! [cache]
//! path = "/home/me/.local/share/boardsync/cache.db"
//!
//! [logging]
//! debug_http = false
//! ```
//!
//! # Environment
//!
//! - `BOARDSYNC_API_BASE` overrides `remote.api_base`
//! - `BOARDSYNC_CACHE_PATH` overrides `cache.path`
//! - `BOARDSYNC_REFRESH_SECS` overrides `refresh.interval_secs`

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::store::scheduler::MAX_INTERVAL;

pub const CONFIG_FILE_NAME: &str = "boardsync.toml";
pub const ENV_API_BASE: &str = "BOARDSYNC_API_BASE";
pub const ENV_CACHE_PATH: &str = "BOARDSYNC_CACHE_PATH";
pub const ENV_REFRESH_SECS: &str = "BOARDSYNC_REFRESH_SECS";
/// Upper bound on `refresh.interval_secs`, matching the scheduler's limit.
pub const MAX_REFRESH_SECS: u64 = MAX_INTERVAL.as_secs();

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSection {
    /// Base URL every API path is appended to
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Per-request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_base() -> String {
    "http://localhost:3000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshSection {
    /// Polling interval of the background refresh loops
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    30
}

impl Default for RefreshSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheSection {
    /// SQLite cache file. Defaults to the platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingSection {
    /// Log every HTTP exchange at debug level
    #[serde(default)]
    pub debug_http: bool,
}

/// The complete boardsync.toml structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SyncToml {
    #[serde(default)]
    pub remote: RemoteSection,
    #[serde(default)]
    pub refresh: RefreshSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl SyncToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse boardsync.toml")
    }

    /// Returns the default configuration if the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize boardsync.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

/// Default location of `boardsync.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("boardsync")
        .join(CONFIG_FILE_NAME)
}

/// Default location of the SQLite cache.
pub fn default_cache_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("boardsync")
        .join("cache.db")
}

/// Values taken from `BOARDSYNC_*` environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub api_base: Option<String>,
    pub cache_path: Option<PathBuf>,
    pub refresh_secs: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            api_base: var(ENV_API_BASE),
            cache_path: var(ENV_CACHE_PATH).map(PathBuf::from),
            refresh_secs: var(ENV_REFRESH_SECS),
        }
    }
}

/// Values given as command-line flags.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_base: Option<String>,
    pub cache_path: Option<PathBuf>,
    pub refresh_secs: Option<u64>,
}

/// Fully resolved settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    pub request_timeout: Duration,
    pub refresh_interval: Duration,
    pub cache_path: PathBuf,
    pub debug_http: bool,
}

impl Config {
    /// Merges file, environment and CLI values (later wins) and validates
    /// the result.
    pub fn resolve(
        file: &SyncToml,
        env: &EnvOverrides,
        cli: &CliOverrides,
    ) -> Result<Self, ConfigError> {
        let api_base = cli
            .api_base
            .clone()
            .or_else(|| env.api_base.clone())
            .unwrap_or_else(|| file.remote.api_base.clone());
        validate_api_base(&api_base)?;

        let env_refresh = env
            .refresh_secs
            .as_deref()
            .map(|raw| {
                raw.trim()
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidRefreshInterval {
                        value: raw.to_string(),
                        max: MAX_REFRESH_SECS,
                    })
            })
            .transpose()?;
        let interval_secs = cli
            .refresh_secs
            .or(env_refresh)
            .unwrap_or(file.refresh.interval_secs);
        if !(1..=MAX_REFRESH_SECS).contains(&interval_secs) {
            return Err(ConfigError::InvalidRefreshInterval {
                value: interval_secs.to_string(),
                max: MAX_REFRESH_SECS,
            });
        }

        let cache_path = cli
            .cache_path
            .clone()
            .or_else(|| env.cache_path.clone())
            .or_else(|| file.cache.path.clone())
            .unwrap_or_else(default_cache_path);

        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(file.remote.request_timeout_secs.max(1)),
            refresh_interval: Duration::from_secs(interval_secs),
            cache_path,
            debug_http: file.logging.debug_http,
        })
    }

    /// Reads `path` (if present) and the process environment, then applies
    /// `cli`.
    pub fn load(path: &Path, cli: &CliOverrides) -> Result<Self> {
        let file = SyncToml::load_or_default(path)?;
        Ok(Self::resolve(&file, &EnvOverrides::from_env(), cli)?)
    }
}

fn validate_api_base(value: &str) -> Result<(), ConfigError> {
    let invalid = |message: String| ConfigError::InvalidApiBase {
        value: value.to_string(),
        message,
    };
    let url = reqwest::Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme '{}'", other))),
    }
}

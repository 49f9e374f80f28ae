//! Configuration loading for the vidlens service
//!
//! Settings are resolved per field with the priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing TOML file is not an error: a warning is logged and defaults apply.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const ENV_CONFIG: &str = "VIDLENS_CONFIG";
pub const ENV_BIND: &str = "VIDLENS_BIND";
pub const ENV_PORT: &str = "VIDLENS_PORT";
pub const ENV_API_KEY: &str = "VIDLENS_API_KEY";
pub const ENV_API_BASE_URL: &str = "VIDLENS_API_BASE_URL";

pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5780;
pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Upper bound accepted for any per-call result limit
pub const MAX_RESULT_LIMIT: usize = 50;

/// Contents of the TOML configuration file
///
/// Every field is optional; unset fields fall through to compiled defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub bind_address: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub search_limit: Option<usize>,
    #[serde(default)]
    pub channel_video_limit: Option<usize>,
    #[serde(default)]
    pub tag_limit: Option<usize>,
    #[serde(default)]
    pub requests_per_second: Option<u32>,
    #[serde(default)]
    pub http_timeout_secs: Option<u64>,
    #[serde(default)]
    pub mailbox_capacity: Option<usize>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub api_key: Option<String>,
    pub api_base_url: Option<String>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub bind_address: String,
    pub port: u16,
    /// YouTube Data API key; `None` leaves the service running in degraded mode
    pub api_key: Option<String>,
    pub api_base_url: String,
    pub search_limit: usize,
    pub channel_video_limit: usize,
    pub tag_limit: usize,
    /// Outbound API throttle; 0 disables throttling
    pub requests_per_second: u32,
    pub http_timeout_secs: u64,
    /// Bounded mailbox size for every worker
    pub mailbox_capacity: usize,
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            api_key: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            search_limit: 10,
            channel_video_limit: 10,
            tag_limit: 10,
            requests_per_second: 5,
            http_timeout_secs: 30,
            mailbox_capacity: 64,
            log_level: default_log_level(),
        }
    }
}

impl ServiceConfig {
    /// Resolve configuration from CLI overrides, environment, TOML and defaults
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self> {
        let toml_path = overrides
            .config_path
            .clone()
            .or_else(|| std::env::var(ENV_CONFIG).ok().map(PathBuf::from))
            .or_else(default_config_path);

        let toml_config = match toml_path {
            Some(path) => load_toml_config(&path)?.unwrap_or_default(),
            None => TomlConfig::default(),
        };

        Self::from_layers(overrides, &toml_config)
    }

    /// Merge CLI overrides, environment variables and a parsed TOML file
    pub fn from_layers(overrides: &ConfigOverrides, toml_config: &TomlConfig) -> Result<Self> {
        let defaults = Self::default();

        let bind_address = overrides
            .bind_address
            .clone()
            .or_else(|| env_value(ENV_BIND))
            .or_else(|| toml_config.bind_address.clone())
            .unwrap_or(defaults.bind_address);

        let port = match overrides.port {
            Some(port) => port,
            None => match env_value(ENV_PORT) {
                Some(raw) => raw
                    .parse::<u16>()
                    .map_err(|e| Error::Config(format!("Invalid {}='{}': {}", ENV_PORT, raw, e)))?,
                None => toml_config.port.unwrap_or(defaults.port),
            },
        };

        let api_key = overrides
            .api_key
            .clone()
            .or_else(|| env_value(ENV_API_KEY))
            .or_else(|| toml_config.api_key.clone())
            .filter(|key| !key.trim().is_empty());

        let api_base_url = overrides
            .api_base_url
            .clone()
            .or_else(|| env_value(ENV_API_BASE_URL))
            .or_else(|| toml_config.api_base_url.clone())
            .unwrap_or(defaults.api_base_url);

        let config = Self {
            bind_address,
            port,
            api_key,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            search_limit: toml_config.search_limit.unwrap_or(defaults.search_limit),
            channel_video_limit: toml_config
                .channel_video_limit
                .unwrap_or(defaults.channel_video_limit),
            tag_limit: toml_config.tag_limit.unwrap_or(defaults.tag_limit),
            requests_per_second: toml_config
                .requests_per_second
                .unwrap_or(defaults.requests_per_second),
            http_timeout_secs: toml_config
                .http_timeout_secs
                .unwrap_or(defaults.http_timeout_secs),
            mailbox_capacity: toml_config
                .mailbox_capacity
                .unwrap_or(defaults.mailbox_capacity),
            log_level: toml_config.logging.level.clone(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the worker tree cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.mailbox_capacity == 0 {
            return Err(Error::Config("mailbox_capacity must be at least 1".to_string()));
        }

        for (name, value) in [
            ("search_limit", self.search_limit),
            ("channel_video_limit", self.channel_video_limit),
            ("tag_limit", self.tag_limit),
        ] {
            if value == 0 || value > MAX_RESULT_LIMIT {
                return Err(Error::Config(format!(
                    "{} must be between 1 and {} (got {})",
                    name, MAX_RESULT_LIMIT, value
                )));
            }
        }

        if self.http_timeout_secs == 0 {
            return Err(Error::Config("http_timeout_secs must be at least 1".to_string()));
        }

        Ok(())
    }
}

/// Load and parse a TOML config file
///
/// Returns `Ok(None)` when the file does not exist.
pub fn load_toml_config(path: &Path) -> Result<Option<TomlConfig>> {
    if !path.exists() {
        warn!("Config file not found at {}, using defaults", path.display());
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML {} failed: {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(Some(config))
}

/// Platform config location: `<config_dir>/vidlens/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("vidlens").join("config.toml"))
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

//! Application configuration: defaults, optional TOML file, `BASKETRY_*`
//! environment overrides, then programmatic overrides, validated on load.
//!
//! Window lengths are deliberately absent here; each pattern computation owns
//! its window (see `patterns`). Config tunes storage, logging, and refresh
//! cadence only.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schedule::CadenceConfig;

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub refresh: CadenceConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

/// Programmatic overrides, applied last (CLI flags land here).
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://basketry.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            refresh: CadenceConfig::default(),
        }
    }
}

/// TOML shape of the config file; every field optional, patched onto defaults.
#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    logging: Option<LoggingPatch>,
    refresh: Option<RefreshPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct RefreshPatch {
    preference_secs: Option<u64>,
    session_context_secs: Option<u64>,
    reorder_secs: Option<u64>,
    association_secs: Option<u64>,
    behavior_secs: Option<u64>,
    job_timeout_secs: Option<u64>,
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("basketry.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(refresh) = patch.refresh {
            if let Some(secs) = refresh.preference_secs {
                self.refresh.preference_secs = secs;
            }
            if let Some(secs) = refresh.session_context_secs {
                self.refresh.session_context_secs = secs;
            }
            if let Some(secs) = refresh.reorder_secs {
                self.refresh.reorder_secs = secs;
            }
            if let Some(secs) = refresh.association_secs {
                self.refresh.association_secs = secs;
            }
            if let Some(secs) = refresh.behavior_secs {
                self.refresh.behavior_secs = secs;
            }
            if let Some(secs) = refresh.job_timeout_secs {
                self.refresh.job_timeout_secs = secs;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("BASKETRY_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("BASKETRY_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("BASKETRY_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("BASKETRY_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("BASKETRY_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("BASKETRY_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("BASKETRY_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }

        if let Some(value) = read_env("BASKETRY_REFRESH_PREFERENCE_SECS") {
            self.refresh.preference_secs = parse_u64("BASKETRY_REFRESH_PREFERENCE_SECS", &value)?;
        }
        if let Some(value) = read_env("BASKETRY_REFRESH_SESSION_CONTEXT_SECS") {
            self.refresh.session_context_secs =
                parse_u64("BASKETRY_REFRESH_SESSION_CONTEXT_SECS", &value)?;
        }
        if let Some(value) = read_env("BASKETRY_REFRESH_REORDER_SECS") {
            self.refresh.reorder_secs = parse_u64("BASKETRY_REFRESH_REORDER_SECS", &value)?;
        }
        if let Some(value) = read_env("BASKETRY_REFRESH_ASSOCIATION_SECS") {
            self.refresh.association_secs =
                parse_u64("BASKETRY_REFRESH_ASSOCIATION_SECS", &value)?;
        }
        if let Some(value) = read_env("BASKETRY_REFRESH_BEHAVIOR_SECS") {
            self.refresh.behavior_secs = parse_u64("BASKETRY_REFRESH_BEHAVIOR_SECS", &value)?;
        }
        if let Some(value) = read_env("BASKETRY_REFRESH_JOB_TIMEOUT_SECS") {
            self.refresh.job_timeout_secs =
                parse_u64("BASKETRY_REFRESH_JOB_TIMEOUT_SECS", &value)?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.database_url {
            self.database.url = url;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database url must not be empty".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database max_connections must be greater than zero".to_string(),
            ));
        }
        self.refresh.validate().map_err(ConfigError::Validation)?;
        Ok(())
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    if let Some(value) = read_env("BASKETRY_CONFIG") {
        let path = PathBuf::from(value);
        return path.exists().then_some(path);
    }
    let default = PathBuf::from("basketry.toml");
    default.exists().then_some(default)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

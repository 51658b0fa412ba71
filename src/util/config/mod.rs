//! tickwork configuration system
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. CLI arguments
//! 2. Environment variables (TICKWORK_LOG)
//! 3. Explicit file (--config)
//! 4. User-level (~/.config/tickwork/config.toml)
//! 5. Default values
//! ```
//!
//! # Example
//!
//! ```toml
//! [scheduler]
//! tick_interval_ms = 16
//! thread_park_timeout_ms = 20
//!
//! [log]
//! level = "debug"
//! ```
//!
//! # Usage
//!
//! ```rust
//! use tickwork::util::config::RuntimeConfig;
//!
//! let config: RuntimeConfig = "[log]\nlevel = \"warn\"".parse().unwrap();
//! assert_eq!(config.scheduler.tick_interval_ms, 0);
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::runtime::scheduler::SchedulerConfig;
use crate::util::logger::LogLevel;

/// Environment variable overriding the log level.
pub const LOG_ENV: &str = "TICKWORK_LOG";

/// Runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Scheduler settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Minimum level
    #[serde(default)]
    pub level: LogLevel,
    /// Coloured output
    #[serde(default)]
    pub ansi: bool,
}

impl FromStr for RuntimeConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s).map_err(ConfigError::Parse)
    }
}

impl RuntimeConfig {
    /// Apply environment overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_log_override(std::env::var(LOG_ENV).ok().as_deref())
    }

    fn apply_log_override(
        &mut self,
        value: Option<&str>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            self.log.level = value.parse().map_err(|e: crate::util::logger::ParseLevelError| {
                ConfigError::Env {
                    var: LOG_ENV,
                    message: e.to_string(),
                }
            })?;
        }
        Ok(())
    }

    /// Serialize as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

/// Get the user config directory
pub fn get_config_dir() -> Option<PathBuf> {
    // Try XDG config directory on Unix
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config).join("tickwork"));
    }

    // Fallback to ~/.config/tickwork
    if let Ok(home) = std::env::var("HOME") {
        return Some(PathBuf::from(home).join(".config").join("tickwork"));
    }

    // On Windows, try %APPDATA%
    if let Ok(appdata) = std::env::var("APPDATA") {
        return Some(PathBuf::from(appdata).join("tickwork"));
    }

    None
}

/// Get the user config file path (~/.config/tickwork/config.toml)
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.toml"))
}

/// Load configuration from an explicit file
pub fn load_config(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "configuration loaded");
    content.parse()
}

/// Load user-level configuration
/// Returns default config if file doesn't exist
pub fn load_user_config() -> Result<RuntimeConfig, ConfigError> {
    match get_config_path() {
        Some(path) if path.exists() => load_config(&path),
        _ => Ok(RuntimeConfig::default()),
    }
}

/// Resolve the effective configuration: explicit file or user file, then
/// environment overrides.
pub fn resolve(explicit: Option<&Path>) -> Result<RuntimeConfig, ConfigError> {
    let mut config = match explicit {
        Some(path) => load_config(path)?,
        None => load_user_config()?,
    };
    config.apply_env()?;
    Ok(config)
}

/// Save configuration to a file, creating parent directories
pub fn save_config(
    config: &RuntimeConfig,
    path: &Path,
) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
    }
    fs::write(path, config.to_toml()?).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config parse error: {0}")]
    Parse(#[source] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[source] toml::ser::Error),
    #[error("invalid {var}: {message}")]
    Env { var: &'static str, message: String },
}

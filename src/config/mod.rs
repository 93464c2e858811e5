//! Configuration management for gator.
//!
//! Configuration is read from `~/.config/gator/config.toml` (or the path given
//! with `--config`). If the file doesn't exist, a default configuration with
//! comments is created. `login` and `register` write the current user back.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 3600;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database location; defaults to `<data_dir>/gator/gator.db`.
    pub db_path: Option<PathBuf>,
    /// Name of the user commands act on behalf of.
    pub current_user_name: Option<String>,
    pub poll: PollConfig,

    #[serde(skip)]
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Interval used by `gator poll` when none is given on the command line.
    pub interval: Option<String>,
    /// Deadline for a single feed request.
    pub request_timeout_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl PollConfig {
    /// The per-request deadline, in `1..=MAX_REQUEST_TIMEOUT_SECS` seconds.
    pub fn request_timeout(&self) -> Result<Duration, ConfigError> {
        match self.request_timeout_secs {
            1..=MAX_REQUEST_TIMEOUT_SECS => Ok(Duration::from_secs(self.request_timeout_secs)),
            secs => Err(ConfigError::InvalidValue {
                key: "poll.request_timeout_secs",
                reason: format!(
                    "{} is out of range, expected 1 to {}",
                    secs, MAX_REQUEST_TIMEOUT_SECS
                ),
            }),
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// If the config file exists but is invalid, returns an error.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, creating it if missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            Self::create_default_config(path)?;
            return Ok(Self {
                path: Some(path.to_path_buf()),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.path = Some(path.to_path_buf());
        config.poll.request_timeout()?;

        Ok(config)
    }

    /// Get the default config file path: `~/.config/gator/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("gator").join("config.toml"))
    }

    /// Path the configuration was loaded from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record `name` as the current user and persist the change.
    pub fn set_user(&mut self, name: &str) -> Result<(), ConfigError> {
        self.current_user_name = Some(name.to_string());
        self.save()
    }

    /// Write the configuration back to the file it was loaded from.
    ///
    /// A configuration that was never loaded from disk is kept in memory only.
    pub fn save(&self) -> Result<(), ConfigError> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };

        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        write_file(path, &content)
    }

    /// Create a default config file with comments.
    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        write_file(path, &Self::default_config_content())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        format!(
            r##"# gator configuration
#
# db_path = "/path/to/gator.db"   # defaults to the platform data directory
# current_user_name is managed by `gator register` and `gator login`.

[poll]
# Interval used by `gator poll` when none is given, e.g. "30s", "1m", "1h30m".
# interval = "1m"

# Deadline for fetching a single feed, in seconds.
request_timeout_secs = {}
"##,
            DEFAULT_REQUEST_TIMEOUT_SECS
        )
    }
}

fn write_file(path: &Path, content: &str) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    file.write_all(content.as_bytes())
        .map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

//! Database settings: file location, dependency mapping, and the server
//! identity recorded in dependency metadata.
//!
//! Values resolve with the priority: environment variables > settings file
//! (`~/.config/data-collector/settings.toml`, `[database]` table) > defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_DB_PATH: &str = "DATA_COLLECTOR_DB_PATH";
pub const ENV_MAP_OBJECTS: &str = "DATA_COLLECTOR_MAP_OBJECTS";
pub const ENV_SERVER_NAME: &str = "DATA_COLLECTOR_SERVER_NAME";
pub const ENV_DATABASE_NAME: &str = "DATA_COLLECTOR_DATABASE_NAME";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parse error in {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("Invalid value for {var}: '{value}'")]
    InvalidEnv { var: &'static str, value: String },
}

/// Connection and tracking settings for one [`Database`](crate::Database).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// SQLite database file.
    pub path: PathBuf,
    /// Record which tables, views, and routines each run touches.
    pub map_objects: bool,
    pub server_name: Option<String>,
    /// Logical database name written to dependency metadata.
    pub database_name: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            map_objects: false,
            server_name: None,
            database_name: "main".to_string(),
        }
    }
}

/// TOML config file format.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    database: Option<DatabaseSettings>,
}

/// Canonical path to the settings file: `~/.config/data-collector/settings.toml`.
pub fn settings_path() -> PathBuf {
    let config = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    config.join("data-collector").join("settings.toml")
}

/// Default database file: `<data dir>/data-collector/collector.db`.
pub fn default_database_path() -> PathBuf {
    let data = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    data.join("data-collector").join("collector.db")
}

impl DatabaseSettings {
    /// Load from the canonical settings file, then apply environment overrides.
    pub fn load() -> Result<Self, SettingsError> {
        Self::from_file(&settings_path())?.with_overrides(|var| std::env::var(var).ok())
    }

    /// Read the `[database]` table of a settings file. A missing file yields
    /// the defaults.
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        let file: ConfigFile = toml::from_str(&contents).map_err(|source| SettingsError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        Ok(file.database.unwrap_or_default())
    }

    /// Apply overrides looked up by environment variable name.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SettingsError> {
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.path = PathBuf::from(path);
        }
        if let Some(value) = lookup(ENV_MAP_OBJECTS) {
            self.map_objects = parse_flag(&value).ok_or(SettingsError::InvalidEnv {
                var: ENV_MAP_OBJECTS,
                value,
            })?;
        }
        if let Some(name) = lookup(ENV_SERVER_NAME) {
            self.server_name = Some(name);
        }
        if let Some(name) = lookup(ENV_DATABASE_NAME) {
            self.database_name = name;
        }
        Ok(self)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

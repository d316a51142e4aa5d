//! Configuration: YAML persistence and default paths
//!
//! Generic load/save helpers plus the player's own config struct. Loading
//! is forgiving: a missing or unparseable file yields defaults with a
//! warning, never an error, so a bad config can't keep the player from
//! starting.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::audio::AudioConfig;

/// Top-level player configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Output device and stream settings
    pub audio: AudioConfig,
    /// Loop monitor poll period in milliseconds
    pub monitor_period_ms: u64,
    /// Playlist file to restore on startup
    pub playlist_path: Option<PathBuf>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            monitor_period_ms: 100,
            playlist_path: None,
        }
    }
}

/// Default location for the player's files
///
/// Returns: `~/Music/tandem`
pub fn default_data_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Music")
        .join("tandem")
}

/// Default config file path
///
/// Returns: `~/Music/tandem/config.yaml`
pub fn default_config_path() -> PathBuf {
    default_data_path().join("config.yaml")
}

/// Load configuration from a YAML file
///
/// A missing file returns the default config; an unreadable or invalid one
/// logs a warning and returns the default config.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("Config file {:?} doesn't exist, using defaults", path);
        return T::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<T>(&contents) {
            Ok(config) => {
                log::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                log::warn!("Failed to parse config {:?}: {}, using defaults", path, e);
                T::default()
            }
        },
        Err(e) => {
            log::warn!("Failed to read config {:?}: {}, using defaults", path, e);
            T::default()
        }
    }
}

/// Save configuration to a YAML file
///
/// Creates parent directories if they don't exist.
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    log::info!("Saved config to {:?}", path);
    Ok(())
}

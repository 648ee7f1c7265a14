//! Engine configuration loading.
//!
//! Configuration is TOML. Missing fields take their defaults, so a file only
//! needs the values it changes.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hapsync_types::EngineConfig;

/// Application name used for the per-user config directory
pub const APP_NAME: &str = "hapsync";

/// Longest accepted bound on one hardware write
pub const MAX_WRITE_TIMEOUT_MS: u64 = 60_000;
/// Longest accepted sampling period
pub const MAX_TICK_MS: u64 = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config")]
    Serialize(#[from] toml::ser::Error),

    #[error("user config store error")]
    Store(#[from] confy::ConfyError),
}

/// Load a config file
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(sanitize(config))
}

/// Clamp values the engine cannot honour, warning about each one
pub fn sanitize(mut config: EngineConfig) -> EngineConfig {
    if config.write_timeout_ms > MAX_WRITE_TIMEOUT_MS {
        tracing::warn!(
            value = config.write_timeout_ms,
            max = MAX_WRITE_TIMEOUT_MS,
            "write_timeout_ms too large; clamped"
        );
        config.write_timeout_ms = MAX_WRITE_TIMEOUT_MS;
    }
    if config.tick_ms > MAX_TICK_MS {
        tracing::warn!(value = config.tick_ms, max = MAX_TICK_MS, "tick_ms too large; clamped");
        config.tick_ms = MAX_TICK_MS;
    }
    let at_secs = config.led_cutoff.at_secs;
    if at_secs > 0.0 && Duration::try_from_secs_f64(at_secs).is_err() {
        tracing::warn!(at_secs, "led_cutoff.at_secs is not a usable position; cutoff never fires");
    }
    config
}

/// Write a config file, creating parent directories as needed
pub fn save_config(path: &Path, config: &EngineConfig) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Per-user config (created with defaults on first use)
pub fn load_user_config() -> Result<EngineConfig, ConfigError> {
    Ok(sanitize(confy::load(APP_NAME, None)?))
}

pub fn user_config_path() -> Result<PathBuf, ConfigError> {
    Ok(confy::get_configuration_file_path(APP_NAME, None)?)
}

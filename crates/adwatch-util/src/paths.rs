//! Default paths for adwatchd components
//!
//! Paths are user-writable by default (no root required):
//! - Config: `$XDG_CONFIG_HOME/adwatchd/config.toml` or `~/.config/adwatchd/config.toml`
//! - Data: `$XDG_DATA_HOME/adwatchd` or `~/.local/share/adwatchd`

use std::path::PathBuf;

/// Environment variable for overriding the data directory
pub const ADWATCH_DATA_DIR_ENV: &str = "ADWATCH_DATA_DIR";

/// Application subdirectory name
const APP_DIR: &str = "adwatchd";

/// Config filename within the config directory
const CONFIG_FILENAME: &str = "config.toml";

/// Database filename within the data directory
pub const DATABASE_FILENAME: &str = "adwatchd.db";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$XDG_CONFIG_HOME/adwatchd/config.toml`
/// 2. `~/.config/adwatchd/config.toml`
/// 3. `/etc/adwatchd/config.toml`
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$ADWATCH_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/adwatchd` (if XDG_DATA_HOME is set)
/// 3. `~/.local/share/adwatchd` (fallback)
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(ADWATCH_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// XDG or home-relative data directory, ignoring ADWATCH_DATA_DIR
fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    // Last resort
    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

//! Canonical file paths for script-timer data files.
//!
//! Both files live under `<config dir>/script-timer/`:
//!   - config.toml  Read by the timer, hot-reloaded on change.
//!   - status.toml  Written by the timer for external status displays.
use anyhow::{Context, Result};
use std::path::PathBuf;

const APP_DIR_NAME: &str = "script-timer";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";

/// Returns the application data directory, e.g. `~/.config/script-timer` on Linux.
pub fn app_data_dir() -> Result<PathBuf> {
    let base = dirs::config_dir().context("No configuration directory for this platform")?;
    Ok(base.join(APP_DIR_NAME))
}

pub fn config_file_path() -> Result<PathBuf> {
    Ok(app_data_dir()?.join(CONFIG_FILE_NAME))
}

pub fn status_file_path() -> Result<PathBuf> {
    Ok(app_data_dir()?.join(STATUS_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    // These only make sense where the platform exposes a config directory.
    fn has_config_dir() -> bool {
        dirs::config_dir().is_some()
    }

    #[test]
    fn app_data_dir_ends_with_app_name() {
        if !has_config_dir() {
            return;
        }
        let dir = app_data_dir().unwrap();
        assert_eq!(dir.file_name().unwrap(), APP_DIR_NAME);
    }

    #[test]
    fn config_file_path_has_correct_name() {
        if !has_config_dir() {
            return;
        }
        let path = config_file_path().unwrap();
        assert_eq!(path.file_name().unwrap(), CONFIG_FILE_NAME);
    }

    #[test]
    fn config_and_status_share_same_parent_dir() {
        if !has_config_dir() {
            return;
        }
        let config = config_file_path().unwrap();
        let status = status_file_path().unwrap();
        assert_eq!(config.parent(), status.parent());
    }
}

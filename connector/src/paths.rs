/// Canonical file paths for League Connector data files.
///
/// Both files live under the platform config directory
/// (`%APPDATA%\LeagueConnector\`, `~/Library/Application Support/LeagueConnector/`,
/// `$XDG_CONFIG_HOME/LeagueConnector/`):
///   - config.toml  Read at startup.
///   - status.toml  Written whenever the session state changes.
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "LeagueConnector";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";

/// Returns the application data directory.
pub fn app_data_dir() -> Result<PathBuf> {
    let base = dirs::config_dir().context("No config directory for this platform")?;
    Ok(base.join(APP_DIR_NAME))
}

pub fn config_file_path() -> Result<PathBuf> {
    Ok(app_data_dir()?.join(CONFIG_FILE_NAME))
}

/// The status file sits next to whichever config file is in use.
pub fn status_file_path(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(STATUS_FILE_NAME),
        _ => PathBuf::from(STATUS_FILE_NAME),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_ends_with_app_name() {
        if let Ok(dir) = app_data_dir() {
            assert_eq!(dir.file_name().unwrap(), APP_DIR_NAME);
        }
    }

    #[test]
    fn config_file_path_has_correct_name() {
        if let Ok(path) = config_file_path() {
            assert_eq!(path.file_name().unwrap(), CONFIG_FILE_NAME);
        }
    }

    #[test]
    fn status_file_shares_config_dir() {
        let config = PathBuf::from("/etc/league/config.toml");
        let status = status_file_path(&config);
        assert_eq!(status, PathBuf::from("/etc/league/status.toml"));
    }

    #[test]
    fn bare_config_name_puts_status_in_cwd() {
        let status = status_file_path(Path::new("config.toml"));
        assert_eq!(status, PathBuf::from(STATUS_FILE_NAME));
    }
}

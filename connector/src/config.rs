use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::ClientOptions;
use crate::locator::LocatorKind;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;
pub const MIN_POLL_INTERVAL_MS: u64 = 100;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Root configuration structure. Deserialized from `<config dir>/LeagueConnector/config.toml`.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            detection: DetectionConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

/// How the running client is found.
#[derive(Debug, Deserialize)]
pub struct DetectionConfig {
    /// Path to `LeagueClient.exe` (or `.app`).  When its directory is a valid
    /// install, process polling is skipped.
    pub executable_path: Option<PathBuf>,
    /// Delay between process-list polls, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub locator: LocatorKind,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            executable_path: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            locator: LocatorKind::default(),
        }
    }
}

impl DetectionConfig {
    /// Poll interval, never shorter than [`MIN_POLL_INTERVAL_MS`].
    pub fn effective_poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            executable_path: self.executable_path.clone(),
            poll_interval: self.effective_poll_interval(),
            locator: self.locator,
        }
    }
}

/// What the binary does with each session.
#[derive(Debug, Default, Deserialize)]
pub struct EventsConfig {
    /// Socket topics whose events are logged.
    #[serde(default)]
    pub subscriptions: Vec<String>,
    /// Endpoints fetched once per session, right after connecting.
    #[serde(default)]
    pub startup_requests: Vec<String>,
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn detection_default_values() {
        let d = DetectionConfig::default();
        assert!(d.executable_path.is_none());
        assert_eq!(d.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(d.locator, LocatorKind::Shell);
    }

    #[test]
    fn events_default_is_empty() {
        let e = EventsConfig::default();
        assert!(e.subscriptions.is_empty());
        assert!(e.startup_requests.is_empty());
    }

    // ── effective_poll_interval ───────────────────────────────────────────────

    #[test]
    fn poll_interval_passes_through() {
        let d = DetectionConfig {
            poll_interval_ms: 2500,
            ..DetectionConfig::default()
        };
        assert_eq!(d.effective_poll_interval(), Duration::from_millis(2500));
    }

    #[test]
    fn poll_interval_clamps_below_min() {
        let d = DetectionConfig {
            poll_interval_ms: 0,
            ..DetectionConfig::default()
        };
        assert_eq!(
            d.effective_poll_interval(),
            Duration::from_millis(MIN_POLL_INTERVAL_MS)
        );
    }

    #[test]
    fn client_options_carry_detection_settings() {
        let d = DetectionConfig {
            executable_path: Some(PathBuf::from("/opt/league/LeagueClient.exe")),
            poll_interval_ms: 1000,
            locator: LocatorKind::Sysinfo,
        };
        let opts = d.client_options();
        assert_eq!(opts.executable_path, d.executable_path);
        assert_eq!(opts.poll_interval, Duration::from_secs(1));
        assert_eq!(opts.locator, LocatorKind::Sysinfo);
    }

    // ── load_or_default ───────────────────────────────────────────────────────

    #[test]
    fn load_or_default_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_or_default(&dir.path().join("nonexistent.toml")).unwrap();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.detection.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert!(config.events.subscriptions.is_empty());
    }

    #[test]
    fn load_or_default_parses_valid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
log_level = "debug"

[detection]
executable_path = "C:\\Riot Games\\League of Legends\\LeagueClient.exe"
poll_interval_ms = 1000
locator = "sysinfo"

[events]
subscriptions = ["/lol-gameflow/v1/gameflow-phase", "lol-gameflow/v1/session"]
startup_requests = ["/lol-summoner/v1/current-summoner"]
"#,
        )
        .unwrap();

        let config = load_or_default(&path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(
            config.detection.executable_path,
            Some(PathBuf::from(r"C:\Riot Games\League of Legends\LeagueClient.exe"))
        );
        assert_eq!(config.detection.poll_interval_ms, 1000);
        assert_eq!(config.detection.locator, LocatorKind::Sysinfo);
        assert_eq!(config.events.subscriptions.len(), 2);
        assert_eq!(config.events.startup_requests.len(), 1);
    }

    #[test]
    fn load_or_default_partial_toml_uses_field_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[detection]\npoll_interval_ms = 750\n").unwrap();

        let config = load_or_default(&path).unwrap();
        assert_eq!(config.detection.poll_interval_ms, 750);
        assert_eq!(config.detection.locator, LocatorKind::Shell);
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert!(config.events.startup_requests.is_empty());
    }

    #[test]
    fn load_or_default_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is not valid toml ][[[").unwrap();
        assert!(load_or_default(&path).is_err());
    }

    #[test]
    fn load_or_default_unknown_locator_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[detection]\nlocator = \"psutil\"\n").unwrap();
        assert!(load_or_default(&path).is_err());
    }
}

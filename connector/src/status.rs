use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::lockfile::{Credentials, ProcessKind};

/// Current session state as seen by the connector.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Looking for the client; no lockfile has been read yet.
    Searching,
    /// A lockfile was parsed and its session is live.
    Connected,
    /// The lockfile was removed; waiting for it to return.
    Disconnected,
}

/// Runtime status written to `status.toml` next to the config file.
/// Never contains the session password.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConnectorStatus {
    /// Connector binary version (set from Cargo.toml at compile time).
    pub version: String,
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_kind: Option<ProcessKind>,
    /// True when the session was found through the game process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_game_process: Option<bool>,
    /// RFC 3339 timestamp of the most recent connect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connected_at: Option<String>,
    /// Human-readable message for the last non-fatal error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectorStatus {
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: SessionState::Searching,
            pid: None,
            port: None,
            process_kind: None,
            is_game_process: None,
            last_connected_at: None,
            error: None,
        }
    }

    pub fn connected(&mut self, credentials: &Credentials, is_game_process: bool) {
        self.state = SessionState::Connected;
        self.pid = Some(credentials.pid);
        self.port = Some(credentials.port);
        self.process_kind = Some(credentials.process_kind());
        self.is_game_process = Some(is_game_process);
        self.last_connected_at = Some(chrono::Local::now().to_rfc3339());
        self.error = None;
    }

    pub fn disconnected(&mut self) {
        self.state = SessionState::Disconnected;
        self.pid = None;
        self.port = None;
        self.process_kind = None;
        self.is_game_process = None;
    }
}

impl Default for ConnectorStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// Failures are logged rather than returned; a status write must never stop
/// the connector.
pub fn write_status(path: &Path, status: &ConnectorStatus) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!(target: "status", "Failed to create directory {}: {e}", parent.display());
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                tracing::warn!(target: "status", "Failed to write status file: {e}");
            }
        }
        Err(e) => tracing::warn!(target: "status", "Failed to serialize status: {e}"),
    }
}

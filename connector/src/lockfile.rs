/// Lockfile parsing.
///
/// The League client writes `<install dir>/lockfile` on startup and deletes it
/// on shutdown.  Its contents are a single line of five `:`-separated fields:
///   `processName:pid:port:password:protocol`
use std::fmt;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Every local endpoint is served on the loopback interface.
pub const ADDRESS: &str = "127.0.0.1";
/// Fixed Basic-auth user for both the request and the socket channel.
pub const USERNAME: &str = "riot";

const FIELD_COUNT: usize = 5;

/// Which kind of process wrote the lockfile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessKind {
    Client,
    Game,
}

/// Session credentials read from a lockfile.  Never mutated after parsing.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub process: String,
    #[serde(rename = "PID")]
    pub pid: u32,
    pub port: u16,
    pub password: String,
    pub protocol: String,
}

impl Credentials {
    pub fn process_kind(&self) -> ProcessKind {
        if self.process.contains("LeagueClient") {
            ProcessKind::Client
        } else {
            ProcessKind::Game
        }
    }

    pub fn address(&self) -> &'static str {
        ADDRESS
    }

    pub fn username(&self) -> &'static str {
        USERNAME
    }

    /// `base64("riot:<password>")`, the value after `Basic ` in the
    /// `Authorization` header.
    pub fn basic_auth_token(&self) -> String {
        BASE64.encode(format!("{USERNAME}:{}", self.password))
    }

    pub fn authorization_header(&self) -> String {
        format!("Basic {}", self.basic_auth_token())
    }
}

// The password is a live session secret; keep it out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("process", &self.process)
            .field("pid", &self.pid)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .field("protocol", &self.protocol)
            .finish()
    }
}

/// Parses lockfile contents held in memory.
pub fn parse(bytes: &[u8]) -> Result<Credentials> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| Error::malformed(format!("not valid UTF-8: {e}")))?;
    parse_str(text)
}

/// Parses lockfile contents already decoded as text.
pub fn parse_str(text: &str) -> Result<Credentials> {
    let fields: Vec<&str> = text.trim_end().split(':').collect();
    if fields.len() != FIELD_COUNT {
        return Err(Error::malformed(format!(
            "expected {FIELD_COUNT} fields, found {}",
            fields.len()
        )));
    }

    let pid = fields[1]
        .parse::<u32>()
        .map_err(|e| Error::malformed(format!("invalid pid {:?}: {e}", fields[1])))?;
    let port = fields[2]
        .parse::<u16>()
        .map_err(|e| Error::malformed(format!("invalid port {:?}: {e}", fields[2])))?;
    if port == 0 {
        return Err(Error::malformed("port must be in 1..=65535"));
    }

    Ok(Credentials {
        process: fields[0].to_string(),
        pid,
        port,
        password: fields[3].to_string(),
        protocol: fields[4].to_string(),
    })
}

/// Reads the lockfile at `path` fully and parses it.
pub async fn read(path: &Path) -> Result<Credentials> {
    let bytes = tokio::fs::read(path).await?;
    parse(&bytes)
}

/// Reads the lockfile at `input` and writes it to `output` as pretty JSON,
/// creating the parent directory if needed.
pub async fn extract(input: &Path, output: &Path) -> Result<()> {
    let credentials = read(input).await?;
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let json = serde_json::to_string_pretty(&credentials)?;
    tokio::fs::write(output, json).await?;
    Ok(())
}

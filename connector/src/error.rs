use thiserror::Error;

/// Errors surfaced by the connector library.
///
/// Detection failures (`ProcessInspection`) are absorbed by the lifecycle
/// controller and only logged; everything else reaches the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// The lockfile did not contain five `:`-separated fields or a numeric
    /// field did not parse.
    #[error("malformed lockfile: {reason}")]
    MalformedLockfile { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The OS process listing failed, printed to stderr or returned nothing.
    #[error("process inspection failed: {0}")]
    ProcessInspection(String),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("request failed: {0}")]
    Request(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Error::MalformedLockfile {
            reason: reason.into(),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => Error::ConnectionClosed,
            other => Error::Connection(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

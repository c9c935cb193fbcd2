use crate::lockfile::Credentials;

pub enum ConnectorEvent {
    /// A lockfile was parsed; the flag is true when found via the game process.
    Connected(Credentials, bool),
    /// The lockfile was removed.
    Disconnected,
    /// The lockfile exists but could not be parsed.
    LockfileError(String),
    /// An event socket closed or failed; carries the socket's generation.
    SocketClosed(u64),
    /// Ctrl+C received; stop detection and exit.
    Shutdown,
}

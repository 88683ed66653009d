//! Error types for the client bootstrap.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by session and launcher operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Server executable missing or not runnable at the resolved path.
    /// Fatal to `start()`; no process is spawned.
    #[error("language server unavailable at '{path}': {reason}")]
    ServerUnavailable { path: PathBuf, reason: String },

    /// Server spawned but did not answer the initialize request in time.
    #[error("initialization handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// Server answered the initialize request with an error.
    #[error("server rejected initialization: {0}")]
    HandshakeRejected(String),

    /// Child process exited or the channel closed while the session was live.
    #[error("transport closed unexpectedly: {0}")]
    TransportClosed(String),

    /// Server did not acknowledge the shutdown request in time. The session
    /// still force-terminates the process and reaches Stopped.
    #[error("server did not acknowledge shutdown within {0:?}")]
    ShutdownTimeout(Duration),

    /// `stop()` arrived while the initialize handshake was outstanding.
    #[error("startup canceled by stop()")]
    StartupCanceled,

    /// Operation is not valid in the session's current state.
    #[error("invalid session state: {0}")]
    InvalidState(String),

    /// File-system watch registration or delivery failure.
    #[error("file watcher error: {0}")]
    Watch(String),

    /// Transport-level I/O failure.
    #[error("transport i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed protocol payload.
    #[error("protocol serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Incoming payload was neither a response nor a notification.
    #[error("unrecognized protocol message: {0}")]
    Protocol(String),
}

impl From<notify::Error> for ClientError {
    fn from(err: notify::Error) -> Self {
        ClientError::Watch(err.to_string())
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

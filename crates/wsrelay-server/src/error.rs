//! Server error types.

use thiserror::Error;
use wsrelay_core::RelayError;

/// Errors that can occur in the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, bad prefix, etc.).
    ///
    /// These are fatal errors that prevent server startup. Fix configuration
    /// and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport/network error (bind failure, I/O error, etc.).
    ///
    /// May be transient (network issues) or fatal (bind address in use).
    #[error("transport error: {0}")]
    Transport(String),

    /// WebSocket protocol error (failed handshake, bad frame).
    ///
    /// Fatal for that connection, but the server keeps serving other
    /// clients.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Driver error (from `RelayDriver` processing).
    #[error("driver error: {0}")]
    Driver(#[from] RelayError),
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ServerError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

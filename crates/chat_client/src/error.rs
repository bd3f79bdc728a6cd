//! Error taxonomy for the session subsystem.
//!
//! Every failure resolves to a state transition plus at most one notification;
//! nothing here is allowed to take the host process down.

use thiserror::Error;

/// Errors produced by the connection, protocol and transcript layers.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Username or password missing from the configuration. Never retried.
    #[error("credentials are not configured")]
    ConfigInvalid,

    /// Login answered with a non-200 status.
    #[error("login rejected (HTTP {status})")]
    AuthRejected { status: u16 },

    /// Request did not complete within the configured timeout.
    #[error("request timed out")]
    NetworkTimeout,

    /// Backend could not be reached at all.
    #[error("server unreachable: {0}")]
    NetworkUnreachable(String),

    /// Frame or payload did not have the expected shape.
    #[error("malformed frame: {0}")]
    ProtocolMalformed(String),

    /// Transcript could not be read or written.
    #[error("transcript I/O failed: {0}")]
    Persistence(#[from] std::io::Error),

    /// Automatic reconnection gave up; a manual connect is required.
    #[error("reconnect attempts exhausted")]
    ReconnectExhausted,

    /// Backend answered an authorized call with a non-200 status.
    #[error("request rejected (HTTP {status})")]
    Rejected { status: u16 },

    /// Registration refused because the name is in use.
    #[error("username already taken")]
    UsernameTaken,

    /// Operation needs an open session.
    #[error("not connected")]
    NotConnected,

    /// WebSocket transport failure.
    #[error("socket error: {0}")]
    Socket(String),

    /// Response body could not be understood.
    #[error("unexpected response: {0}")]
    Response(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ChatError>;

impl ChatError {
    /// True for failures that the reconnection policy retries.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChatError::NetworkTimeout | ChatError::NetworkUnreachable(_) | ChatError::Socket(_)
        )
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ChatError::NetworkTimeout
        } else if e.is_connect() || e.is_request() {
            ChatError::NetworkUnreachable(e.to_string())
        } else {
            ChatError::Response(e.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ChatError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        ChatError::Socket(e.to_string())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::ProtocolMalformed(e.to_string())
    }
}

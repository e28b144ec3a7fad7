//! Error types for the bridge runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving the bridge process.
#[derive(Debug, Error)]
pub enum Error {
    /// The bridge script or Node executable could not be located.
    #[error(
        "Watify bridge not found. Set WATIFY_BRIDGE_JS or install the bridge next to the binary."
    )]
    BridgeNotFound,

    /// The bridge process failed to start.
    #[error("Failed to launch bridge process: {0}. Check that Node.js is installed.")]
    LaunchFailed(String),

    /// Stdio communication with the bridge broke down.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// The bridge sent something the protocol does not allow.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Error reported by the bridge itself, with its error class when known.
    #[error("{name}: {message}")]
    Remote {
        /// Error class name from the bridge (e.g. `ProtocolError`).
        name: String,
        /// Human-readable message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Timeout waiting on the bridge.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The connection closed while a command was in flight.
    #[error("Bridge connection closed unexpectedly")]
    ChannelClosed,
}

impl Error {
    /// Returns `true` when the error indicates the underlying automation
    /// session was torn down (closed page, dead browser target, severed
    /// devtools connection). Callers use this to route into session
    /// recovery instead of plain retry.
    pub fn is_session_closed(&self) -> bool {
        match self {
            Error::Remote { message, .. } => is_session_closed_text(message),
            Error::ChannelClosed => true,
            _ => false,
        }
    }
}

/// Message-text classifier for the automation library's session-teardown
/// error family.
pub fn is_session_closed_text(text: &str) -> bool {
    text.contains("Session closed")
        || text.contains("Target closed")
        || text.contains("Connection closed")
        || text.contains("browser has disconnected")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_session_closed_is_classified() {
        let err = Error::Remote {
            name: "ProtocolError".to_string(),
            message: "Session closed. Most likely the page has been closed.".to_string(),
        };
        assert!(err.is_session_closed());
    }

    #[test]
    fn transport_errors_are_not_session_closed() {
        let err = Error::TransportError("write failed".to_string());
        assert!(!err.is_session_closed());
    }

    #[test]
    fn channel_closed_counts_as_session_loss() {
        assert!(Error::ChannelClosed.is_session_closed());
    }
}

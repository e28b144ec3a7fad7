//! Error taxonomy for session operations.

use thiserror::Error;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors surfaced by the session core.
///
/// The taxonomy distinguishes failures the retry executor may retry
/// (transient driver hiccups) from failures that must propagate
/// immediately (bad input, client unavailable, spent restart budget).
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session client is not ready to send. Fail fast, never retried.
    #[error("session client is not ready")]
    NotReady,

    /// The recipient cannot be normalized into a chat address.
    #[error("invalid recipient {0:?}: no digits to derive a chat id from")]
    InvalidRecipient(String),

    /// A bulk dispatch was requested with nothing to send.
    #[error("bulk send requires at least one recipient")]
    EmptyBulk,

    /// A send attempt failed in a way worth retrying.
    #[error("send failed: {0}")]
    TransientSend(String),

    /// The underlying automation session was torn down mid-operation.
    #[error("session closed: {0}")]
    SessionClosed(String),

    /// The external service rejected the session's credentials.
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    /// The automatic-recovery budget is spent; external intervention
    /// (e.g. clearing persisted credentials) is required.
    #[error("restart budget exhausted after {attempts} attempts; clear the persisted session and reconnect")]
    RestartExhausted {
        /// Connection attempts consumed when the budget ran out.
        attempts: u32,
    },

    /// Final failure after the retry executor spent all attempts.
    #[error("{label}: giving up after {attempts} attempts: {source}")]
    Retry {
        /// Operation label supplied to the executor.
        label: String,
        /// Attempts made before giving up.
        attempts: u32,
        /// The last underlying failure.
        #[source]
        source: Box<SessionError>,
    },

    /// Bridge runtime failure (process, transport, or RPC layer).
    #[error(transparent)]
    Runtime(#[from] watify_runtime::Error),
}

impl SessionError {
    /// Whether the retry executor is allowed to try again after this
    /// failure. Everything defaults to transient; bad input, an
    /// unavailable client, and a spent restart budget are unrecoverable
    /// by retry and propagate immediately.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            SessionError::NotReady
                | SessionError::InvalidRecipient(_)
                | SessionError::EmptyBulk
                | SessionError::RestartExhausted { .. }
                | SessionError::Retry { .. }
        )
    }

    /// Whether this failure means the automation session itself is gone
    /// (and recovery, not retry, is the right response).
    pub fn is_session_closed(&self) -> bool {
        match self {
            SessionError::SessionClosed(_) => true,
            SessionError::Runtime(e) => e.is_session_closed(),
            SessionError::Retry { source, .. } => source.is_session_closed(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_matches_retry_policy() {
        assert!(!SessionError::NotReady.is_transient());
        assert!(!SessionError::InvalidRecipient("abc".into()).is_transient());
        assert!(!SessionError::RestartExhausted { attempts: 3 }.is_transient());
        assert!(SessionError::TransientSend("flaky".into()).is_transient());
        assert!(SessionError::SessionClosed("page gone".into()).is_transient());
        assert!(SessionError::AuthFailure("rejected".into()).is_transient());
    }

    #[test]
    fn session_closure_is_detected_through_wrappers() {
        let runtime = watify_runtime::Error::Remote {
            name: "ProtocolError".to_string(),
            message: "Session closed. Most likely the page has been closed.".to_string(),
        };
        let wrapped = SessionError::Retry {
            label: "send message".to_string(),
            attempts: 3,
            source: Box::new(SessionError::Runtime(runtime)),
        };
        assert!(wrapped.is_session_closed());
        assert!(!SessionError::TransientSend("timeout".into()).is_session_closed());
    }
}

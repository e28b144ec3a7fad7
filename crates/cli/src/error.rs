use thiserror::Error;
use watify::SessionError;

use crate::output::{CommandError, ErrorCode};

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl CliError {
    /// Converts this error to a coded [`CommandError`] for the output
    /// envelope.
    pub fn to_command_error(&self) -> CommandError {
        let (code, message) = match self {
            CliError::Session(err) => (classify_session_error(err), err.to_string()),
            CliError::Io(err) => (ErrorCode::InternalError, err.to_string()),
            CliError::Anyhow(err) => (ErrorCode::InternalError, err.to_string()),
        };
        CommandError { code, message }
    }
}

fn classify_session_error(err: &SessionError) -> ErrorCode {
    match err {
        SessionError::NotReady => ErrorCode::NotReady,
        SessionError::InvalidRecipient(_) | SessionError::EmptyBulk => ErrorCode::InvalidInput,
        SessionError::TransientSend(_) => ErrorCode::SendFailed,
        SessionError::SessionClosed(_) => ErrorCode::SessionClosed,
        SessionError::AuthFailure(_) => ErrorCode::AuthFailed,
        SessionError::RestartExhausted { .. } => ErrorCode::RestartExhausted,
        SessionError::Retry { source, .. } => classify_session_error(source),
        SessionError::Runtime(runtime) => classify_runtime_error(runtime),
    }
}

fn classify_runtime_error(err: &watify::RuntimeError) -> ErrorCode {
    use watify::RuntimeError;
    match err {
        RuntimeError::BridgeNotFound | RuntimeError::LaunchFailed(_) => {
            ErrorCode::BridgeLaunchFailed
        }
        RuntimeError::Timeout(_) => ErrorCode::Timeout,
        _ if err.is_session_closed() => ErrorCode::SessionClosed,
        _ => ErrorCode::InternalError,
    }
}

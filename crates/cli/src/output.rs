//! Structured output envelope for all CLI commands.
//!
//! Every command writes one result envelope to stdout:
//!
//! ```json
//! {
//!   "ok": true,
//!   "command": "send",
//!   "data": { ... }
//! }
//! ```
//!
//! On failure:
//!
//! ```json
//! {
//!   "ok": false,
//!   "command": "send",
//!   "error": { "code": "NOT_READY", "message": "..." }
//! }
//! ```

use colored::Colorize;
use serde::Serialize;
use serde_json::Value;

/// Output format for CLI results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output (default, best for scripting)
    #[default]
    Json,
    /// Human-readable text
    Text,
}

/// Machine-readable error codes in the failure envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotReady,
    InvalidInput,
    SendFailed,
    SessionClosed,
    AuthFailed,
    RestartExhausted,
    BridgeLaunchFailed,
    Timeout,
    InternalError,
}

/// Error information in the failure envelope.
#[derive(Debug, Clone, Serialize)]
pub struct CommandError {
    pub code: ErrorCode,
    pub message: String,
}

/// The result envelope returned by all commands.
#[derive(Debug, Serialize)]
pub struct CommandResult {
    /// Whether the command succeeded.
    pub ok: bool,
    /// Command name (e.g. "send", "status").
    pub command: String,
    /// Command-specific result data (only present on success).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Error information (only present on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CommandError>,
}

impl CommandResult {
    pub fn success(command: &str, data: Value) -> Self {
        Self {
            ok: true,
            command: command.to_string(),
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(command: &str, error: CommandError) -> Self {
        Self {
            ok: false,
            command: command.to_string(),
            data: None,
            error: Some(error),
        }
    }

    /// Writes the envelope to stdout in the requested format.
    pub fn print(&self, format: OutputFormat) {
        match format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(self)
                    .unwrap_or_else(|_| r#"{"ok":false}"#.to_string());
                println!("{json}");
            }
            OutputFormat::Text => self.print_text(),
        }
    }

    fn print_text(&self) {
        if self.ok {
            println!("{} {}", "ok".green().bold(), self.command);
            if let Some(data) = &self.data {
                match serde_json::to_string_pretty(data) {
                    Ok(pretty) => println!("{pretty}"),
                    Err(_) => println!("{data}"),
                }
            }
        } else if let Some(error) = &self.error {
            let code = serde_json::to_value(error.code)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| "INTERNAL_ERROR".to_string());
            eprintln!(
                "{} {} [{}] {}",
                "error".red().bold(),
                self.command,
                code,
                error.message
            );
        }
    }
}

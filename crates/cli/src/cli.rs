use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "watify")]
#[command(about = "Watify session gateway - WhatsApp messaging from the command line")]
#[command(version)]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format: json (default) or text
    #[arg(short = 'f', long, global = true, value_enum, default_value = "json")]
    pub format: CliOutputFormat,

    /// Client id for the bridge credential store
    #[arg(long, global = true, default_value = "watify-client")]
    pub client_id: String,

    /// Directory holding persisted session credentials
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Connection-attempt budget before recovery gives up
    #[arg(long, global = true, default_value_t = 3)]
    pub max_retries: u32,

    /// Time to wait for session readiness (ms)
    #[arg(long, global = true, default_value_t = 60_000)]
    pub ready_timeout_ms: u64,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI output format (clap-compatible enum)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum CliOutputFormat {
    /// JSON output (default, best for scripting)
    #[default]
    Json,
    /// Human-readable text
    Text,
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(f: CliOutputFormat) -> Self {
        match f {
            CliOutputFormat::Json => OutputFormat::Json,
            CliOutputFormat::Text => OutputFormat::Text,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Report session health and connection stats
    Status {
        /// Time to observe the session before reporting (ms)
        #[arg(long, default_value_t = 3_000)]
        wait_ms: u64,
    },

    /// Wait for and print the authentication QR payload
    Qr {
        /// Time to wait for a QR code (ms)
        #[arg(long, default_value_t = 30_000)]
        timeout_ms: u64,
    },

    /// Send a single message
    Send {
        /// Recipient phone number or chat id
        recipient: String,
        /// Message body
        message: String,
    },

    /// Send a message to many recipients sequentially with pacing
    Bulk {
        /// Recipient phone number or chat id (repeatable)
        #[arg(short = 't', long = "to", required = true, value_name = "RECIPIENT")]
        recipients: Vec<String>,
        /// Message body
        message: String,
        /// Pause between messages (ms)
        #[arg(long, default_value_t = 2_000)]
        delay_ms: u64,
    },

    /// Tear down and reinitialize the session driver
    Restart,
}

impl Commands {
    /// Command name used in the output envelope.
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Status { .. } => "status",
            Commands::Qr { .. } => "qr",
            Commands::Send { .. } => "send",
            Commands::Bulk { .. } => "bulk",
            Commands::Restart => "restart",
        }
    }
}

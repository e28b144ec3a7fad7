//! Runtime plumbing for the Watify bridge.
//!
//! The session core drives an external Node.js bridge process that wraps
//! the browser-automation library. This crate owns everything below the
//! session logic:
//!
//! - locating a runnable Node executable and the bridge script
//!   ([`locate_bridge`])
//! - spawning and tearing down the bridge process ([`BridgeProcess`])
//! - the length-prefixed JSON stdio transport ([`PipeTransport`])
//! - command/reply correlation and ordered event delivery
//!   ([`BridgeConnection`])

mod connection;
mod error;
mod locate;
mod process;
mod transport;

pub use connection::BridgeConnection;
pub use error::{Error, Result, is_session_closed_text};
pub use locate::locate_bridge;
pub use process::{BridgeLaunch, BridgeProcess};
pub use transport::{PipeReceiver, PipeSender, PipeTransport};

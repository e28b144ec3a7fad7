//! Wire types exchanged between the Watify session core and the Node.js
//! bridge process.
//!
//! The bridge speaks a small JSON protocol over stdio: the Rust side sends
//! [`Command`]s, the bridge answers with id-correlated [`Reply`]s and pushes
//! unsolicited lifecycle [`Event`]s. This crate only defines the shapes;
//! transport and correlation live in `watify-runtime`.

mod types;
mod wire;

pub use types::{ChatId, IncomingMessage, SendReceipt, SessionInfo};
pub use wire::{Command, ErrorPayload, Event, Message, Reply};

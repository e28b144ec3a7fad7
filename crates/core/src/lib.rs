//! Watify session core.
//!
//! Manages one long-lived, externally-authenticated messaging session
//! backed by a browser-automation bridge. The moving parts:
//!
//! - [`SessionService`] — the facade: connect, send, bulk-send, restart,
//!   health and stats queries
//! - the state machine (internal) — consumes driver events in order and
//!   keeps [`Health`] truthful
//! - [`retry_execute`] — the one retry-with-backoff implementation every
//!   driver-facing call goes through
//! - [`RestartController`] — serialized teardown/recreate recovery with a
//!   bounded attempt budget
//! - [`BridgeClient`]/[`BridgeFactory`] — the production driver over the
//!   Node bridge process
//!
//! The session survives QR re-authentication, transient disconnects, and
//! bridge crashes; callers only ever observe typed errors and health
//! snapshots.

mod bulk;
mod client;
mod config;
mod driver;
mod error;
mod health;
mod machine;
mod restart;
mod retry;
mod service;

pub mod testing;

pub use bulk::{BulkOutcome, SendResult};
pub use client::{BridgeClient, BridgeFactory};
pub use config::SessionConfig;
pub use driver::{DriverEvent, DriverFactory, DriverSlot, SessionDriver};
pub use error::{Result, SessionError};
pub use health::{Health, HealthTracker, SessionState};
pub use restart::RestartController;
pub use retry::{RetryPolicy, execute as retry_execute};
pub use service::{SendOutcome, ServiceStats, SessionService};

pub use watify_protocol::{ChatId, IncomingMessage, SendReceipt, SessionInfo};
pub use watify_runtime::Error as RuntimeError;

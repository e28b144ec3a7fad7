//! The driver seam: what the session core needs from the automation
//! client, and nothing more.
//!
//! The concrete implementation ([`BridgeClient`](crate::client::BridgeClient))
//! talks to the Node bridge; tests inject [`MockDriver`](crate::testing::MockDriver).
//! The factory indirection exists because the restart controller must be
//! able to tear a dead client down and construct a fresh one with the
//! event channel re-wired.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};

use watify_protocol::{ChatId, IncomingMessage, SendReceipt, SessionInfo};

use crate::error::Result;

/// Lifecycle event emitted by a session driver.
#[derive(Debug, Clone)]
pub enum DriverEvent {
    /// A QR code is awaiting scan.
    Qr(String),
    /// Credentials accepted, session restore underway.
    Authenticated,
    /// Fully connected; sending is possible.
    Ready(SessionInfo),
    /// Credentials rejected.
    AuthFailure(String),
    /// Connection lost.
    Disconnected(String),
    /// Driver-level error outside any command.
    Error(String),
    /// Inbound message observed.
    Message(IncomingMessage),
}

/// Operations the session core performs against the automation client.
#[async_trait]
pub trait SessionDriver: Send + Sync {
    /// Begins connecting; lifecycle progress arrives as [`DriverEvent`]s.
    async fn initialize(&self) -> Result<()>;

    /// Tears the client down. Idempotent; errors are advisory since the
    /// client may already be gone.
    async fn destroy(&self) -> Result<()>;

    /// Sends one message and returns the service's receipt.
    async fn send_message(&self, chat: &ChatId, body: &str) -> Result<SendReceipt>;

    /// Returns the driver's own view of its connection state.
    async fn connection_state(&self) -> Result<String>;
}

/// Builds driver instances with the event channel wired in.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Creates a new driver whose lifecycle events flow into `events`.
    async fn create(&self, events: mpsc::Sender<DriverEvent>) -> Result<Arc<dyn SessionDriver>>;
}

/// The shared slot holding the current driver instance.
///
/// Callers never hold a driver reference across a restart; they fetch
/// `(driver, generation)` per operation and compare the generation on
/// completion. A restart installs a replacement and bumps the counter,
/// which lets completion handlers of a superseded instance discard their
/// state updates.
pub struct DriverSlot {
    current: RwLock<Option<Arc<dyn SessionDriver>>>,
    generation: AtomicU64,
}

impl DriverSlot {
    pub(crate) fn new() -> Self {
        Self {
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Returns the current driver and the generation it belongs to.
    pub async fn get(&self) -> Option<(Arc<dyn SessionDriver>, u64)> {
        let guard = self.current.read().await;
        guard
            .as_ref()
            .map(|driver| (Arc::clone(driver), self.generation.load(Ordering::SeqCst)))
    }

    /// Current generation counter.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Installs a replacement driver and bumps the generation.
    pub(crate) async fn install(&self, driver: Arc<dyn SessionDriver>) -> u64 {
        let mut guard = self.current.write().await;
        *guard = Some(driver);
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Removes and returns the current driver, if any. The generation is
    /// left untouched; only installs advance it.
    pub(crate) async fn take(&self) -> Option<Arc<dyn SessionDriver>> {
        self.current.write().await.take()
    }
}

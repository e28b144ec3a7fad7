//! Testing infrastructure for the session core.
//!
//! Provides a scriptable [`MockDriver`] and [`MockFactory`] so the state
//! machine, restart controller, and service facade can be exercised
//! without a bridge process. Behavior is configured up front with `set_*`
//! / `push_*` methods; everything the core does to the driver is recorded
//! as [`MockAction`]s for later assertion.
//!
//! # Example
//!
//! ```ignore
//! let factory = MockFactory::new();
//! factory.push_send(SendScript::Fail("driver hiccup".into()));
//!
//! let service = SessionService::new(SessionConfig::default(), factory.clone());
//! service.connect().await?;
//! // ... drive and assert on factory.driver(0).unwrap().actions()
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use watify_protocol::{ChatId, SendReceipt, SessionInfo};

use crate::driver::{DriverEvent, DriverFactory, SessionDriver};
use crate::error::{Result, SessionError};
use crate::health::now_millis;

/// Account identity used by mock `ready` events.
pub fn mock_session_info() -> SessionInfo {
    SessionInfo {
        pushname: "Watify Test".to_string(),
        wid: "923125331072".to_string(),
    }
}

/// Action recorded by [`MockDriver`] for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockAction {
    Initialize,
    Destroy,
    Send { chat_id: String, body: String },
    GetState,
}

/// Scripted behavior for one `send_message` call.
#[derive(Debug, Clone)]
pub enum SendScript {
    /// Return a receipt with a generated id.
    Succeed,
    /// Return a receipt with an empty id (the contract violation the
    /// send path must treat as failure).
    EmptyId,
    /// Fail with a transient send error.
    Fail(String),
    /// Fail with the driver's session-teardown error family.
    FailSessionClosed,
}

/// Mock session driver with scripted sends and recorded actions.
pub struct MockDriver {
    events: mpsc::Sender<DriverEvent>,
    actions: Mutex<Vec<MockAction>>,
    send_script: Mutex<VecDeque<SendScript>>,
    initialize_events: Mutex<Vec<DriverEvent>>,
    initialize_delay: Mutex<Duration>,
    initialize_failure: Mutex<Option<String>>,
    send_delay: Mutex<Duration>,
    state: Mutex<String>,
    send_counter: AtomicU32,
}

impl MockDriver {
    /// Creates a driver that is not managed by any factory. Useful for
    /// slot-level tests.
    pub fn detached(events: mpsc::Sender<DriverEvent>) -> Arc<Self> {
        Arc::new(Self {
            events,
            actions: Mutex::new(Vec::new()),
            send_script: Mutex::new(VecDeque::new()),
            initialize_events: Mutex::new(Vec::new()),
            initialize_delay: Mutex::new(Duration::ZERO),
            initialize_failure: Mutex::new(None),
            send_delay: Mutex::new(Duration::ZERO),
            state: Mutex::new("CONNECTED".to_string()),
            send_counter: AtomicU32::new(0),
        })
    }

    /// Makes every `initialize` call fail with an auth error after its
    /// events are emitted, mirroring a driver whose startup promise
    /// rejects on authentication failure.
    pub fn set_initialize_failure(&self, message: Option<String>) {
        *self.initialize_failure.lock() = message;
    }

    /// Adds a pause inside every `send_message` call.
    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock() = delay;
    }

    /// Queues behavior for the next `send_message` call. Unqueued calls
    /// succeed.
    pub fn push_send(&self, script: SendScript) {
        self.send_script.lock().push_back(script);
    }

    /// Sets the events emitted when `initialize` is called.
    pub fn set_initialize_events(&self, events: Vec<DriverEvent>) {
        *self.initialize_events.lock() = events;
    }

    /// Sets the driver's reported connection state.
    pub fn set_state(&self, state: &str) {
        *self.state.lock() = state.to_string();
    }

    /// Returns all recorded actions.
    pub fn actions(&self) -> Vec<MockAction> {
        self.actions.lock().clone()
    }

    /// Emits a lifecycle event, as the bridge would.
    pub async fn emit(&self, event: DriverEvent) {
        let _ = self.events.send(event).await;
    }

    fn record(&self, action: MockAction) {
        self.actions.lock().push(action);
    }
}

#[async_trait]
impl SessionDriver for MockDriver {
    async fn initialize(&self) -> Result<()> {
        self.record(MockAction::Initialize);
        let delay = *self.initialize_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let events = self.initialize_events.lock().clone();
        for event in events {
            let _ = self.events.send(event).await;
        }
        if let Some(message) = self.initialize_failure.lock().clone() {
            return Err(SessionError::AuthFailure(message));
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        self.record(MockAction::Destroy);
        Ok(())
    }

    async fn send_message(&self, chat: &ChatId, body: &str) -> Result<SendReceipt> {
        self.record(MockAction::Send {
            chat_id: chat.as_str().to_string(),
            body: body.to_string(),
        });

        let delay = *self.send_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let script = self.send_script.lock().pop_front().unwrap_or(SendScript::Succeed);
        match script {
            SendScript::Succeed => {
                let n = self.send_counter.fetch_add(1, Ordering::SeqCst);
                Ok(SendReceipt {
                    id: format!("true_{}_{n}", chat.as_str()),
                    timestamp: now_millis() / 1_000,
                })
            }
            SendScript::EmptyId => Ok(SendReceipt {
                id: String::new(),
                timestamp: now_millis() / 1_000,
            }),
            SendScript::Fail(message) => Err(SessionError::TransientSend(message)),
            SendScript::FailSessionClosed => Err(SessionError::SessionClosed(
                "Session closed. Most likely the page has been closed.".to_string(),
            )),
        }
    }

    async fn connection_state(&self) -> Result<String> {
        self.record(MockAction::GetState);
        Ok(self.state.lock().clone())
    }
}

/// Factory producing [`MockDriver`]s, with knobs for creation failures
/// and slow initialization.
pub struct MockFactory {
    drivers: Mutex<Vec<Arc<MockDriver>>>,
    create_calls: AtomicU32,
    fail_creates: AtomicU32,
    created: AtomicUsize,
    initialize_events: Mutex<Vec<DriverEvent>>,
    initialize_delay: Mutex<Duration>,
    initialize_failure: Mutex<Option<String>>,
    send_script: Mutex<VecDeque<SendScript>>,
}

impl MockFactory {
    /// Creates a factory whose drivers authenticate and become ready as
    /// soon as they are initialized.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            drivers: Mutex::new(Vec::new()),
            create_calls: AtomicU32::new(0),
            fail_creates: AtomicU32::new(0),
            created: AtomicUsize::new(0),
            initialize_events: Mutex::new(vec![
                DriverEvent::Authenticated,
                DriverEvent::Ready(mock_session_info()),
            ]),
            initialize_delay: Mutex::new(Duration::ZERO),
            initialize_failure: Mutex::new(None),
            send_script: Mutex::new(VecDeque::new()),
        })
    }

    /// Makes every created driver's `initialize` fail with an auth error.
    pub fn set_initialize_failure(&self, message: Option<String>) {
        *self.initialize_failure.lock() = message;
    }

    /// Overrides the event sequence emitted by each driver's
    /// `initialize`. Use an empty vec for a driver that stays silent.
    pub fn set_initialize_events(&self, events: Vec<DriverEvent>) {
        *self.initialize_events.lock() = events;
    }

    /// Adds a pause inside each driver's `initialize`.
    pub fn set_initialize_delay(&self, delay: Duration) {
        *self.initialize_delay.lock() = delay;
    }

    /// Makes the next `n` `create` calls fail before producing a driver.
    pub fn fail_next_creates(&self, n: u32) {
        self.fail_creates.store(n, Ordering::SeqCst);
    }

    /// Queues send behavior applied to the next created driver.
    pub fn push_send(&self, script: SendScript) {
        self.send_script.lock().push_back(script);
    }

    /// Number of drivers successfully created.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Number of `create` calls, including failed ones.
    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Returns the `index`-th created driver.
    pub fn driver(&self, index: usize) -> Option<Arc<MockDriver>> {
        self.drivers.lock().get(index).cloned()
    }

    /// Returns the most recently created driver.
    pub fn last_driver(&self) -> Option<Arc<MockDriver>> {
        self.drivers.lock().last().cloned()
    }
}

#[async_trait]
impl DriverFactory for MockFactory {
    async fn create(&self, events: mpsc::Sender<DriverEvent>) -> Result<Arc<dyn SessionDriver>> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.fail_creates.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_creates.store(remaining - 1, Ordering::SeqCst);
            return Err(SessionError::TransientSend(
                "mock factory refused to create a driver".to_string(),
            ));
        }

        let driver = MockDriver::detached(events);
        driver.set_initialize_events(self.initialize_events.lock().clone());
        driver.set_initialize_failure(self.initialize_failure.lock().clone());
        *driver.initialize_delay.lock() = *self.initialize_delay.lock();
        {
            let mut scripts = self.send_script.lock();
            while let Some(script) = scripts.pop_front() {
                driver.push_send(script);
            }
        }

        self.drivers.lock().push(Arc::clone(&driver));
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(driver)
    }
}

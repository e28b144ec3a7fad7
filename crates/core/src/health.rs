//! Session health: the state enum, the copy-on-read snapshot, and the
//! tracker that owns the live value.
//!
//! Write access is deliberately narrow. The state machine is the single
//! logical writer; the restart controller additionally toggles the
//! restart flag and marks re-initialization. Everything else reads
//! snapshots, so there is no torn-read surface to lock around.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;

use watify_protocol::SessionInfo;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Uninitialized,
    Initializing,
    QrPending,
    Authenticating,
    Ready,
    AuthFailed,
    Disconnected,
    SessionClosed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "UNINITIALIZED",
            SessionState::Initializing => "INITIALIZING",
            SessionState::QrPending => "QR_PENDING",
            SessionState::Authenticating => "AUTHENTICATING",
            SessionState::Ready => "READY",
            SessionState::AuthFailed => "AUTH_FAILED",
            SessionState::Disconnected => "DISCONNECTED",
            SessionState::SessionClosed => "SESSION_CLOSED",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of session health.
///
/// Immutable once handed out; readers get a fresh copy per query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub state: SessionState,
    pub is_ready: bool,
    pub is_authenticated: bool,
    pub has_qr: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_payload: Option<String>,
    pub connection_attempts: u32,
    pub max_retries: u32,
    pub restart_in_progress: bool,
    /// Unix millis of the last successful send or `ready` event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<i64>,
    pub session_closed: bool,
    /// Set once the attempt budget is spent without reaching `Ready`;
    /// cleared by the next successful `ready`.
    pub restart_exhausted: bool,
    /// Identity of the authenticated account, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_info: Option<SessionInfo>,
}

impl Health {
    pub(crate) fn new(max_retries: u32) -> Self {
        Self {
            state: SessionState::Uninitialized,
            is_ready: false,
            is_authenticated: false,
            has_qr: false,
            qr_payload: None,
            connection_attempts: 0,
            max_retries,
            restart_in_progress: false,
            last_seen: None,
            session_closed: false,
            restart_exhausted: false,
            session_info: None,
        }
    }
}

/// Owner of the live health value.
///
/// Every mutation publishes a fresh snapshot on the watch channel, so
/// waiters observe attempt-counter and flag changes even when the state
/// itself did not move.
pub struct HealthTracker {
    inner: Mutex<Health>,
    ready_at: Mutex<Option<Instant>>,
    health_tx: watch::Sender<Health>,
}

impl HealthTracker {
    pub(crate) fn new(max_retries: u32) -> Self {
        let (health_tx, _) = watch::channel(Health::new(max_retries));
        Self {
            inner: Mutex::new(Health::new(max_retries)),
            ready_at: Mutex::new(None),
            health_tx,
        }
    }

    /// Returns a copy of the current health.
    pub fn snapshot(&self) -> Health {
        self.inner.lock().clone()
    }

    /// Current state without the full snapshot copy.
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Whether the session can send right now.
    pub fn is_ready(&self) -> bool {
        self.inner.lock().is_ready
    }

    /// Observe health changes without polling. The receiver holds the
    /// snapshot current at subscription time.
    pub fn subscribe(&self) -> watch::Receiver<Health> {
        self.health_tx.subscribe()
    }

    /// Time since the session last entered `Ready`, while still ready.
    pub fn uptime_since_ready(&self) -> Option<Duration> {
        let guard = self.ready_at.lock();
        guard.map(|at| at.elapsed())
    }

    /// Applies a mutation and publishes the new snapshot.
    pub(crate) fn update(&self, mutate: impl FnOnce(&mut Health)) -> Health {
        let snapshot = {
            let mut guard = self.inner.lock();
            mutate(&mut guard);
            guard.clone()
        };

        if snapshot.is_ready {
            let mut ready_at = self.ready_at.lock();
            if ready_at.is_none() {
                *ready_at = Some(Instant::now());
            }
        } else {
            *self.ready_at.lock() = None;
        }

        let _ = self.health_tx.send(snapshot.clone());
        snapshot
    }

    /// Claims the restart slot. Returns `false` when a restart is
    /// already in flight (the caller should wait, not start a second
    /// teardown).
    pub(crate) fn begin_restart(&self) -> bool {
        let mut claimed = false;
        self.update(|health| {
            if !health.restart_in_progress {
                health.restart_in_progress = true;
                claimed = true;
            }
        });
        claimed
    }

    /// Releases the restart slot and wakes waiters.
    pub(crate) fn finish_restart(&self) {
        self.update(|health| health.restart_in_progress = false);
    }

    /// Records activity on the session (successful send).
    pub(crate) fn touch_last_seen(&self) {
        self.update(|health| health.last_seen = Some(now_millis()));
    }
}

/// Current wall-clock time in unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

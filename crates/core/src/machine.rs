//! The session state machine.
//!
//! Consumes driver events from the bounded channel in a dedicated task,
//! applies the transition table to the health tracker, and schedules
//! recovery when a failure state is entered with budget remaining.
//!
//! Transition table (event → state):
//!
//! | event           | new state       | side effects |
//! |-----------------|-----------------|--------------|
//! | `qr`            | `QrPending`     | store payload |
//! | `authenticated` | `Authenticating`| clear payload |
//! | `ready`         | `Ready`         | reset attempts, stamp last-seen |
//! | `auth_failure`  | `AuthFailed`    | increment attempts |
//! | `disconnected`  | `Disconnected`  | drop readiness |
//! | session-closed error | `SessionClosed` | set closed flag |
//!
//! Entering `AuthFailed`, `Disconnected`, or `SessionClosed` with
//! `connection_attempts < max_retries` fires a restart request; the
//! handler itself never blocks on recovery.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use watify_runtime::is_session_closed_text;

use crate::driver::DriverEvent;
use crate::health::{Health, HealthTracker, SessionState, now_millis};
use crate::restart::RestartController;

/// Applies one event to the health value per the transition table.
pub(crate) fn transition(health: &mut Health, event: &DriverEvent) {
    match event {
        DriverEvent::Qr(payload) => {
            health.state = SessionState::QrPending;
            health.is_ready = false;
            health.is_authenticated = false;
            health.has_qr = true;
            health.qr_payload = Some(payload.clone());
        }
        DriverEvent::Authenticated => {
            health.state = SessionState::Authenticating;
            health.is_authenticated = true;
            health.has_qr = false;
            health.qr_payload = None;
        }
        DriverEvent::Ready(info) => {
            health.state = SessionState::Ready;
            health.is_ready = true;
            health.is_authenticated = true;
            health.has_qr = false;
            health.qr_payload = None;
            health.connection_attempts = 0;
            health.last_seen = Some(now_millis());
            health.session_closed = false;
            health.restart_exhausted = false;
            health.session_info = Some(info.clone());
        }
        DriverEvent::AuthFailure(_) => {
            health.state = SessionState::AuthFailed;
            health.is_ready = false;
            health.is_authenticated = false;
            health.has_qr = false;
            health.qr_payload = None;
            health.connection_attempts += 1;
            health.restart_exhausted = health.connection_attempts >= health.max_retries;
        }
        DriverEvent::Disconnected(_) => {
            health.state = SessionState::Disconnected;
            health.is_ready = false;
            health.has_qr = false;
            health.qr_payload = None;
            health.restart_exhausted = health.connection_attempts >= health.max_retries;
        }
        DriverEvent::Error(message) => {
            if is_session_closed_text(message) {
                health.state = SessionState::SessionClosed;
                health.session_closed = true;
                health.is_ready = false;
                health.has_qr = false;
                health.qr_payload = None;
                health.restart_exhausted = health.connection_attempts >= health.max_retries;
            }
        }
        DriverEvent::Message(_) => {}
    }
}

fn needs_recovery(state: SessionState) -> bool {
    matches!(
        state,
        SessionState::AuthFailed | SessionState::Disconnected | SessionState::SessionClosed
    )
}

/// Spawns the event-processing loop.
pub(crate) fn spawn(
    mut events: mpsc::Receiver<DriverEvent>,
    tracker: Arc<HealthTracker>,
    restart: Arc<RestartController>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            handle(&tracker, &restart, event);
        }
        debug!(target = "watify.session", "event channel closed; state machine stopping");
    })
}

fn handle(tracker: &Arc<HealthTracker>, restart: &Arc<RestartController>, event: DriverEvent) {
    match &event {
        DriverEvent::Qr(_) => info!(target = "watify.session", "qr code available, waiting for scan"),
        DriverEvent::Authenticated => info!(target = "watify.session", "authenticated"),
        DriverEvent::Ready(info) => {
            info!(target = "watify.session", account = %info.pushname, wid = %info.wid, "session ready")
        }
        DriverEvent::AuthFailure(reason) => {
            warn!(target = "watify.session", %reason, "authentication failed")
        }
        DriverEvent::Disconnected(reason) => {
            warn!(target = "watify.session", %reason, "session disconnected")
        }
        DriverEvent::Error(message) if is_session_closed_text(message) => {
            warn!(target = "watify.session", %message, "session closed by driver")
        }
        DriverEvent::Error(message) => {
            warn!(target = "watify.session", %message, "driver error (no state change)")
        }
        DriverEvent::Message(msg) => {
            debug!(target = "watify.session", from = %msg.from, "inbound message")
        }
    }

    let snapshot = tracker.update(|health| transition(health, &event));

    if needs_recovery(snapshot.state) {
        if snapshot.restart_exhausted {
            warn!(
                target = "watify.session",
                attempts = snapshot.connection_attempts,
                max_retries = snapshot.max_retries,
                "restart budget exhausted; manual intervention required"
            );
        } else if !snapshot.restart_in_progress {
            let restart = Arc::clone(restart);
            tokio::spawn(async move {
                if let Err(e) = restart.restart().await {
                    warn!(target = "watify.session", error = %e, "automatic restart failed");
                }
            });
        }
    }
}

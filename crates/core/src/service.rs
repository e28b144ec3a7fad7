//! The session service: the surface the rest of the system talks to.
//!
//! Owns the driver slot, the health tracker, the restart controller, and
//! the state-machine task. Everything driver-facing goes through the
//! retry executor; everything health-facing hands out snapshots.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use watify_protocol::ChatId;

use crate::bulk::{self, BulkOutcome};
use crate::config::SessionConfig;
use crate::driver::{DriverEvent, DriverFactory, DriverSlot};
use crate::error::{Result, SessionError};
use crate::health::{Health, HealthTracker};
use crate::machine;
use crate::restart::RestartController;
use crate::retry::{self, RetryPolicy};

/// Result of one successful send.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcome {
    /// Message id assigned by the external service.
    pub message_id: String,
    /// Unix timestamp (seconds) reported by the service.
    pub timestamp: i64,
    /// The recipient as the caller supplied it.
    pub to: String,
    /// The normalized chat address actually used.
    pub chat_id: String,
}

/// Operational counters for status surfaces.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub connection_state: String,
    pub connection_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_since_ready_ms: Option<u64>,
}

/// Long-lived session gateway over one driver instance.
pub struct SessionService {
    config: SessionConfig,
    tracker: Arc<HealthTracker>,
    slot: Arc<DriverSlot>,
    restart: Arc<RestartController>,
    events_tx: mpsc::Sender<DriverEvent>,
    machine: JoinHandle<()>,
}

impl SessionService {
    /// Builds the service around a driver factory. No driver exists until
    /// [`connect`](Self::connect) is called.
    pub fn new(config: SessionConfig, factory: Arc<dyn DriverFactory>) -> Self {
        let tracker = Arc::new(HealthTracker::new(config.max_retries));
        let slot = Arc::new(DriverSlot::new());
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer);

        let restart = Arc::new(RestartController::new(
            factory,
            Arc::clone(&slot),
            Arc::clone(&tracker),
            events_tx.clone(),
            config.base_backoff(),
            config.max_retries,
        ));

        let machine = machine::spawn(events_rx, Arc::clone(&tracker), Arc::clone(&restart));

        Self {
            config,
            tracker,
            slot,
            restart,
            events_tx,
            machine,
        }
    }

    /// Brings the first driver up. A no-op when one is already installed;
    /// otherwise this is the same cycle a restart runs, starting from
    /// `UNINITIALIZED`.
    pub async fn connect(&self) -> Result<()> {
        if self.slot.get().await.is_some() {
            debug!(target = "watify.session", "connect: driver already installed");
            return Ok(());
        }
        info!(target = "watify.session", client_id = %self.config.client_id, "initializing session");
        self.restart.restart().await
    }

    /// Current health snapshot. Never fails; reflects best current
    /// knowledge.
    pub fn health(&self) -> Health {
        self.tracker.snapshot()
    }

    /// Asks the driver for its own view of the connection state, when a
    /// driver is installed. Probe failures degrade to `None`; status
    /// surfaces must not fail because the driver could not answer.
    pub async fn driver_state(&self) -> Option<String> {
        let (driver, _) = self.slot.get().await?;
        driver.connection_state().await.ok()
    }

    /// Operational counters for status endpoints.
    pub fn stats(&self) -> ServiceStats {
        let health = self.tracker.snapshot();
        ServiceStats {
            connection_state: health.state.to_string(),
            connection_attempts: health.connection_attempts,
            uptime_since_ready_ms: self
                .tracker
                .uptime_since_ready()
                .map(|d| d.as_millis() as u64),
        }
    }

    /// Waits until the session is ready to send.
    ///
    /// Fails fast with [`SessionError::RestartExhausted`] if recovery
    /// gives up while waiting, and with a timeout error otherwise.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<()> {
        self.wait_for(timeout, "session readiness", |health| {
            if health.is_ready {
                Some(Ok(()))
            } else if health.restart_exhausted {
                Some(Err(SessionError::RestartExhausted {
                    attempts: health.connection_attempts,
                }))
            } else {
                None
            }
        })
        .await
    }

    /// Waits for a QR code to become available and returns its payload.
    pub async fn wait_for_qr(&self, timeout: Duration) -> Result<String> {
        self.wait_for(timeout, "qr code", |health| {
            if let Some(payload) = &health.qr_payload {
                Some(Ok(payload.clone()))
            } else if health.is_ready {
                // Already authenticated: no QR will ever come.
                Some(Err(SessionError::TransientSend(
                    "session is already authenticated; no qr pending".to_string(),
                )))
            } else {
                None
            }
        })
        .await
    }

    async fn wait_for<T>(
        &self,
        timeout: Duration,
        what: &str,
        probe: impl Fn(&Health) -> Option<Result<T>>,
    ) -> Result<T> {
        let mut rx = self.tracker.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let probed = probe(&rx.borrow_and_update());
            if let Some(result) = probed {
                return result;
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(SessionError::Runtime(watify_runtime::Error::Timeout(
                    format!("Timeout waiting for {what}"),
                )));
            }

            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Err(SessionError::Runtime(watify_runtime::Error::ChannelClosed));
                    }
                }
                _ = tokio::time::sleep(remaining) => {}
            }
        }
    }

    /// Sends one message.
    ///
    /// Fails fast when the client is unavailable; driver failures are
    /// retried up to three times with linear backoff. A receipt without a
    /// message id counts as a failure, not a silent success.
    pub async fn send_message(&self, recipient: &str, body: &str) -> Result<SendOutcome> {
        let health = self.tracker.snapshot();
        if health.restart_exhausted {
            return Err(SessionError::RestartExhausted {
                attempts: health.connection_attempts,
            });
        }
        if !health.is_ready {
            return Err(SessionError::NotReady);
        }

        let chat = ChatId::normalize(recipient)
            .ok_or_else(|| SessionError::InvalidRecipient(recipient.to_string()))?;

        let (driver, generation) = self.slot.get().await.ok_or(SessionError::NotReady)?;

        let policy = RetryPolicy::new(3, self.config.base_backoff());
        let label = format!("send message to {recipient}");
        let result = retry::execute(&policy, &label, || {
            let driver = Arc::clone(&driver);
            let chat = chat.clone();
            async move {
                let receipt = driver.send_message(&chat, body).await?;
                if receipt.id.is_empty() {
                    return Err(SessionError::TransientSend(
                        "driver returned a receipt without a message id".to_string(),
                    ));
                }
                Ok(receipt)
            }
        })
        .await;

        match result {
            Ok(receipt) => {
                // A restart may have superseded the driver we used; a
                // stale generation must not stamp activity for the new one.
                if self.slot.generation() == generation {
                    self.tracker.touch_last_seen();
                }
                Ok(SendOutcome {
                    message_id: receipt.id,
                    timestamp: receipt.timestamp,
                    to: recipient.to_string(),
                    chat_id: chat.as_str().to_string(),
                })
            }
            Err(error) => {
                if error.is_session_closed() {
                    // Let recovery proceed independently of this caller.
                    let _ = self
                        .events_tx
                        .try_send(DriverEvent::Error(error.to_string()));
                }
                Err(error)
            }
        }
    }

    /// Sends `body` to every recipient sequentially with a pause between
    /// items. Rejects before any driver activity when the list is empty
    /// or the client is unavailable; after that, individual failures are
    /// recorded and the batch always runs to the end of the list.
    pub async fn send_bulk(
        &self,
        recipients: &[String],
        body: &str,
        delay: Option<Duration>,
    ) -> Result<BulkOutcome> {
        if recipients.is_empty() {
            return Err(SessionError::EmptyBulk);
        }

        let health = self.tracker.snapshot();
        if health.restart_exhausted {
            return Err(SessionError::RestartExhausted {
                attempts: health.connection_attempts,
            });
        }
        if !health.is_ready {
            return Err(SessionError::NotReady);
        }

        let delay = delay.unwrap_or_else(|| self.config.bulk_delay());
        let outcome = bulk::dispatch(
            recipients,
            delay,
            || self.tracker.is_ready(),
            |_, recipient| async move { self.send_message(&recipient, body).await },
        )
        .await;
        Ok(outcome)
    }

    /// Manually triggers a teardown/recreate cycle. Safe to call while an
    /// automatic restart is in flight; the call then waits for it instead
    /// of starting another.
    pub async fn restart(&self) -> Result<()> {
        self.restart.restart().await
    }

    /// Stops the machine task and destroys the current driver. The
    /// service is not usable afterwards.
    pub async fn shutdown(&self) {
        if let Some(driver) = self.slot.take().await {
            if let Err(error) = driver.destroy().await {
                debug!(target = "watify.session", %error, "destroy during shutdown failed (ignored)");
            }
        }
        self.machine.abort();
    }
}

impl Drop for SessionService {
    fn drop(&mut self) {
        // The machine task keeps the restart controller (and with it an
        // event sender) alive, so the channel never closes on its own.
        self.machine.abort();
    }
}

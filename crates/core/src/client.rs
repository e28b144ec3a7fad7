//! The bridge-backed driver: the production implementation of the
//! [`SessionDriver`] seam.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use watify_protocol::{ChatId, Event, SendReceipt};
use watify_runtime::{BridgeConnection, BridgeLaunch, BridgeProcess, PipeTransport};

use crate::config::SessionConfig;
use crate::driver::{DriverEvent, DriverFactory, SessionDriver};
use crate::error::Result;

/// Driver over a live bridge process.
pub struct BridgeClient {
    connection: Arc<BridgeConnection>,
    process: Mutex<Option<BridgeProcess>>,
}

#[async_trait]
impl SessionDriver for BridgeClient {
    async fn initialize(&self) -> Result<()> {
        self.connection.send_command("init", json!({})).await?;
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        // Suppress the synthetic disconnect the connection would emit for
        // an unexpected transport end; this teardown is deliberate.
        self.connection.close();
        if let Err(error) = self.connection.send_command("destroy", json!({})).await {
            debug!(target = "watify.client", %error, "destroy command failed (ignored)");
        }

        if let Some(process) = self.process.lock().await.take() {
            process.shutdown().await?;
        }
        Ok(())
    }

    async fn send_message(&self, chat: &ChatId, body: &str) -> Result<SendReceipt> {
        let value = self
            .connection
            .send_command("send", json!({"chatId": chat.as_str(), "body": body}))
            .await?;
        let receipt: SendReceipt =
            serde_json::from_value(value).map_err(watify_runtime::Error::from)?;
        Ok(receipt)
    }

    async fn connection_state(&self) -> Result<String> {
        let value = self.connection.send_command("get_state", json!({})).await?;
        Ok(value.as_str().unwrap_or("UNKNOWN").to_string())
    }
}

/// Factory spawning one bridge process per driver instance.
pub struct BridgeFactory {
    config: SessionConfig,
}

impl BridgeFactory {
    pub fn new(config: SessionConfig) -> Arc<Self> {
        Arc::new(Self { config })
    }
}

#[async_trait]
impl DriverFactory for BridgeFactory {
    async fn create(&self, events: mpsc::Sender<DriverEvent>) -> Result<Arc<dyn SessionDriver>> {
        let mut process = BridgeProcess::launch(BridgeLaunch {
            client_id: &self.config.client_id,
            data_dir: self.config.data_dir.as_deref(),
        })
        .await?;

        let (stdin, stdout) = process.take_stdio()?;
        let (transport, inbound_rx) = PipeTransport::new(stdin, stdout);
        let (wire_tx, mut wire_rx) = mpsc::channel(self.config.event_buffer);
        let connection = BridgeConnection::start(transport, inbound_rx, wire_tx);

        // Translate wire events into driver events for the state machine.
        tokio::spawn(async move {
            while let Some(event) = wire_rx.recv().await {
                if events.send(map_event(event)).await.is_err() {
                    break;
                }
            }
        });

        Ok(Arc::new(BridgeClient {
            connection,
            process: Mutex::new(Some(process)),
        }))
    }
}

fn map_event(event: Event) -> DriverEvent {
    match event {
        Event::Qr { qr } => DriverEvent::Qr(qr),
        Event::Authenticated => DriverEvent::Authenticated,
        Event::Ready { info } => DriverEvent::Ready(info),
        Event::AuthFailure { message } => DriverEvent::AuthFailure(message),
        Event::Disconnected { reason } => DriverEvent::Disconnected(reason),
        Event::Error { message } => DriverEvent::Error(message),
        Event::Message { message } => DriverEvent::Message(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watify_protocol::SessionInfo;

    #[test]
    fn wire_events_map_one_to_one() {
        assert!(matches!(
            map_event(Event::Qr { qr: "2@x".into() }),
            DriverEvent::Qr(qr) if qr == "2@x"
        ));
        assert!(matches!(
            map_event(Event::Authenticated),
            DriverEvent::Authenticated
        ));
        assert!(matches!(
            map_event(Event::Ready {
                info: SessionInfo {
                    pushname: "Ops".into(),
                    wid: "92312".into()
                }
            }),
            DriverEvent::Ready(info) if info.wid == "92312"
        ));
        assert!(matches!(
            map_event(Event::Disconnected { reason: "LOGOUT".into() }),
            DriverEvent::Disconnected(reason) if reason == "LOGOUT"
        ));
    }
}

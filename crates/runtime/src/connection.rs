//! Command/reply correlation and event delivery for the bridge.
//!
//! One [`BridgeConnection`] owns three tasks:
//!
//! - a writer draining outbound commands into the transport
//! - a reader decoding frames off the bridge's stdout
//! - a dispatch loop correlating replies by id and forwarding lifecycle
//!   events, in arrival order, onto the bounded event channel
//!
//! Event ordering matters: the session state machine relies on seeing
//! events exactly as the bridge emitted them, so dispatch is a single
//! loop and event delivery awaits channel capacity instead of dropping.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use watify_protocol::{Command, ErrorPayload, Event, Message};

use crate::error::{Error, Result};
use crate::transport::PipeTransport;

type Callbacks = Arc<Mutex<HashMap<u32, oneshot::Sender<Result<Value>>>>>;

/// RAII cleanup for a pending callback whose future was dropped mid-await.
struct CallbackGuard {
    id: u32,
    callbacks: Callbacks,
    armed: bool,
}

impl Drop for CallbackGuard {
    fn drop(&mut self) {
        if self.armed && self.callbacks.lock().remove(&self.id).is_some() {
            debug!(target = "watify.bridge", id = self.id, "removed orphaned callback");
        }
    }
}

/// Live RPC connection to a bridge process.
pub struct BridgeConnection {
    last_id: AtomicU32,
    callbacks: Callbacks,
    outbound_tx: mpsc::UnboundedSender<Value>,
    closing: Arc<AtomicBool>,
}

impl BridgeConnection {
    /// Starts the connection over the given transport.
    ///
    /// `events_tx` receives every lifecycle event the bridge pushes, in
    /// emission order. When the transport ends without [`close`]
    /// (Self::close) having been called first, a synthetic
    /// [`Event::Disconnected`] is delivered so consumers notice the loss.
    pub fn start<W, R>(
        transport: PipeTransport<W, R>,
        inbound_rx: mpsc::UnboundedReceiver<Value>,
        events_tx: mpsc::Sender<Event>,
    ) -> Arc<Self>
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (mut sender, receiver) = transport.into_parts();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Value>();

        let connection = Arc::new(Self {
            last_id: AtomicU32::new(0),
            callbacks: Arc::new(Mutex::new(HashMap::new())),
            outbound_tx,
            closing: Arc::new(AtomicBool::new(false)),
        });

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(e) = sender.send(message).await {
                    error!(target = "watify.bridge", error = %e, "transport write error");
                    break;
                }
            }
        });

        tokio::spawn(async move {
            if let Err(e) = receiver.run().await {
                error!(target = "watify.bridge", error = %e, "transport read error");
            }
        });

        let dispatch = Arc::clone(&connection);
        tokio::spawn(async move {
            dispatch.run_dispatch(inbound_rx, events_tx).await;
        });

        connection
    }

    /// Sends a command and awaits the correlated reply payload.
    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.last_id.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = oneshot::channel();
        self.callbacks.lock().insert(id, tx);
        let mut guard = CallbackGuard {
            id,
            callbacks: Arc::clone(&self.callbacks),
            armed: true,
        };

        let command = Command {
            id,
            method: method.to_string(),
            params,
        };
        debug!(target = "watify.bridge", id, method, "sending command");

        if self.outbound_tx.send(serde_json::to_value(&command)?).is_err() {
            return Err(Error::ChannelClosed);
        }

        let result = rx.await.map_err(|_| Error::ChannelClosed).and_then(|r| r);
        guard.armed = false;
        result
    }

    /// Marks the connection as intentionally shutting down, suppressing
    /// the synthetic disconnect event when the transport ends.
    pub fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);
    }

    async fn run_dispatch(
        &self,
        mut inbound_rx: mpsc::UnboundedReceiver<Value>,
        events_tx: mpsc::Sender<Event>,
    ) {
        while let Some(raw) = inbound_rx.recv().await {
            match serde_json::from_value::<Message>(raw) {
                Ok(Message::Reply(reply)) => {
                    let callback = self.callbacks.lock().remove(&reply.id);
                    match callback {
                        Some(tx) => {
                            let result = match reply.error {
                                Some(payload) => Err(remote_error(payload)),
                                None => Ok(reply.result.unwrap_or(Value::Null)),
                            };
                            let _ = tx.send(result);
                        }
                        None => {
                            warn!(
                                target = "watify.bridge",
                                id = reply.id,
                                "reply for unknown command (ignored)"
                            );
                        }
                    }
                }
                Ok(Message::Event(event)) => {
                    if events_tx.send(event).await.is_err() {
                        debug!(target = "watify.bridge", "event consumer gone; stopping dispatch");
                        break;
                    }
                }
                Ok(Message::Unknown(value)) => {
                    debug!(target = "watify.bridge", frame = %value, "unknown frame (ignored)");
                }
                Err(e) => {
                    error!(target = "watify.bridge", error = %e, "failed to parse frame");
                }
            }
        }

        // The transport ended. Fail anything still waiting for a reply.
        let pending: Vec<_> = {
            let mut callbacks = self.callbacks.lock();
            callbacks.drain().collect()
        };
        for (_, tx) in pending {
            let _ = tx.send(Err(Error::ChannelClosed));
        }

        if !self.closing.load(Ordering::SeqCst) {
            let _ = events_tx
                .send(Event::Disconnected {
                    reason: "bridge connection closed".to_string(),
                })
                .await;
        }
    }
}

/// Converts a bridge [`ErrorPayload`] into [`Error::Remote`].
fn remote_error(payload: ErrorPayload) -> Error {
    Error::Remote {
        name: payload.name.unwrap_or_else(|| "Error".to_string()),
        message: payload.message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    struct Harness {
        connection: Arc<BridgeConnection>,
        events_rx: mpsc::Receiver<Event>,
        from_rust: tokio::io::ReadHalf<tokio::io::DuplexStream>,
        to_rust: tokio::io::DuplexStream,
    }

    fn harness() -> Harness {
        let (stdin_read, stdin_write) = duplex(4096);
        let (stdout_read, stdout_write) = duplex(4096);

        let (transport, inbound_rx) = PipeTransport::new(stdin_write, stdout_read);
        let (events_tx, events_rx) = mpsc::channel(16);
        let connection = BridgeConnection::start(transport, inbound_rx, events_tx);

        let (from_rust, _unused) = tokio::io::split(stdin_read);
        Harness {
            connection,
            events_rx,
            from_rust,
            to_rust: stdout_write,
        }
    }

    async fn read_command(reader: &mut (impl tokio::io::AsyncRead + Unpin)) -> Command {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf).await.unwrap();
        let mut payload = vec![0u8; u32::from_le_bytes(len_buf) as usize];
        reader.read_exact(&mut payload).await.unwrap();
        serde_json::from_slice(&payload).unwrap()
    }

    async fn write_frame(writer: &mut (impl tokio::io::AsyncWrite + Unpin), value: Value) {
        let payload = serde_json::to_vec(&value).unwrap();
        writer
            .write_all(&(payload.len() as u32).to_le_bytes())
            .await
            .unwrap();
        writer.write_all(&payload).await.unwrap();
        writer.flush().await.unwrap();
    }

    #[tokio::test]
    async fn correlates_reply_by_id() {
        let mut h = harness();

        let connection = Arc::clone(&h.connection);
        let call = tokio::spawn(async move {
            connection
                .send_command("get_state", serde_json::json!({}))
                .await
        });

        let command = read_command(&mut h.from_rust).await;
        assert_eq!(command.method, "get_state");

        write_frame(
            &mut h.to_rust,
            serde_json::json!({"id": command.id, "result": "CONNECTED"}),
        )
        .await;

        let result = call.await.unwrap().unwrap();
        assert_eq!(result, "CONNECTED");
    }

    #[tokio::test]
    async fn error_reply_becomes_remote_error() {
        let mut h = harness();

        let connection = Arc::clone(&h.connection);
        let call = tokio::spawn(async move {
            connection
                .send_command("send", serde_json::json!({"chatId": "1@c.us", "body": "x"}))
                .await
        });

        let command = read_command(&mut h.from_rust).await;
        write_frame(
            &mut h.to_rust,
            serde_json::json!({
                "id": command.id,
                "error": {"message": "Session closed.", "name": "ProtocolError"}
            }),
        )
        .await;

        let err = call.await.unwrap().unwrap_err();
        assert!(err.is_session_closed());
        assert!(err.to_string().contains("ProtocolError"));
    }

    #[tokio::test]
    async fn events_arrive_in_emission_order() {
        let mut h = harness();

        write_frame(
            &mut h.to_rust,
            serde_json::json!({"event": "qr", "params": {"qr": "2@payload"}}),
        )
        .await;
        write_frame(&mut h.to_rust, serde_json::json!({"event": "authenticated"})).await;

        assert!(matches!(
            h.events_rx.recv().await.unwrap(),
            Event::Qr { qr } if qr == "2@payload"
        ));
        assert!(matches!(
            h.events_rx.recv().await.unwrap(),
            Event::Authenticated
        ));
    }

    #[tokio::test]
    async fn transport_end_fails_pending_and_reports_disconnect() {
        let mut h = harness();

        let connection = Arc::clone(&h.connection);
        let call =
            tokio::spawn(
                async move { connection.send_command("init", serde_json::json!({})).await },
            );

        // Wait for the command to be in flight before severing the pipe.
        let _ = read_command(&mut h.from_rust).await;
        drop(h.to_rust);

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::ChannelClosed));

        assert!(matches!(
            h.events_rx.recv().await.unwrap(),
            Event::Disconnected { .. }
        ));
    }

    #[tokio::test]
    async fn close_suppresses_synthetic_disconnect() {
        let mut h = harness();

        h.connection.close();
        drop(h.to_rust);

        assert!(h.events_rx.recv().await.is_none());
    }
}

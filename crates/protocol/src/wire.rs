//! Message framing for the bridge protocol.
//!
//! Three message kinds flow over the pipe:
//!
//! - [`Command`]: Rust → bridge, carries a sequential `id` for correlation
//! - [`Reply`]: bridge → Rust, echoes the `id` with a result or error
//! - [`Event`]: bridge → Rust, unsolicited lifecycle notification (no `id`)
//!
//! Replies and events share one stream, so incoming frames are decoded
//! through the untagged [`Message`] union: anything with an `id` is a
//! reply, anything with an `event` discriminator is an event, and
//! unrecognized frames are kept as raw JSON for forward compatibility.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{IncomingMessage, SessionInfo};

/// Command sent to the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    /// Sequential request id for correlating the reply.
    pub id: u32,
    /// Method name (`init`, `send`, `get_state`, `destroy`).
    pub method: String,
    /// Method parameters as a JSON object.
    #[serde(default)]
    pub params: Value,
}

/// Reply to a [`Command`], correlated by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    /// Request id this reply answers.
    pub id: u32,
    /// Success payload (mutually exclusive with `error`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure payload (mutually exclusive with `result`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

/// Error details carried in a failed [`Reply`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human-readable error message.
    pub message: String,
    /// Error class name reported by the bridge (e.g. `ProtocolError`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Unsolicited lifecycle event pushed by the bridge.
///
/// The discriminator values match the event names of the underlying
/// automation library, so the bridge can forward them verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "params", rename_all = "snake_case")]
pub enum Event {
    /// A QR code is awaiting scan; carries the raw payload to render.
    Qr { qr: String },
    /// Credentials were accepted; session restore is in progress.
    Authenticated,
    /// The session is fully connected and can send.
    Ready { info: SessionInfo },
    /// Credentials were rejected.
    AuthFailure { message: String },
    /// The session lost its connection.
    Disconnected { reason: String },
    /// The bridge reported an error outside any command.
    Error { message: String },
    /// An inbound message was observed.
    Message { message: IncomingMessage },
}

/// Discriminated union of frames arriving from the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    /// Correlated reply (has an `id` field).
    Reply(Reply),
    /// Lifecycle event (has an `event` field).
    Event(Event),
    /// Unknown frame, preserved for forward compatibility.
    Unknown(Value),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_reply() {
        let json = r#"{"id": 7, "result": {"id": "true_923@c.us_AAA", "timestamp": 1718000000}}"#;
        match serde_json::from_str::<Message>(json).unwrap() {
            Message::Reply(reply) => {
                assert_eq!(reply.id, 7);
                assert!(reply.result.is_some());
                assert!(reply.error.is_none());
            }
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[test]
    fn decodes_error_reply() {
        let json = r#"{"id": 3, "error": {"message": "Session closed.", "name": "ProtocolError"}}"#;
        match serde_json::from_str::<Message>(json).unwrap() {
            Message::Reply(reply) => {
                let error = reply.error.unwrap();
                assert_eq!(error.message, "Session closed.");
                assert_eq!(error.name.as_deref(), Some("ProtocolError"));
            }
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[test]
    fn decodes_lifecycle_events() {
        let qr = r#"{"event": "qr", "params": {"qr": "2@abcdef"}}"#;
        assert!(matches!(
            serde_json::from_str::<Message>(qr).unwrap(),
            Message::Event(Event::Qr { .. })
        ));

        let ready = r#"{"event": "ready", "params": {"info": {"pushname": "Ops", "wid": "923125331072"}}}"#;
        match serde_json::from_str::<Message>(ready).unwrap() {
            Message::Event(Event::Ready { info }) => assert_eq!(info.pushname, "Ops"),
            other => panic!("expected ready event, got {other:?}"),
        }

        let auth = r#"{"event": "authenticated"}"#;
        assert!(matches!(
            serde_json::from_str::<Message>(auth).unwrap(),
            Message::Event(Event::Authenticated)
        ));

        let gone = r#"{"event": "disconnected", "params": {"reason": "NAVIGATION"}}"#;
        match serde_json::from_str::<Message>(gone).unwrap() {
            Message::Event(Event::Disconnected { reason }) => assert_eq!(reason, "NAVIGATION"),
            other => panic!("expected disconnected event, got {other:?}"),
        }
    }

    #[test]
    fn unknown_frames_are_preserved() {
        let json = r#"{"jsonrpc": "2.0", "something": 1}"#;
        assert!(matches!(
            serde_json::from_str::<Message>(json).unwrap(),
            Message::Unknown(_)
        ));
    }

    #[test]
    fn command_round_trip() {
        let command = Command {
            id: 1,
            method: "send".to_string(),
            params: serde_json::json!({"chatId": "923125331072@c.us", "body": "hello"}),
        };
        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(value["id"], 1);
        assert_eq!(value["method"], "send");
        assert_eq!(value["params"]["chatId"], "923125331072@c.us");
    }
}

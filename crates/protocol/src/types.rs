//! Domain types shared across the bridge boundary.

use serde::{Deserialize, Serialize};

/// Service suffix for direct (person-to-person) chats.
pub const USER_SUFFIX: &str = "@c.us";

/// Service suffix for group chats.
pub const GROUP_SUFFIX: &str = "@g.us";

/// A chat address in the form the bridge expects (`<digits>@c.us`).
///
/// Recipients arrive as free-form phone numbers (`+92 312 5331072`,
/// `0312-5331072`, ...). Normalization strips everything that is not a
/// digit and appends the service suffix. Input that already carries an
/// `@` suffix is assumed to be a fully-qualified chat id and passes
/// through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(String);

impl ChatId {
    /// Normalizes a recipient into a chat id.
    ///
    /// Returns [`None`] when the input contains no digits at all, which
    /// callers should treat as an invalid recipient rather than retry.
    pub fn normalize(recipient: &str) -> Option<Self> {
        let trimmed = recipient.trim();
        if trimmed.contains('@') {
            return Some(Self(trimmed.to_string()));
        }

        let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return None;
        }

        Some(Self(format!("{digits}{USER_SUFFIX}")))
    }

    /// Returns the wire representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for group chat addresses.
    pub fn is_group(&self) -> bool {
        self.0.ends_with(GROUP_SUFFIX)
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Acknowledgement returned by the bridge for a delivered message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReceipt {
    /// Serialized message id assigned by the external service.
    pub id: String,
    /// Unix timestamp (seconds) reported by the service.
    pub timestamp: i64,
}

/// Identity of the authenticated account, reported with the `ready` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Display name of the account.
    pub pushname: String,
    /// Account id (the `wid` user part).
    pub wid: String,
}

/// An inbound message observed by the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    /// Chat id the message arrived from.
    pub from: String,
    /// Message body text.
    pub body: String,
    /// Unix timestamp (seconds).
    pub timestamp: i64,
    /// Whether the message was sent by the session's own account.
    #[serde(default)]
    pub from_me: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_formatting() {
        let chat = ChatId::normalize("+92 312-5331072").unwrap();
        assert_eq!(chat.as_str(), "923125331072@c.us");
    }

    #[test]
    fn normalize_passes_qualified_ids_through() {
        let chat = ChatId::normalize("923125331072@c.us").unwrap();
        assert_eq!(chat.as_str(), "923125331072@c.us");

        let group = ChatId::normalize("1203630+5331@g.us").unwrap();
        assert_eq!(group.as_str(), "1203630+5331@g.us");
        assert!(group.is_group());
    }

    #[test]
    fn normalize_rejects_digitless_input() {
        assert!(ChatId::normalize("not a number").is_none());
        assert!(ChatId::normalize("").is_none());
        assert!(ChatId::normalize("   ").is_none());
    }

    #[test]
    fn chat_id_serializes_transparently() {
        let chat = ChatId::normalize("0312 5331072").unwrap();
        let json = serde_json::to_string(&chat).unwrap();
        assert_eq!(json, "\"03125331072@c.us\"");
    }
}

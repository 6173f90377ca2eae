//! JSON wire documents.
//!
//! Every document is a JSON object whose `type` field selects the payload.
//! Outbound documents are [`ClientMessage`], inbound are [`ServerMessage`].
//!
//! # Invariants
//!
//! - Each variant serializes with exactly one `type` string, returned by
//!   `kind()`.
//! - [`ServerMessage::decode`] reports an unrecognized `type` as
//!   [`ProtocolError::UnknownType`] before attempting a typed parse, so a
//!   newer server never surfaces as a parse failure.

pub mod inbound;
pub mod outbound;

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// Messages the client sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Authenticate the socket.
    Auth(outbound::Auth),
    /// Post to the main channel.
    UserMessage(outbound::UserMessage),
    /// Post to a peer.
    PrivateMessage(outbound::PrivateMessage),
    /// Local user started composing.
    TypingStart(outbound::Typing),
    /// Local user stopped composing.
    TypingStop(outbound::Typing),
    /// Ask for a presence snapshot.
    GetOnlineUsers,
    /// Rename the local user.
    UpdateDisplayName(outbound::UpdateDisplayName),
}

impl ClientMessage {
    /// Wire `type` of this message.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::UserMessage(_) => "userMessage",
            Self::PrivateMessage(_) => "privateMessage",
            Self::TypingStart(_) => "typingStart",
            Self::TypingStop(_) => "typingStop",
            Self::GetOnlineUsers => "getOnlineUsers",
            Self::UpdateDisplayName(_) => "updateDisplayName",
        }
    }

    /// Serialize to a single JSON document.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| ProtocolError::Encode { kind: self.kind(), reason: e.to_string() })
    }
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Auth request accepted.
    AuthSuccess(inbound::AuthSuccess),
    /// Auth request rejected.
    AuthError(inbound::AuthError),
    /// Message in the main channel.
    UserMessage(inbound::ChatPayload),
    /// Message in a private conversation.
    PrivateMessage(inbound::ChatPayload),
    /// Server notice.
    SystemAlert(inbound::SystemAlert),
    /// Presence snapshot.
    OnlineUsers(inbound::OnlineUsers),
    /// User connected.
    UserJoined(inbound::UserJoined),
    /// User disconnected.
    UserLeft(inbound::UserLeft),
    /// Remote user started composing.
    TypingStart(inbound::TypingNotice),
    /// Remote user stopped composing.
    TypingStop(inbound::TypingNotice),
}

impl ServerMessage {
    /// Every `type` value this client understands.
    pub const KNOWN_TYPES: [&'static str; 10] = [
        "authSuccess",
        "authError",
        "userMessage",
        "privateMessage",
        "systemAlert",
        "onlineUsers",
        "userJoined",
        "userLeft",
        "typingStart",
        "typingStop",
    ];

    /// Wire `type` of this message.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AuthSuccess(_) => "authSuccess",
            Self::AuthError(_) => "authError",
            Self::UserMessage(_) => "userMessage",
            Self::PrivateMessage(_) => "privateMessage",
            Self::SystemAlert(_) => "systemAlert",
            Self::OnlineUsers(_) => "onlineUsers",
            Self::UserJoined(_) => "userJoined",
            Self::UserLeft(_) => "userLeft",
            Self::TypingStart(_) => "typingStart",
            Self::TypingStop(_) => "typingStop",
        }
    }

    /// Parse one framed document.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Malformed` if the text is not JSON, or a known type
    ///   is missing required fields
    /// - `ProtocolError::MissingType` if there is no string `type` field
    /// - `ProtocolError::UnknownType` if the type is not in
    ///   [`Self::KNOWN_TYPES`]
    pub fn decode(document: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(document)?;

        let Some(kind) = value.get("type").and_then(serde_json::Value::as_str) else {
            return Err(ProtocolError::MissingType);
        };

        if !Self::KNOWN_TYPES.contains(&kind) {
            return Err(ProtocolError::UnknownType(kind.to_string()));
        }

        Ok(serde_json::from_value(value)?)
    }

    /// Serialize to a single JSON document.
    ///
    /// Clients never send these; simulated servers and tests do.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| ProtocolError::Encode { kind: self.kind(), reason: e.to_string() })
    }
}

/// Timestamp as sent by the server: RFC 3339 text or epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    /// Milliseconds since the Unix epoch (integer or float).
    Millis(serde_json::Number),
    /// RFC 3339 / ISO 8601 string.
    Text(String),
}

impl WireTimestamp {
    /// Milliseconds since the Unix epoch, if this is a numeric timestamp.
    pub fn as_millis(&self) -> Option<i64> {
        match self {
            Self::Millis(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Self::Text(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_minimal_auth_success() {
        let msg = ServerMessage::decode(r#"{"type":"authSuccess"}"#).unwrap();
        assert_eq!(msg, ServerMessage::AuthSuccess(inbound::AuthSuccess::default()));
    }

    #[test]
    fn decode_private_message_without_optional_fields() {
        let msg = ServerMessage::decode(
            r#"{"type":"privateMessage","senderId":"bob","content":"hi","recipientId":"alice"}"#,
        )
        .unwrap();

        let ServerMessage::PrivateMessage(payload) = msg else {
            panic!("expected private message, got {msg:?}");
        };
        assert_eq!(payload.sender_id, "bob");
        assert_eq!(payload.content, "hi");
        assert_eq!(payload.recipient_id.as_deref(), Some("alice"));
        assert_eq!(payload.sender_name, None);
        assert_eq!(payload.timestamp, None);
    }

    #[test]
    fn decode_ignores_unknown_fields() {
        let msg =
            ServerMessage::decode(r#"{"type":"userLeft","userId":"bob","room":"x","extra":[1]}"#)
                .unwrap();
        assert_eq!(msg.kind(), "userLeft");
    }

    #[test]
    fn decode_numeric_and_text_timestamps() {
        let numeric = ServerMessage::decode(
            r#"{"type":"userMessage","senderId":"a","content":"x","timestamp":1700000000000}"#,
        )
        .unwrap();
        let ServerMessage::UserMessage(payload) = numeric else { panic!("wrong variant") };
        assert_eq!(payload.timestamp.and_then(|t| t.as_millis()), Some(1_700_000_000_000));

        let text = ServerMessage::decode(
            r#"{"type":"userMessage","senderId":"a","content":"x","timestamp":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let ServerMessage::UserMessage(payload) = text else { panic!("wrong variant") };
        assert_eq!(payload.timestamp, Some(WireTimestamp::Text("2024-01-01T00:00:00Z".into())));
    }

    #[test]
    fn unknown_type_is_not_a_parse_failure() {
        let err = ServerMessage::decode(r#"{"type":"reaction","emoji":"+1"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownType("reaction".into()));
        assert!(!err.is_malformed());
    }

    #[test]
    fn missing_type_is_reported() {
        assert_eq!(ServerMessage::decode(r#"{"content":"x"}"#), Err(ProtocolError::MissingType));
        assert_eq!(ServerMessage::decode("[1,2]"), Err(ProtocolError::MissingType));
    }

    #[test]
    fn known_type_with_wrong_shape_is_malformed() {
        let err = ServerMessage::decode(r#"{"type":"userMessage","content":"no sender"}"#)
            .unwrap_err();
        assert!(err.is_malformed());

        let err = ServerMessage::decode(r#"{"type":"authSuccess""#).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn kinds_match_known_types() {
        let all = [
            ServerMessage::AuthSuccess(inbound::AuthSuccess::default()),
            ServerMessage::AuthError(inbound::AuthError::default()),
            ServerMessage::SystemAlert(inbound::SystemAlert::default()),
            ServerMessage::OnlineUsers(inbound::OnlineUsers::default()),
        ];
        for msg in all {
            assert!(ServerMessage::KNOWN_TYPES.contains(&msg.kind()));
            let encoded = msg.encode().unwrap();
            assert_eq!(ServerMessage::decode(&encoded).unwrap(), msg);
        }
    }
}

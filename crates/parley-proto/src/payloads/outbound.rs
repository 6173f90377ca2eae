//! Client-to-server payload bodies.
//!
//! Field names are camelCase on the wire. Timestamps are RFC 3339 strings
//! produced by the caller.

use serde::{Deserialize, Serialize};

/// Authentication request, sent once per socket right after it opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Auth {
    /// Bearer token presented to the server.
    pub token: String,
    /// Team the user belongs to.
    pub team_id: String,
    /// Stable user id.
    pub user_id: String,
    /// Name shown to other users.
    pub display_name: String,
}

/// Message to the team's main channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMessage {
    /// Trimmed message text.
    pub content: String,
    /// Sending user id.
    pub sender_id: String,
    /// Sending user's display name.
    pub sender_name: String,
    /// Team scope.
    pub team_id: String,
    /// RFC 3339 send time.
    pub timestamp: String,
}

/// One-to-one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateMessage {
    /// Trimmed message text.
    pub content: String,
    /// Sending user id.
    pub sender_id: String,
    /// Sending user's display name.
    pub sender_name: String,
    /// Peer receiving the message.
    pub recipient_id: String,
    /// Team scope.
    pub team_id: String,
    /// RFC 3339 send time.
    pub timestamp: String,
}

/// Typing indicator body, shared by `typingStart` and `typingStop`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Typing {
    /// Typing user id.
    pub user_id: String,
    /// Typing user's display name.
    pub user_name: String,
    /// Peer for a private conversation; `None` for the main channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    /// Team scope.
    pub team_id: String,
}

/// Display name change announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDisplayName {
    /// New display name.
    pub display_name: String,
    /// User being renamed.
    pub user_id: String,
    /// Team scope.
    pub team_id: String,
}

//! Mapping from wire documents to domain events.
//!
//! Pure: no state, no I/O. The connection manager supplies the local user id
//! and the receive time through [`RouteContext`], and applies the state
//! effects (authentication, connection status) of the returned events itself.

use chrono::{DateTime, Utc};
use parley_proto::{ServerMessage, WireTimestamp, payloads::inbound::ChatPayload};

use crate::{
    connection::ConnectionState,
    error::ConnectionError,
    event::{ChatEvent, InboundMessage, MessageKind, Peer},
};

/// Notice published when the server accepts authentication.
pub const AUTH_SUCCESS_NOTICE: &str = "Successfully connected to chat";

/// Per-document inputs the router cannot know on its own.
#[derive(Debug, Clone, Copy)]
pub struct RouteContext<'a> {
    /// Local user id, used to flag own messages. `None` before `connect`.
    pub self_id: Option<&'a str>,
    /// When the chunk arrived; fallback for missing server timestamps.
    pub received_at: DateTime<Utc>,
}

/// Maps decoded documents to [`ChatEvent`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageRouter;

impl MessageRouter {
    /// Create a router.
    pub fn new() -> Self {
        Self
    }

    /// Decode one framed document and route it.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::Parse` if the document is not valid JSON or lacks
    ///   a `type`
    /// - `ConnectionError::Protocol` if the `type` is not recognized
    pub fn route(
        &self,
        document: &str,
        ctx: &RouteContext<'_>,
    ) -> Result<Vec<ChatEvent>, ConnectionError> {
        let message = ServerMessage::decode(document)?;
        Ok(self.route_message(message, ctx))
    }

    /// Route an already decoded message.
    pub fn route_message(&self, message: ServerMessage, ctx: &RouteContext<'_>) -> Vec<ChatEvent> {
        let at = ctx.received_at;

        match message {
            ServerMessage::AuthSuccess(_) => vec![
                ChatEvent::ConnectionStatusChange(ConnectionState::Authenticated),
                ChatEvent::AuthStatusChange(true),
                ChatEvent::system(AUTH_SUCCESS_NOTICE, at),
            ],
            ServerMessage::AuthError(err) => vec![
                ChatEvent::ConnectionStatusChange(ConnectionState::AuthFailed),
                ChatEvent::AuthStatusChange(false),
                ChatEvent::system(auth_failure_notice(err.message.as_deref()), at),
            ],
            ServerMessage::UserMessage(payload) => {
                vec![ChatEvent::Message(normalize_chat(MessageKind::User, payload, ctx))]
            },
            ServerMessage::PrivateMessage(payload) => {
                vec![ChatEvent::Message(normalize_chat(MessageKind::Private, payload, ctx))]
            },
            ServerMessage::SystemAlert(alert) => vec![ChatEvent::system(alert.message, at)],
            ServerMessage::OnlineUsers(list) => {
                let peers = list
                    .users
                    .into_iter()
                    .map(|u| {
                        let display_name = name_or_id(u.display_name, &u.user_id);
                        Peer { user_id: u.user_id, display_name }
                    })
                    .collect();
                vec![ChatEvent::OnlineUsersUpdate(peers)]
            },
            ServerMessage::UserJoined(joined) => {
                let user_name = name_or_id(joined.user_name, &joined.user_id);
                vec![ChatEvent::UserJoined {
                    user_id: joined.user_id,
                    user_name,
                    display_name: non_empty(joined.display_name),
                    at,
                }]
            },
            ServerMessage::UserLeft(left) => {
                let user_name = name_or_id(left.user_name, &left.user_id);
                vec![ChatEvent::UserLeft { user_id: left.user_id, user_name, at }]
            },
            ServerMessage::TypingStart(notice) => {
                let user_name = name_or_id(notice.user_name, &notice.user_id);
                vec![ChatEvent::TypingStart {
                    user_id: notice.user_id,
                    user_name,
                    recipient_id: non_empty(notice.recipient_id),
                }]
            },
            ServerMessage::TypingStop(notice) => vec![ChatEvent::TypingStop {
                user_id: notice.user_id,
                recipient_id: non_empty(notice.recipient_id),
            }],
        }
    }
}

/// System notice text for a rejected authentication.
pub fn auth_failure_notice(reason: Option<&str>) -> String {
    format!("Authentication failed: {}", reason.unwrap_or("unknown reason"))
}

fn normalize_chat(
    kind: MessageKind,
    payload: ChatPayload,
    ctx: &RouteContext<'_>,
) -> InboundMessage {
    let recipient_id = non_empty(payload.recipient_id);
    let is_private = kind == MessageKind::Private || recipient_id.is_some();
    let is_own = ctx.self_id == Some(payload.sender_id.as_str());
    let sender_name = name_or_id(payload.sender_name, &payload.sender_id);
    let timestamp = resolve_timestamp(payload.timestamp.as_ref()).unwrap_or(ctx.received_at);

    InboundMessage {
        kind,
        content: payload.content,
        sender_id: payload.sender_id,
        sender_name,
        recipient_id,
        timestamp,
        is_own,
        is_private,
    }
}

/// Parse a server timestamp. `None` if it is out of range or not RFC 3339.
fn resolve_timestamp(timestamp: Option<&WireTimestamp>) -> Option<DateTime<Utc>> {
    match timestamp? {
        millis @ WireTimestamp::Millis(_) => {
            millis.as_millis().and_then(DateTime::<Utc>::from_timestamp_millis)
        },
        WireTimestamp::Text(text) => {
            DateTime::parse_from_rfc3339(text).ok().map(|t| t.with_timezone(&Utc))
        },
    }
}

/// Display name with the id as fallback.
fn name_or_id(name: Option<String>, id: &str) -> String {
    non_empty(name).unwrap_or_else(|| id.to_string())
}

/// Treat empty strings the same as absent fields.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

//! Fuzz target for the inbound pipeline: framing then routing
//!
//! # Strategy
//!
//! - Documents: every known `type` plus unknown ones, with fields that are
//!   missing, of the wrong JSON type, or holding braces and escapes
//! - Chunks: several documents concatenated, optionally separated by
//!   whitespace or garbage
//!
//! # Invariants
//!
//! - Routing NEVER panics; malformed documents yield structured errors
//! - An unknown `type` is a protocol error, never a parse error
//! - Message events resolve sender names to a non-empty value when the id
//!   is non-empty

#![no_main]

use arbitrary::Arbitrary;
use chrono::{TimeZone, Utc};
use libfuzzer_sys::fuzz_target;
use parley_core::{ChatEvent, ConnectionError, MessageRouter, RouteContext};
use parley_proto::{FrameDecoder, FramingStrategy, ProtocolError, ServerMessage};

#[derive(Debug, Arbitrary)]
struct Input {
    self_id: Option<String>,
    string_aware: bool,
    docs: Vec<Doc>,
}

#[derive(Debug, Arbitrary)]
enum Doc {
    Known { kind: KnownType, fields: Vec<(Field, Value)> },
    Unknown(String),
    Raw(String),
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum KnownType {
    AuthSuccess,
    AuthError,
    UserMessage,
    PrivateMessage,
    SystemAlert,
    OnlineUsers,
    UserJoined,
    UserLeft,
    TypingStart,
    TypingStop,
}

impl KnownType {
    fn wire(self) -> &'static str {
        match self {
            Self::AuthSuccess => "authSuccess",
            Self::AuthError => "authError",
            Self::UserMessage => "userMessage",
            Self::PrivateMessage => "privateMessage",
            Self::SystemAlert => "systemAlert",
            Self::OnlineUsers => "onlineUsers",
            Self::UserJoined => "userJoined",
            Self::UserLeft => "userLeft",
            Self::TypingStart => "typingStart",
            Self::TypingStop => "typingStop",
        }
    }
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum Field {
    Content,
    SenderId,
    SenderName,
    RecipientId,
    UserId,
    UserName,
    DisplayName,
    Message,
    Timestamp,
    Users,
}

impl Field {
    fn wire(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::SenderId => "senderId",
            Self::SenderName => "senderName",
            Self::RecipientId => "recipientId",
            Self::UserId => "userId",
            Self::UserName => "userName",
            Self::DisplayName => "displayName",
            Self::Message => "message",
            Self::Timestamp => "timestamp",
            Self::Users => "users",
        }
    }
}

#[derive(Debug, Arbitrary)]
enum Value {
    Text(String),
    Number(i64),
    Float(f64),
    Bool(bool),
    Null,
    Roster(Vec<(String, Option<String>)>),
}

fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Text(text) => quote(text),
        Value::Number(n) => n.to_string(),
        Value::Float(f) if f.is_finite() => f.to_string(),
        Value::Float(_) | Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Roster(users) => {
            let entries: Vec<String> = users
                .iter()
                .map(|(id, name)| match name {
                    Some(name) => {
                        format!(r#"{{"userId":{},"displayName":{}}}"#, quote(id), quote(name))
                    },
                    None => format!(r#"{{"userId":{}}}"#, quote(id)),
                })
                .collect();
            format!("[{}]", entries.join(","))
        },
    }
}

fn render(doc: &Doc) -> String {
    match doc {
        Doc::Known { kind, fields } => {
            let mut parts = vec![format!(r#""type":{}"#, quote(kind.wire()))];
            for (field, value) in fields {
                parts.push(format!("{}:{}", quote(field.wire()), render_value(value)));
            }
            format!("{{{}}}", parts.join(","))
        },
        Doc::Unknown(kind) => format!(r#"{{"type":{}}}"#, quote(kind)),
        Doc::Raw(text) => text.clone(),
    }
}

fuzz_target!(|input: Input| {
    let chunk: String = input.docs.iter().map(render).collect();
    let strategy =
        if input.string_aware { FramingStrategy::StringAware } else { FramingStrategy::BraceDepth };
    let decoded = FrameDecoder::new(strategy).decode(&chunk);

    let received_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let ctx = RouteContext { self_id: input.self_id.as_deref(), received_at };
    let router = MessageRouter::new();

    for frame in decoded.frames {
        match router.route(frame, &ctx) {
            Ok(events) => {
                for event in events {
                    if let ChatEvent::Message(message) = event {
                        if !message.sender_id.is_empty() {
                            assert!(!message.sender_name.is_empty());
                        }
                    }
                }
            },
            Err(ConnectionError::Protocol(_)) => match ServerMessage::decode(frame) {
                Err(ProtocolError::UnknownType(kind)) => {
                    assert!(!ServerMessage::KNOWN_TYPES.contains(&kind.as_str()));
                },
                other => panic!("protocol error for a known or broken document: {other:?}"),
            },
            Err(_) => {},
        }
    }
});

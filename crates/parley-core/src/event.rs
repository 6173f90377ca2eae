//! Domain events published on the session bus.
//!
//! Every inbound document maps to zero or more [`ChatEvent`]s. Payloads are
//! normalized: optional names have fallbacks applied and timestamps are
//! resolved, so subscribers never deal with wire quirks.

use chrono::{DateTime, Utc};

use crate::{bus::Event, connection::ConnectionState};

/// Name under which listeners subscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// Connection state changed
    ConnectionStatusChange,
    /// Authentication flag changed
    AuthStatusChange,
    /// Notice for the main channel
    SystemMessage,
    /// Chat message from a user
    Message,
    /// Full presence snapshot
    OnlineUsersUpdate,
    /// User connected
    UserJoined,
    /// User disconnected
    UserLeft,
    /// Remote user started composing
    TypingStart,
    /// Remote user stopped composing
    TypingStop,
}

impl EventKind {
    /// Every event kind, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::ConnectionStatusChange,
        Self::AuthStatusChange,
        Self::SystemMessage,
        Self::Message,
        Self::OnlineUsersUpdate,
        Self::UserJoined,
        Self::UserLeft,
        Self::TypingStart,
        Self::TypingStop,
    ];

    /// Event name as exposed to presentation code.
    pub const fn name(self) -> &'static str {
        match self {
            Self::ConnectionStatusChange => "connectionStatusChange",
            Self::AuthStatusChange => "authStatusChange",
            Self::SystemMessage => "systemMessage",
            Self::Message => "message",
            Self::OnlineUsersUpdate => "onlineUsersUpdate",
            Self::UserJoined => "userJoined",
            Self::UserLeft => "userLeft",
            Self::TypingStart => "typingStart",
            Self::TypingStop => "typingStop",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Origin of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Synthesized locally or sent as a server notice
    System,
    /// Main channel message
    User,
    /// One-to-one message
    Private,
}

/// Normalized chat message as delivered by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// `User` or `Private`, from the wire type
    pub kind: MessageKind,
    /// Message text
    pub content: String,
    /// Author id
    pub sender_id: String,
    /// Author display name, falling back to the id
    pub sender_name: String,
    /// Peer for private messages
    pub recipient_id: Option<String>,
    /// Server timestamp, or local receive time if absent
    pub timestamp: DateTime<Utc>,
    /// Author is the local user
    pub is_own: bool,
    /// Belongs to a private conversation
    pub is_private: bool,
}

/// Entry of the presence list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// User id
    pub user_id: String,
    /// Display name, falling back to the id
    pub display_name: String,
}

/// Domain event produced by the connection layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Connection state changed.
    ConnectionStatusChange(ConnectionState),

    /// Session became authenticated (`true`) or lost authentication.
    AuthStatusChange(bool),

    /// Notice destined for the main channel.
    SystemMessage {
        /// Notice text
        content: String,
        /// When the notice was produced
        at: DateTime<Utc>,
    },

    /// User or private message.
    Message(InboundMessage),

    /// Presence list replaced wholesale.
    OnlineUsersUpdate(Vec<Peer>),

    /// A user connected.
    UserJoined {
        /// User id
        user_id: String,
        /// Login name, falling back to the id
        user_name: String,
        /// Display name if the server sent one
        display_name: Option<String>,
        /// Local receive time
        at: DateTime<Utc>,
    },

    /// A user disconnected.
    UserLeft {
        /// User id
        user_id: String,
        /// Login name, falling back to the id
        user_name: String,
        /// Local receive time
        at: DateTime<Utc>,
    },

    /// A remote user started composing.
    TypingStart {
        /// Typing user
        user_id: String,
        /// Typing user's name, falling back to the id
        user_name: String,
        /// Set when composing a private message
        recipient_id: Option<String>,
    },

    /// A remote user stopped composing.
    TypingStop {
        /// Typing user
        user_id: String,
        /// Set when composing a private message
        recipient_id: Option<String>,
    },
}

impl ChatEvent {
    /// Kind this event is published under.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::ConnectionStatusChange(_) => EventKind::ConnectionStatusChange,
            Self::AuthStatusChange(_) => EventKind::AuthStatusChange,
            Self::SystemMessage { .. } => EventKind::SystemMessage,
            Self::Message(_) => EventKind::Message,
            Self::OnlineUsersUpdate(_) => EventKind::OnlineUsersUpdate,
            Self::UserJoined { .. } => EventKind::UserJoined,
            Self::UserLeft { .. } => EventKind::UserLeft,
            Self::TypingStart { .. } => EventKind::TypingStart,
            Self::TypingStop { .. } => EventKind::TypingStop,
        }
    }

    /// Convenience constructor for a system notice.
    pub fn system(content: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::SystemMessage { content: content.into(), at }
    }
}

impl Event for ChatEvent {
    type Kind = EventKind;

    fn kind(&self) -> EventKind {
        ChatEvent::kind(self)
    }
}

//! Observable chat state types.
//!
//! These structures are the view model the presentation layer renders:
//! channels with their messages and unread counters, typing keys and
//! presence entries. They carry no protocol details.

use std::fmt;

use chrono::{DateTime, Utc};
use parley_core::MessageKind;

/// Conversation scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelId {
    /// Team-wide channel. Always exists.
    Main,
    /// One-to-one conversation, keyed by the peer's user id.
    Private(String),
}

impl ChannelId {
    /// Peer of a private channel. `None` for main.
    pub fn peer(&self) -> Option<&str> {
        match self {
            Self::Main => None,
            Self::Private(peer) => Some(peer),
        }
    }

    /// Returns true for the main channel.
    pub fn is_main(&self) -> bool {
        matches!(self, Self::Main)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => f.write_str("main"),
            Self::Private(peer) => f.write_str(peer),
        }
    }
}

/// Session-unique message id, allocated from a monotonic counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

/// A message in a channel. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Unique within the session.
    pub id: MessageId,
    /// System notice, main channel message or private message.
    pub kind: MessageKind,
    /// Text.
    pub content: String,
    /// Author id; `"System"` for notices.
    pub sender_id: String,
    /// Author display name.
    pub sender_name: String,
    /// Peer for private messages.
    pub recipient_id: Option<String>,
    /// Send or receive time.
    pub timestamp: DateTime<Utc>,
    /// Written by the local user (optimistic copy).
    pub is_own: bool,
}

/// Ordered message log with an unread counter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Channel {
    messages: Vec<Message>,
    unread: usize,
}

impl Channel {
    /// Messages in arrival order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages received while the channel was inactive.
    pub fn unread(&self) -> usize {
        self.unread
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub(crate) fn mark_unread(&mut self) {
        self.unread += 1;
    }

    pub(crate) fn mark_read(&mut self) {
        self.unread = 0;
    }
}

/// Composite key of the typing indicator set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypingKey {
    /// Typing user.
    pub user_id: String,
    /// Channel the user is typing in, from the local user's point of view.
    pub channel: ChannelId,
}

impl TypingKey {
    /// Build a key.
    pub fn new(user_id: impl Into<String>, channel: ChannelId) -> Self {
        Self { user_id: user_id.into(), channel }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_ids_display_like_the_wire() {
        assert_eq!(ChannelId::Main.to_string(), "main");
        assert_eq!(ChannelId::Private("bob".into()).to_string(), "bob");
    }

    #[test]
    fn peer_named_main_is_not_the_main_channel() {
        let private = ChannelId::Private("main".into());
        assert!(!private.is_main());
        assert_ne!(private, ChannelId::Main);
        assert_ne!(TypingKey::new("bob", private), TypingKey::new("bob", ChannelId::Main));
    }

    #[test]
    fn unread_counter_resets() {
        let mut channel = Channel::default();
        channel.mark_unread();
        channel.mark_unread();
        assert_eq!(channel.unread(), 2);
        channel.mark_read();
        assert_eq!(channel.unread(), 0);
    }
}

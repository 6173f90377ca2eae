//! Plain-text rendering of session output.

use chrono::{DateTime, Utc};
use parley_app::{ChannelId, Message};
use parley_core::{ChatEvent, MessageKind};

fn clock(at: &DateTime<Utc>) -> String {
    at.format("%H:%M").to_string()
}

/// Line to print for a bus event, if it is worth showing.
///
/// The local user's own messages are skipped; they are printed when sent.
pub fn event_line(event: &ChatEvent) -> Option<String> {
    match event {
        ChatEvent::Message(message) if message.is_own => None,
        ChatEvent::Message(message) => {
            let tag = if message.is_private { " (dm)" } else { "" };
            Some(format!(
                "[{}]{tag} {}: {}",
                clock(&message.timestamp),
                message.sender_name,
                message.content
            ))
        },
        ChatEvent::SystemMessage { content, at } => Some(format!("[{}] * {content}", clock(at))),
        ChatEvent::UserJoined { user_name, display_name, at, .. } => {
            let name = display_name.as_deref().unwrap_or(user_name);
            Some(format!("[{}] * {name} joined the chat", clock(at)))
        },
        ChatEvent::UserLeft { user_name, at, .. } => {
            Some(format!("[{}] * {user_name} left the chat", clock(at)))
        },
        ChatEvent::OnlineUsersUpdate(peers) => {
            let names: Vec<_> = peers.iter().map(|p| p.display_name.as_str()).collect();
            Some(format!("-- online ({}): {}", names.len(), names.join(", ")))
        },
        ChatEvent::ConnectionStatusChange(state) => Some(format!("-- {state}")),
        _ => None,
    }
}

/// Line echoing a message from the local state.
pub fn message_line(message: &Message) -> String {
    let at = clock(&message.timestamp);
    match (&message.kind, &message.recipient_id) {
        (MessageKind::System, _) => format!("[{at}] * {}", message.content),
        (MessageKind::Private, Some(peer)) if message.is_own => {
            format!("[{at}] (dm to {peer}) {}: {}", message.sender_name, message.content)
        },
        _ => format!("[{at}] {}: {}", message.sender_name, message.content),
    }
}

/// Channel list with unread counters; the active one is starred.
pub fn channel_lines(
    channels: impl IntoIterator<Item = (ChannelId, usize)>,
    active: &ChannelId,
) -> Vec<String> {
    channels
        .into_iter()
        .map(|(id, unread)| {
            let marker = if &id == active { '*' } else { ' ' };
            match unread {
                0 => format!("{marker} {id}"),
                n => format!("{marker} {id} ({n} unread)"),
            }
        })
        .collect()
}

/// Prompt naming the active channel.
pub fn prompt(active: &ChannelId) -> String {
    format!("[{active}]>")
}

//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture the observable state of a session at a point in time.
//! Invariants operate on snapshots rather than live state to ensure
//! consistent, atomic checks.

use std::{collections::BTreeMap, ops::Sub, time::Duration};

use parley_app::{ChannelId, ChatStateStore, MessageId};
use parley_core::{ConnectionState, MessageKind};

/// Snapshot of one client's view-model.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Local user id, once known.
    pub self_id: Option<String>,
    /// Active channel.
    pub active: ChannelId,
    /// Every existing channel.
    pub channels: BTreeMap<ChannelId, ChannelSnapshot>,
    /// Mirrored connection state.
    pub connection: ConnectionState,
    /// Mirrored authentication flag.
    pub authenticated: bool,
    /// `(channel, user_id)` of every remote typing indicator.
    pub typing: Vec<(ChannelId, String)>,
}

impl SessionSnapshot {
    /// Capture the observable state of a store.
    pub fn capture<I>(store: &ChatStateStore<I>) -> Self
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        let mut channels = BTreeMap::new();
        channels.insert(ChannelId::Main, ChannelSnapshot::capture(store, &ChannelId::Main));
        for (peer, _) in store.private_channels() {
            let id = ChannelId::Private(peer.to_string());
            let snapshot = ChannelSnapshot::capture(store, &id);
            channels.insert(id, snapshot);
        }

        let typing = channels
            .keys()
            .flat_map(|channel| {
                store
                    .typing_users(channel)
                    .into_iter()
                    .map(|user| (channel.clone(), user.to_string()))
                    .collect::<Vec<_>>()
            })
            .collect();

        Self {
            self_id: store.self_id().map(str::to_string),
            active: store.active().clone(),
            channels,
            connection: store.connection_state(),
            authenticated: store.is_authenticated(),
            typing,
        }
    }
}

/// Snapshot of one channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelSnapshot {
    /// Ids in arrival order.
    pub message_ids: Vec<MessageId>,
    /// Kind of each message, parallel to `message_ids`.
    pub kinds: Vec<MessageKind>,
    /// Unread counter.
    pub unread: usize,
}

impl ChannelSnapshot {
    fn capture<I>(store: &ChatStateStore<I>, id: &ChannelId) -> Self
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        let messages = store.messages(id);
        Self {
            message_ids: messages.iter().map(|m| m.id).collect(),
            kinds: messages.iter().map(|m| m.kind).collect(),
            unread: store.unread(id),
        }
    }

    /// Messages that could have been counted as unread.
    pub fn countable(&self) -> usize {
        self.kinds.iter().filter(|kind| **kind != MessageKind::System).count()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use parley_app::StoreConfig;

    use super::*;

    #[test]
    fn fresh_store_has_only_main() {
        let store: ChatStateStore<Instant> = ChatStateStore::new(StoreConfig::default());
        let snapshot = SessionSnapshot::capture(&store);

        assert_eq!(snapshot.active, ChannelId::Main);
        assert_eq!(snapshot.channels.len(), 1);
        assert!(snapshot.typing.is_empty());
        assert_eq!(snapshot.connection, ConnectionState::Disconnected);
    }
}

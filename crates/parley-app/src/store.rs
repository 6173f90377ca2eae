//! Chat view-model state machine.
//!
//! [`ChatStateStore`] derives everything the presentation layer shows from
//! the domain event stream: channels, unread counters, typing indicators and
//! presence. It also owns the local composition (typing debounce) and the
//! optimistic copy of sent messages.
//!
//! Like the connection manager it performs no I/O: commands go through a
//! [`CommandSink`] and time is passed in.
//!
//! # Invariants
//!
//! - Exactly one channel is active, and it always exists.
//! - The active channel's unread counter never increments.
//! - System messages never increment an unread counter.
//! - At most one local composition is in progress; it sent exactly one
//!   typing-start and will send exactly one typing-stop.

use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap},
    ops::Sub,
    rc::Rc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use parley_core::{
    ChatEvent, ConnectionError, ConnectionManager, ConnectionState, Environment, EventBus,
    EventKind, InboundMessage, ListenerError, ListenerId, MessageKind, Peer,
};

use crate::state::{Channel, ChannelId, Message, MessageId, TypingKey};

/// Quiet period after the last keystroke before typing-stop is sent.
pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_millis(2000);

/// How long a remote typing indicator survives without a typing-stop.
pub const DEFAULT_REMOTE_TYPING_TTL: Duration = Duration::from_millis(5000);

/// Sender id and name of system notices.
pub const SYSTEM_SENDER: &str = "System";

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Local typing debounce
    pub typing_timeout: Duration,
    /// Remote typing indicator expiry
    pub remote_typing_ttl: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            typing_timeout: DEFAULT_TYPING_TIMEOUT,
            remote_typing_ttl: DEFAULT_REMOTE_TYPING_TTL,
        }
    }
}

/// Outbound side of the store's commands.
///
/// Implemented by [`ConnectionManager`]; tests substitute a recorder.
pub trait CommandSink {
    /// Post to the main channel.
    fn send_message(&mut self, content: &str, sent_at: DateTime<Utc>)
    -> Result<(), ConnectionError>;

    /// Post to a peer.
    fn send_private_message(
        &mut self,
        content: &str,
        recipient_id: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<(), ConnectionError>;

    /// Announce typing start (`true`) or stop.
    fn send_typing(
        &mut self,
        is_typing: bool,
        recipient_id: Option<&str>,
    ) -> Result<(), ConnectionError>;

    /// Rename the local user.
    fn update_display_name(&mut self, display_name: &str) -> Result<(), ConnectionError>;
}

impl<I> CommandSink for ConnectionManager<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    fn send_message(
        &mut self,
        content: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<(), ConnectionError> {
        ConnectionManager::send_message(self, content, sent_at)
    }

    fn send_private_message(
        &mut self,
        content: &str,
        recipient_id: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<(), ConnectionError> {
        ConnectionManager::send_private_message(self, content, recipient_id, sent_at)
    }

    fn send_typing(
        &mut self,
        is_typing: bool,
        recipient_id: Option<&str>,
    ) -> Result<(), ConnectionError> {
        ConnectionManager::send_typing(self, is_typing, recipient_id)
    }

    fn update_display_name(&mut self, display_name: &str) -> Result<(), ConnectionError> {
        ConnectionManager::update_display_name(self, display_name)
    }
}

/// The local user's in-progress message.
#[derive(Debug, Clone)]
struct Composition<I> {
    channel: ChannelId,
    last_keystroke: I,
}

/// Chat view-model state machine.
///
/// Generic over `Instant` to support both real time and virtual time for
/// deterministic testing.
#[derive(Debug)]
pub struct ChatStateStore<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    config: StoreConfig,
    self_id: Option<String>,
    display_name: String,
    connection: ConnectionState,
    authenticated: bool,
    main: Channel,
    private: BTreeMap<String, Channel>,
    active: ChannelId,
    /// user id -> display name
    presence: BTreeMap<String, String>,
    /// Remote typing indicators and when each was last refreshed
    typing: HashMap<TypingKey, I>,
    composing: Option<Composition<I>>,
    next_message_id: u64,
}

impl<I> ChatStateStore<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create an empty store with only the main channel.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            self_id: None,
            display_name: String::new(),
            connection: ConnectionState::Disconnected,
            authenticated: false,
            main: Channel::default(),
            private: BTreeMap::new(),
            active: ChannelId::Main,
            presence: BTreeMap::new(),
            typing: HashMap::new(),
            composing: None,
            next_message_id: 0,
        }
    }

    /// Subscribe `store` to every event kind on `bus`.
    ///
    /// Each listener reads the clock from `env` when the event arrives. A
    /// listener that finds the store already borrowed reports a
    /// [`ListenerError`] instead of panicking.
    pub fn attach<E>(
        store: &Rc<RefCell<Self>>,
        bus: &mut EventBus<ChatEvent>,
        env: E,
    ) -> Vec<(EventKind, ListenerId)>
    where
        E: Environment<Instant = I>,
        I: 'static,
    {
        EventKind::ALL
            .iter()
            .map(|&kind| {
                let store = Rc::clone(store);
                let env = env.clone();
                let id = bus.subscribe(kind, move |event| {
                    let mut store = store
                        .try_borrow_mut()
                        .map_err(|_| ListenerError::new("chat state is already borrowed"))?;
                    store.apply(event, env.now());
                    Ok(())
                });
                (kind, id)
            })
            .collect()
    }

    /// Remember who the local user is.
    ///
    /// Used to author optimistic messages and to ignore the user's own
    /// typing notifications. An empty display name falls back to the id.
    pub fn set_identity(&mut self, user_id: &str, display_name: &str) {
        self.self_id = Some(user_id.to_string());
        self.display_name =
            if display_name.is_empty() { user_id.to_string() } else { display_name.to_string() };
    }

    /// Apply one domain event.
    pub fn apply(&mut self, event: &ChatEvent, now: I) {
        match event {
            ChatEvent::ConnectionStatusChange(state) => self.connection = *state,
            ChatEvent::AuthStatusChange(authenticated) => {
                self.authenticated = *authenticated;
                if !authenticated {
                    // Socket is gone; the next keystroke starts a fresh composition.
                    self.composing = None;
                }
            },
            ChatEvent::SystemMessage { content, at } => self.push_system(content.clone(), *at),
            ChatEvent::Message(message) => self.on_message(message),
            ChatEvent::OnlineUsersUpdate(peers) => {
                self.presence = peers
                    .iter()
                    .map(|Peer { user_id, display_name }| (user_id.clone(), display_name.clone()))
                    .collect();
            },
            ChatEvent::UserJoined { user_id, user_name, display_name, at } => {
                let name = display_name.clone().unwrap_or_else(|| user_name.clone());
                self.presence.insert(user_id.clone(), name.clone());
                self.push_system(format!("{name} joined the chat"), *at);
            },
            ChatEvent::UserLeft { user_id, user_name, at } => {
                let name = self.presence.remove(user_id).unwrap_or_else(|| user_name.clone());
                self.typing.retain(|key, _| key.user_id != *user_id);
                self.push_system(format!("{name} left the chat"), *at);
            },
            ChatEvent::TypingStart { user_id, recipient_id, .. } => {
                if self.is_self(user_id) {
                    return;
                }
                let key = TypingKey::new(user_id.clone(), typing_channel(user_id, recipient_id));
                self.typing.insert(key, now);
            },
            ChatEvent::TypingStop { user_id, recipient_id } => {
                let key = TypingKey::new(user_id.clone(), typing_channel(user_id, recipient_id));
                self.typing.remove(&key);
            },
        }
    }

    /// Send `content` to the active channel and append the optimistic copy.
    ///
    /// Ends the local composition on success.
    ///
    /// # Errors
    ///
    /// Whatever the sink rejects with; nothing is appended in that case.
    pub fn send_message<S: CommandSink>(
        &mut self,
        sink: &mut S,
        content: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<MessageId, ConnectionError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ConnectionError::InvalidInput("content is empty"));
        }

        let channel = self.active.clone();
        match &channel {
            ChannelId::Main => sink.send_message(content, sent_at)?,
            ChannelId::Private(peer) => sink.send_private_message(content, peer, sent_at)?,
        }

        let id = self.allocate_id();
        let sender_id = self.self_id.clone().unwrap_or_default();
        let message = Message {
            id,
            kind: if channel.is_main() { MessageKind::User } else { MessageKind::Private },
            content: content.to_string(),
            sender_name: self.display_name.clone(),
            sender_id,
            recipient_id: channel.peer().map(str::to_string),
            timestamp: sent_at,
            is_own: true,
        };
        self.append(&channel, message);
        self.end_composition(sink);

        Ok(id)
    }

    /// Record a keystroke in the active channel's composer.
    ///
    /// The first keystroke of a composition sends typing-start. Every
    /// keystroke re-arms the debounce that [`Self::tick`] fires.
    ///
    /// # Errors
    ///
    /// The sink's error if typing-start could not be sent. No composition is
    /// started in that case.
    pub fn keystroke<S: CommandSink>(
        &mut self,
        sink: &mut S,
        now: I,
    ) -> Result<(), ConnectionError> {
        if let Some(composing) = self.composing.as_mut()
            && composing.channel == self.active
        {
            composing.last_keystroke = now;
            return Ok(());
        }

        self.end_composition(sink);
        sink.send_typing(true, self.active.peer())?;
        self.composing = Some(Composition { channel: self.active.clone(), last_keystroke: now });
        Ok(())
    }

    /// Fire expired timers: the local typing debounce and stale remote
    /// typing indicators.
    pub fn tick<S: CommandSink>(&mut self, sink: &mut S, now: I) {
        if let Some(composing) = &self.composing
            && now - composing.last_keystroke >= self.config.typing_timeout
        {
            self.end_composition(sink);
        }

        let ttl = self.config.remote_typing_ttl;
        self.typing.retain(|key, refreshed| {
            let alive = now - *refreshed < ttl;
            if !alive {
                tracing::debug!(
                    user = %key.user_id,
                    channel = %key.channel,
                    "typing indicator expired"
                );
            }
            alive
        });
    }

    /// Activate the main channel.
    pub fn switch_to_main<S: CommandSink>(&mut self, sink: &mut S) {
        self.activate(sink, ChannelId::Main);
    }

    /// Open (creating if needed) and activate a private channel.
    ///
    /// Returns `false` and changes nothing for the local user's own id.
    pub fn open_private_chat<S: CommandSink>(&mut self, sink: &mut S, peer: &str) -> bool {
        if peer.is_empty() || self.is_self(peer) {
            return false;
        }
        self.private.entry(peer.to_string()).or_default();
        self.activate(sink, ChannelId::Private(peer.to_string()));
        true
    }

    /// Discard a private channel and its messages.
    ///
    /// Closing the active channel activates main. Returns `false` if there
    /// was no such channel.
    pub fn close_private_chat<S: CommandSink>(&mut self, sink: &mut S, peer: &str) -> bool {
        let channel = ChannelId::Private(peer.to_string());
        if self.composing.as_ref().is_some_and(|c| c.channel == channel) {
            self.end_composition(sink);
        }

        let removed = self.private.remove(peer).is_some();
        if self.active == channel {
            self.active = ChannelId::Main;
            self.main.mark_read();
        }
        removed
    }

    /// Rename the local user.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a blank name, otherwise the sink's error.
    pub fn update_display_name<S: CommandSink>(
        &mut self,
        sink: &mut S,
        display_name: &str,
    ) -> Result<(), ConnectionError> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(ConnectionError::InvalidInput("display name is empty"));
        }
        sink.update_display_name(display_name)?;
        self.display_name = display_name.to_string();
        Ok(())
    }

    /// Forget everything: logout.
    pub fn reset(&mut self) {
        self.self_id = None;
        self.display_name.clear();
        self.connection = ConnectionState::Disconnected;
        self.authenticated = false;
        self.main = Channel::default();
        self.private.clear();
        self.active = ChannelId::Main;
        self.presence.clear();
        self.typing.clear();
        self.composing = None;
    }

    /// Mirrored connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    /// Mirrored authentication flag.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Local user id, once known.
    pub fn self_id(&self) -> Option<&str> {
        self.self_id.as_deref()
    }

    /// Local display name.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Active channel.
    pub fn active(&self) -> &ChannelId {
        &self.active
    }

    /// Channel by id. Main always exists.
    pub fn channel(&self, id: &ChannelId) -> Option<&Channel> {
        match id {
            ChannelId::Main => Some(&self.main),
            ChannelId::Private(peer) => self.private.get(peer),
        }
    }

    /// Messages of a channel; empty if it does not exist.
    pub fn messages(&self, id: &ChannelId) -> &[Message] {
        self.channel(id).map_or(&[], Channel::messages)
    }

    /// Unread counter of a channel; zero if it does not exist.
    pub fn unread(&self, id: &ChannelId) -> usize {
        self.channel(id).map_or(0, Channel::unread)
    }

    /// Private channels ordered by peer id.
    pub fn private_channels(&self) -> impl Iterator<Item = (&str, &Channel)> {
        self.private.iter().map(|(peer, channel)| (peer.as_str(), channel))
    }

    /// Online users as `(user_id, display_name)`, ordered by id.
    pub fn presence(&self) -> impl Iterator<Item = (&str, &str)> {
        self.presence.iter().map(|(id, name)| (id.as_str(), name.as_str()))
    }

    /// Display name of an online user.
    pub fn presence_name(&self, user_id: &str) -> Option<&str> {
        self.presence.get(user_id).map(String::as_str)
    }

    /// Users typing in `channel`, sorted, never including the local user.
    pub fn typing_users(&self, channel: &ChannelId) -> Vec<&str> {
        let mut users: Vec<&str> = self
            .typing
            .keys()
            .filter(|key| key.channel == *channel)
            .map(|key| key.user_id.as_str())
            .collect();
        users.sort_unstable();
        users
    }

    /// Returns true while a local composition is in progress.
    pub fn is_composing(&self) -> bool {
        self.composing.is_some()
    }

    /// Every message id in the store, for invariant checks.
    pub fn message_ids(&self) -> impl Iterator<Item = MessageId> + '_ {
        self.main
            .messages()
            .iter()
            .chain(self.private.values().flat_map(|c| c.messages().iter()))
            .map(|m| m.id)
    }

    fn on_message(&mut self, inbound: &InboundMessage) {
        if inbound.is_own {
            tracing::trace!(sender = %inbound.sender_id, "suppressing echo of own message");
            return;
        }

        let channel = if inbound.is_private {
            ChannelId::Private(inbound.sender_id.clone())
        } else {
            ChannelId::Main
        };

        let message = Message {
            id: self.allocate_id(),
            kind: inbound.kind,
            content: inbound.content.clone(),
            sender_id: inbound.sender_id.clone(),
            sender_name: inbound.sender_name.clone(),
            recipient_id: inbound.recipient_id.clone(),
            timestamp: inbound.timestamp,
            is_own: false,
        };
        self.append(&channel, message);
    }

    fn push_system(&mut self, content: String, at: DateTime<Utc>) {
        let message = Message {
            id: self.allocate_id(),
            kind: MessageKind::System,
            content,
            sender_id: SYSTEM_SENDER.to_string(),
            sender_name: SYSTEM_SENDER.to_string(),
            recipient_id: None,
            timestamp: at,
            is_own: false,
        };
        self.append(&ChannelId::Main, message);
    }

    fn append(&mut self, channel: &ChannelId, message: Message) {
        let counts =
            message.kind != MessageKind::System && !message.is_own && *channel != self.active;

        let target = match channel {
            ChannelId::Main => &mut self.main,
            ChannelId::Private(peer) => self.private.entry(peer.clone()).or_default(),
        };
        target.push(message);
        if counts {
            target.mark_unread();
        }
    }

    fn activate<S: CommandSink>(&mut self, sink: &mut S, channel: ChannelId) {
        if self.composing.as_ref().is_some_and(|c| c.channel != channel) {
            self.end_composition(sink);
        }

        match &channel {
            ChannelId::Main => self.main.mark_read(),
            ChannelId::Private(peer) => self.private.entry(peer.clone()).or_default().mark_read(),
        }
        self.active = channel;
    }

    fn end_composition<S: CommandSink>(&mut self, sink: &mut S) {
        let Some(composing) = self.composing.take() else {
            return;
        };
        if let Err(err) = sink.send_typing(false, composing.channel.peer()) {
            tracing::debug!(error = %err, "typing-stop not sent");
        }
    }

    fn allocate_id(&mut self) -> MessageId {
        let id = MessageId(self.next_message_id);
        self.next_message_id += 1;
        id
    }

    fn is_self(&self, user_id: &str) -> bool {
        self.self_id.as_deref() == Some(user_id)
    }
}

/// Channel a remote typing notification belongs to, seen from this client.
///
/// A notice with a recipient comes from a private conversation with its
/// sender; without one it is the main channel.
fn typing_channel(user_id: &str, recipient_id: &Option<String>) -> ChannelId {
    match recipient_id {
        Some(_) => ChannelId::Private(user_id.to_string()),
        None => ChannelId::Main,
    }
}

//! Session connection state machine.
//!
//! Owns the socket lifecycle, the authentication handshake and the
//! reconnection policy. Uses the action pattern: methods take time as input
//! and return [`ConnectionAction`]s for the runtime to execute, and outbound
//! documents accumulate in an outgoing queue drained with
//! [`ConnectionManager::take_outgoing`]. No I/O happens here.
//!
//! # State Machine
//!
//! ```text
//!                connect            socket open           authSuccess
//! ┌──────────────┐ ───> ┌────────────┐ ───> ┌───────────┐ ───> ┌───────────────┐
//! │ Disconnected │      │ Connecting │      │ Connected │      │ Authenticated │
//! └──────────────┘      └────────────┘      └───────────┘      └───────────────┘
//!        ↑                                        │ authError
//!        │ abnormal close (retry scheduled)       ↓
//!        ├──────────────────────────────── ┌────────────┐
//!        │                                 │ AuthFailed │
//!        │ disconnect()                    └────────────┘
//!        └──────── Disconnecting
//! ```
//!
//! Any state moves to `Error` when the transport reports a failure.
//!
//! # Reconnection
//!
//! An abnormal close (code other than [`NORMAL_CLOSURE`]) schedules a single
//! retry `reconnect_interval` later, as long as fewer than
//! `max_reconnect_attempts` retries have been made since the last successful
//! open. [`ConnectionManager::disconnect`] sets a cancellation flag that is
//! checked both when a retry is scheduled and when it fires, so a retry that
//! was already pending never takes effect.

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

use chrono::{DateTime, SecondsFormat, Utc};
use parley_proto::{
    ClientMessage, FrameDecoder, FramingStrategy, ServerMessage,
    payloads::outbound::{Auth, PrivateMessage, Typing, UpdateDisplayName, UserMessage},
};

use crate::{
    bus::EventBus,
    error::ConnectionError,
    event::ChatEvent,
    router::{MessageRouter, RouteContext},
    socket::{SocketEvent, SocketId},
};

/// Endpoint used when none is configured.
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8081/ws";

/// Token presented by development builds.
pub const DEFAULT_AUTH_TOKEN: &str = "fake_development_token";

/// Delay between an abnormal close and the reconnection attempt.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(3000);

/// Retries allowed before giving up until the next successful open.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Close code for an intentional shutdown. Never triggers reconnection.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close reason sent by [`ConnectionManager::disconnect`].
pub const DISCONNECT_REASON: &str = "User disconnected";

/// Actions returned by the connection state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open a socket to `url` and report its events tagged with `socket`.
    OpenSocket {
        /// Handle for the new socket
        socket: SocketId,
        /// Endpoint to connect to
        url: String,
    },

    /// Close a socket.
    CloseSocket {
        /// Socket to close
        socket: SocketId,
        /// Close code sent to the peer
        code: u16,
        /// Close reason sent to the peer
        reason: String,
    },
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No socket
    Disconnected,
    /// Socket requested, not yet open
    Connecting,
    /// Socket open, auth request sent
    Connected,
    /// Server accepted the auth request
    Authenticated,
    /// Server rejected the auth request; socket stays open
    AuthFailed,
    /// Transport reported a failure
    Error,
    /// Explicit disconnect in progress
    Disconnecting,
}

impl ConnectionState {
    /// Wire-style name, as shown to users.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Authenticated => "authenticated",
            Self::AuthFailed => "auth_failed",
            Self::Error => "error",
            Self::Disconnecting => "disconnecting",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and authentication status of the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Team scope
    pub team_id: String,
    /// Local user id
    pub user_id: String,
    /// Name shown to other users
    pub display_name: String,
    /// Server accepted the auth request on the current socket
    pub authenticated: bool,
}

impl Session {
    /// Display name, or the user id if the name is empty.
    pub fn sender_name(&self) -> &str {
        if self.display_name.is_empty() { &self.user_id } else { &self.display_name }
    }
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket endpoint
    pub url: String,
    /// Token sent in the auth request
    pub auth_token: String,
    /// Delay before a reconnection attempt
    pub reconnect_interval: Duration,
    /// Retries allowed between successful opens
    pub max_reconnect_attempts: u32,
    /// How inbound chunks are split into documents
    pub framing: FramingStrategy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SERVER_URL.to_string(),
            auth_token: DEFAULT_AUTH_TOKEN.to_string(),
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            framing: FramingStrategy::default(),
        }
    }
}

/// Connection state machine.
///
/// Owns the only socket handle, the session, and the event bus on which
/// every domain event is published.
///
/// This is a pure state machine: no I/O and no clock reads. Monotonic time
/// is passed as `now` and wall-clock receive time as `received_at`.
///
/// Generic over `Instant` to support both real time and virtual time for
/// deterministic testing.
#[derive(Debug)]
pub struct ConnectionManager<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    config: ConnectionConfig,
    state: ConnectionState,
    session: Option<Session>,
    /// Current socket, if one has been requested and not abandoned
    socket: Option<SocketId>,
    /// Current socket completed its handshake
    socket_open: bool,
    last_socket: SocketId,
    decoder: FrameDecoder,
    router: MessageRouter,
    bus: EventBus<ChatEvent>,
    outgoing: Vec<String>,
    reconnect_attempts: u32,
    /// When the pending retry was scheduled
    retry_scheduled_at: Option<I>,
    manually_disconnected: bool,
    last_error: Option<ConnectionError>,
}

impl<I> ConnectionManager<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a manager in [`ConnectionState::Disconnected`].
    pub fn new(config: ConnectionConfig) -> Self {
        let decoder = FrameDecoder::new(config.framing);
        Self {
            config,
            state: ConnectionState::Disconnected,
            session: None,
            socket: None,
            socket_open: false,
            last_socket: SocketId::new(0),
            decoder,
            router: MessageRouter::new(),
            bus: EventBus::new(),
            outgoing: Vec::new(),
            reconnect_attempts: 0,
            retry_scheduled_at: None,
            manually_disconnected: false,
            last_error: None,
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Current session. `None` before `connect` and after `disconnect`.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Returns true if the server accepted authentication on this socket.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.authenticated)
    }

    /// Handle of the current socket.
    #[must_use]
    pub fn socket(&self) -> Option<SocketId> {
        self.socket
    }

    /// Returns true if the current socket accepts writes.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.socket_open
    }

    /// Retries made since the last successful open.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Returns true if a retry is waiting to fire.
    #[must_use]
    pub fn has_pending_retry(&self) -> bool {
        self.retry_scheduled_at.is_some()
    }

    /// Returns true once `disconnect` has been called on this manager.
    #[must_use]
    pub fn is_manually_disconnected(&self) -> bool {
        self.manually_disconnected
    }

    /// Most recent auth rejection or transport failure.
    #[must_use]
    pub fn last_error(&self) -> Option<&ConnectionError> {
        self.last_error.as_ref()
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Bus on which domain events are published.
    pub fn bus(&self) -> &EventBus<ChatEvent> {
        &self.bus
    }

    /// Mutable bus access, for subscribing.
    pub fn bus_mut(&mut self) -> &mut EventBus<ChatEvent> {
        &mut self.bus
    }

    /// Start a session.
    ///
    /// No-op if a socket is already open or opening. Otherwise records the
    /// identity, moves to `Connecting` and returns `OpenSocket`. The auth
    /// request is queued once the runtime reports the socket open. An empty
    /// display name falls back to the user id.
    pub fn connect(
        &mut self,
        team_id: &str,
        user_id: &str,
        display_name: &str,
    ) -> Vec<ConnectionAction> {
        if let Some(socket) = self.socket {
            tracing::debug!(%socket, state = %self.state, "connect ignored, socket already active");
            return Vec::new();
        }

        let display_name = if display_name.is_empty() { user_id } else { display_name };
        self.session = Some(Session {
            team_id: team_id.to_string(),
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            authenticated: false,
        });
        self.retry_scheduled_at = None;

        tracing::info!(team_id, user_id, url = %self.config.url, "connecting");
        self.open_socket()
    }

    /// End the session.
    ///
    /// Closes the socket with [`NORMAL_CLOSURE`], clears the session and
    /// permanently suppresses reconnection for this manager, including a
    /// retry that is already scheduled.
    pub fn disconnect(&mut self) -> Vec<ConnectionAction> {
        self.manually_disconnected = true;
        self.retry_scheduled_at = None;

        let mut actions = Vec::new();
        if let Some(socket) = self.socket.take() {
            self.set_state(ConnectionState::Disconnecting);
            actions.push(ConnectionAction::CloseSocket {
                socket,
                code: NORMAL_CLOSURE,
                reason: DISCONNECT_REASON.to_string(),
            });
        }

        self.socket_open = false;
        self.outgoing.clear();
        let was_authenticated = self.is_authenticated();
        self.session = None;

        tracing::info!("disconnected by user");
        self.set_state(ConnectionState::Disconnected);
        if was_authenticated {
            self.publish(&ChatEvent::AuthStatusChange(false));
        }

        actions
    }

    /// Process an event reported by the transport.
    ///
    /// Events for any socket other than the current one are stale and
    /// ignored.
    pub fn handle(&mut self, event: SocketEvent, now: I, received_at: DateTime<Utc>) {
        if self.socket != Some(event.socket()) {
            tracing::debug!(
                socket = %event.socket(),
                current = ?self.socket,
                "ignoring stale socket event"
            );
            return;
        }

        match event {
            SocketEvent::Opened { .. } => self.on_open(),
            SocketEvent::Text { text, .. } => self.on_text(&text, received_at),
            SocketEvent::Closed { code, .. } => self.on_close(code, now),
            SocketEvent::Failed { reason, .. } => {
                tracing::warn!(%reason, "transport failure");
                self.last_error = Some(ConnectionError::Transport(reason));
                self.set_state(ConnectionState::Error);
            },
        }
    }

    /// Fire the pending retry if its interval has elapsed.
    ///
    /// The cancellation flag is re-checked here, not only when the retry was
    /// scheduled.
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        let Some(scheduled_at) = self.retry_scheduled_at else {
            return Vec::new();
        };

        if now - scheduled_at < self.config.reconnect_interval {
            return Vec::new();
        }
        self.retry_scheduled_at = None;

        if self.manually_disconnected {
            tracing::debug!("retry cancelled by disconnect");
            return Vec::new();
        }
        if self.socket.is_some() || self.session.is_none() {
            return Vec::new();
        }

        self.reconnect_attempts += 1;
        tracing::info!(
            attempt = self.reconnect_attempts,
            max = self.config.max_reconnect_attempts,
            "reconnecting"
        );
        self.open_socket()
    }

    /// Queue a document on the current socket.
    ///
    /// Returns `false` without side effects if the socket is not open or the
    /// document cannot be encoded.
    pub fn send(&mut self, message: &ClientMessage) -> bool {
        if !self.socket_open {
            tracing::debug!(kind = message.kind(), "send dropped, socket not open");
            return false;
        }

        match message.encode() {
            Ok(text) => {
                self.outgoing.push(text);
                true
            },
            Err(err) => {
                tracing::warn!(error = %err, "failed to encode outbound document");
                false
            },
        }
    }

    /// Drain documents queued since the last call.
    pub fn take_outgoing(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outgoing)
    }

    /// Post to the main channel.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` if not authenticated
    /// - `ConnectionError::InvalidInput` if the content is blank
    /// - `ConnectionError::Transport` if the socket cannot take the write
    pub fn send_message(
        &mut self,
        content: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<(), ConnectionError> {
        let session = self.authenticated_session("send_message")?;
        let content = non_blank(content)?;

        let message = ClientMessage::UserMessage(UserMessage {
            content: content.to_string(),
            sender_id: session.user_id.clone(),
            sender_name: session.sender_name().to_string(),
            team_id: session.team_id.clone(),
            timestamp: wire_timestamp(sent_at),
        });
        self.send_checked(&message)
    }

    /// Post to a peer.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` if not authenticated
    /// - `ConnectionError::InvalidInput` if the content or recipient is blank
    /// - `ConnectionError::Transport` if the socket cannot take the write
    pub fn send_private_message(
        &mut self,
        content: &str,
        recipient_id: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<(), ConnectionError> {
        let session = self.authenticated_session("send_private_message")?;
        let content = non_blank(content)?;
        if recipient_id.is_empty() {
            return Err(ConnectionError::InvalidInput("recipient is empty"));
        }

        let message = ClientMessage::PrivateMessage(PrivateMessage {
            content: content.to_string(),
            sender_id: session.user_id.clone(),
            sender_name: session.sender_name().to_string(),
            recipient_id: recipient_id.to_string(),
            team_id: session.team_id.clone(),
            timestamp: wire_timestamp(sent_at),
        });
        self.send_checked(&message)
    }

    /// Announce that the local user started (`true`) or stopped composing.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` if not authenticated
    /// - `ConnectionError::Transport` if the socket cannot take the write
    pub fn send_typing(
        &mut self,
        is_typing: bool,
        recipient_id: Option<&str>,
    ) -> Result<(), ConnectionError> {
        let session = self.authenticated_session("send_typing")?;

        let body = Typing {
            user_id: session.user_id.clone(),
            user_name: session.sender_name().to_string(),
            recipient_id: recipient_id.map(str::to_string),
            team_id: session.team_id.clone(),
        };
        let message = if is_typing {
            ClientMessage::TypingStart(body)
        } else {
            ClientMessage::TypingStop(body)
        };
        self.send_checked(&message)
    }

    /// Rename the local user.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` if not authenticated
    /// - `ConnectionError::InvalidInput` if the name is blank
    /// - `ConnectionError::Transport` if the socket cannot take the write
    pub fn update_display_name(&mut self, display_name: &str) -> Result<(), ConnectionError> {
        let session = self.authenticated_session("update_display_name")?;
        let display_name = non_blank(display_name)?.to_string();

        let message = ClientMessage::UpdateDisplayName(UpdateDisplayName {
            display_name: display_name.clone(),
            user_id: session.user_id.clone(),
            team_id: session.team_id.clone(),
        });
        self.send_checked(&message)?;

        if let Some(session) = self.session.as_mut() {
            session.display_name = display_name;
        }
        Ok(())
    }

    /// Ask the server for a presence snapshot.
    pub fn request_online_users(&mut self) -> bool {
        self.send(&ClientMessage::GetOnlineUsers)
    }

    fn open_socket(&mut self) -> Vec<ConnectionAction> {
        let socket = self.last_socket.next();
        self.last_socket = socket;
        self.socket = Some(socket);
        self.socket_open = false;
        self.set_state(ConnectionState::Connecting);

        vec![ConnectionAction::OpenSocket { socket, url: self.config.url.clone() }]
    }

    fn on_open(&mut self) {
        self.socket_open = true;
        self.reconnect_attempts = 0;
        self.retry_scheduled_at = None;
        self.set_state(ConnectionState::Connected);

        let Some(session) = self.session.as_ref() else {
            tracing::warn!("socket opened without a session");
            return;
        };

        let auth = ClientMessage::Auth(Auth {
            token: self.config.auth_token.clone(),
            team_id: session.team_id.clone(),
            user_id: session.user_id.clone(),
            display_name: session.display_name.clone(),
        });
        self.send(&auth);
    }

    fn on_text(&mut self, text: &str, received_at: DateTime<Utc>) {
        let decoded = self.decoder.decode(text);

        if let Some(trailing) = decoded.trailing {
            tracing::warn!(bytes = trailing.len(), "dropping unterminated trailing document");
        }

        for frame in decoded.frames {
            let message = match ServerMessage::decode(frame) {
                Ok(message) => message,
                Err(err) => {
                    let err = ConnectionError::from(err);
                    tracing::warn!(error = %err, frame, "dropping frame");
                    continue;
                },
            };

            let authenticated = matches!(message, ServerMessage::AuthSuccess(_));
            if let ServerMessage::AuthError(rejection) = &message {
                let reason = rejection.message.clone().unwrap_or_default();
                tracing::warn!(%reason, "authentication rejected");
                self.last_error = Some(ConnectionError::Auth(reason));
            }

            let self_id = self.session.as_ref().map(|s| s.user_id.clone());
            let ctx = RouteContext { self_id: self_id.as_deref(), received_at };
            for event in self.router.route_message(message, &ctx) {
                self.dispatch(event);
            }

            if authenticated {
                self.request_online_users();
            }
        }
    }

    fn on_close(&mut self, code: u16, now: I) {
        self.socket = None;
        self.socket_open = false;
        self.set_state(ConnectionState::Disconnected);
        self.set_authenticated(false);

        if code == NORMAL_CLOSURE || self.manually_disconnected {
            tracing::info!(code, "connection closed");
            return;
        }

        if self.reconnect_attempts < self.config.max_reconnect_attempts {
            let delay = self.config.reconnect_interval;
            tracing::info!(code, ?delay, "connection lost, retry scheduled");
            self.retry_scheduled_at = Some(now);
        } else {
            tracing::warn!(code, attempts = self.reconnect_attempts, "connection lost, giving up");
        }
    }

    fn dispatch(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::ConnectionStatusChange(state) => self.set_state(state),
            ChatEvent::AuthStatusChange(authenticated) => self.set_authenticated(authenticated),
            other => self.publish(&other),
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        tracing::debug!(from = %self.state, to = %state, "connection state");
        self.state = state;
        self.publish(&ChatEvent::ConnectionStatusChange(state));
    }

    fn set_authenticated(&mut self, authenticated: bool) {
        if let Some(session) = self.session.as_mut() {
            session.authenticated = authenticated;
        }
        self.publish(&ChatEvent::AuthStatusChange(authenticated));
    }

    fn publish(&mut self, event: &ChatEvent) {
        self.bus.publish(event);
    }

    fn authenticated_session(&self, operation: &'static str) -> Result<Session, ConnectionError> {
        match self.session.as_ref() {
            Some(session) if session.authenticated => Ok(session.clone()),
            _ => Err(ConnectionError::InvalidState { state: self.state, operation }),
        }
    }

    fn send_checked(&mut self, message: &ClientMessage) -> Result<(), ConnectionError> {
        if self.send(message) {
            Ok(())
        } else {
            Err(ConnectionError::Transport(format!("could not send {}", message.kind())))
        }
    }
}

/// Trimmed text, rejecting blank input.
fn non_blank(text: &str) -> Result<&str, ConnectionError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ConnectionError::InvalidInput("content is empty"));
    }
    Ok(trimmed)
}

/// RFC 3339 with millisecond precision and a `Z` suffix.
fn wire_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::event::EventKind;

    fn epoch() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_714_564_800, 0).unwrap()
    }

    fn manager() -> ConnectionManager<Instant> {
        ConnectionManager::new(ConnectionConfig::default())
    }

    fn open_socket(actions: &[ConnectionAction]) -> SocketId {
        match actions {
            [ConnectionAction::OpenSocket { socket, .. }] => *socket,
            other => panic!("expected OpenSocket, got {other:?}"),
        }
    }

    /// Connect, open and authenticate. Returns the socket id.
    fn authenticated(conn: &mut ConnectionManager<Instant>, t0: Instant) -> SocketId {
        let socket = open_socket(&conn.connect("team-alpha", "alice", "Alice"));
        conn.handle(SocketEvent::Opened { socket }, t0, epoch());
        conn.handle(
            SocketEvent::Text { socket, text: r#"{"type":"authSuccess"}"#.into() },
            t0,
            epoch(),
        );
        conn.take_outgoing();
        socket
    }

    fn record(conn: &mut ConnectionManager<Instant>) -> Rc<RefCell<Vec<ChatEvent>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        for kind in EventKind::ALL {
            let log = Rc::clone(&log);
            conn.bus_mut().subscribe(kind, move |event: &ChatEvent| {
                log.borrow_mut().push(event.clone());
                Ok(())
            });
        }
        log
    }

    fn parse(text: &str) -> serde_json::Value {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn connect_requests_socket_and_is_idempotent() {
        let mut conn = manager();
        let log = record(&mut conn);

        let actions = conn.connect("team-alpha", "alice", "Alice");
        assert_eq!(actions, vec![ConnectionAction::OpenSocket {
            socket: SocketId::new(1),
            url: DEFAULT_SERVER_URL.to_string(),
        }]);
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert_eq!(*log.borrow(), vec![ChatEvent::ConnectionStatusChange(
            ConnectionState::Connecting
        )]);

        assert!(conn.connect("team-alpha", "alice", "Alice").is_empty());
    }

    #[test]
    fn open_sends_auth_request() {
        let t0 = Instant::now();
        let mut conn = manager();
        let socket = open_socket(&conn.connect("team-alpha", "alice", ""));

        conn.handle(SocketEvent::Opened { socket }, t0, epoch());

        assert_eq!(conn.state(), ConnectionState::Connected);
        let sent = conn.take_outgoing();
        assert_eq!(sent.len(), 1);
        let auth = parse(&sent[0]);
        assert_eq!(auth["type"], "auth");
        assert_eq!(auth["token"], DEFAULT_AUTH_TOKEN);
        assert_eq!(auth["teamId"], "team-alpha");
        assert_eq!(auth["userId"], "alice");
        assert_eq!(auth["displayName"], "alice");
    }

    #[test]
    fn auth_success_authenticates_and_requests_presence() {
        let t0 = Instant::now();
        let mut conn = manager();
        let socket = open_socket(&conn.connect("team-alpha", "alice", "Alice"));
        conn.handle(SocketEvent::Opened { socket }, t0, epoch());
        conn.take_outgoing();
        let log = record(&mut conn);

        conn.handle(
            SocketEvent::Text { socket, text: r#"{"type":"authSuccess"}"#.into() },
            t0,
            epoch(),
        );

        assert_eq!(conn.state(), ConnectionState::Authenticated);
        assert!(conn.is_authenticated());
        assert_eq!(*log.borrow(), vec![
            ChatEvent::ConnectionStatusChange(ConnectionState::Authenticated),
            ChatEvent::AuthStatusChange(true),
            ChatEvent::system("Successfully connected to chat", epoch()),
        ]);

        let sent = conn.take_outgoing();
        assert_eq!(sent, vec![r#"{"type":"getOnlineUsers"}"#.to_string()]);
    }

    #[test]
    fn auth_error_keeps_socket_open() {
        let t0 = Instant::now();
        let mut conn = manager();
        let socket = open_socket(&conn.connect("team-alpha", "alice", "Alice"));
        conn.handle(SocketEvent::Opened { socket }, t0, epoch());

        conn.handle(
            SocketEvent::Text {
                socket,
                text: r#"{"type":"authError","message":"bad token"}"#.into(),
            },
            t0,
            epoch(),
        );

        assert_eq!(conn.state(), ConnectionState::AuthFailed);
        assert!(!conn.is_authenticated());
        assert!(conn.is_open());
        assert_eq!(conn.last_error(), Some(&ConnectionError::Auth("bad token".into())));
        assert!(matches!(
            conn.send_message("hi", epoch()),
            Err(ConnectionError::InvalidState { state: ConnectionState::AuthFailed, .. })
        ));
    }

    #[test]
    fn derived_sends_require_authentication() {
        let t0 = Instant::now();
        let mut conn = manager();
        let socket = open_socket(&conn.connect("team-alpha", "alice", "Alice"));
        conn.handle(SocketEvent::Opened { socket }, t0, epoch());
        conn.take_outgoing();

        assert!(conn.send_message("hi", epoch()).is_err());
        assert!(conn.send_private_message("hi", "bob", epoch()).is_err());
        assert!(conn.send_typing(true, None).is_err());
        assert!(conn.update_display_name("Al").is_err());
        assert!(conn.take_outgoing().is_empty());
    }

    #[test]
    fn send_message_trims_and_stamps() {
        let t0 = Instant::now();
        let mut conn = manager();
        authenticated(&mut conn, t0);

        conn.send_message("  hello  ", epoch()).unwrap();

        let sent = conn.take_outgoing();
        let msg = parse(&sent[0]);
        assert_eq!(msg["type"], "userMessage");
        assert_eq!(msg["content"], "hello");
        assert_eq!(msg["senderName"], "Alice");
        assert_eq!(msg["timestamp"], "2024-05-01T12:00:00.000Z");
    }

    #[test]
    fn blank_content_and_recipient_are_rejected() {
        let t0 = Instant::now();
        let mut conn = manager();
        authenticated(&mut conn, t0);

        assert!(matches!(
            conn.send_message("   ", epoch()),
            Err(ConnectionError::InvalidInput(_))
        ));
        assert!(matches!(
            conn.send_private_message("hi", "", epoch()),
            Err(ConnectionError::InvalidInput(_))
        ));
        assert!(conn.take_outgoing().is_empty());
    }

    #[test]
    fn typing_carries_optional_recipient() {
        let t0 = Instant::now();
        let mut conn = manager();
        authenticated(&mut conn, t0);

        conn.send_typing(true, Some("bob")).unwrap();
        conn.send_typing(false, None).unwrap();

        let sent = conn.take_outgoing();
        let start = parse(&sent[0]);
        let stop = parse(&sent[1]);
        assert_eq!(start["type"], "typingStart");
        assert_eq!(start["recipientId"], "bob");
        assert_eq!(stop["type"], "typingStop");
        assert!(stop.get("recipientId").is_none());
    }

    #[test]
    fn update_display_name_changes_session() {
        let t0 = Instant::now();
        let mut conn = manager();
        authenticated(&mut conn, t0);

        conn.update_display_name(" Ally ").unwrap();

        assert_eq!(conn.session().map(|s| s.display_name.as_str()), Some("Ally"));
        let msg = parse(&conn.take_outgoing()[0]);
        assert_eq!(msg["type"], "updateDisplayName");
        assert_eq!(msg["displayName"], "Ally");
    }

    #[test]
    fn malformed_frame_does_not_abort_batch() {
        let t0 = Instant::now();
        let mut conn = manager();
        let socket = authenticated(&mut conn, t0);
        let log = record(&mut conn);

        let chunk = concat!(
            r#"{"type":"systemAlert","message":"one"}"#,
            r#"{"type":"userMessage","content":1}"#,
            r#"{"type":"reaction"}"#,
            r#"{"type":"systemAlert","message":"two"}"#,
        );
        conn.handle(SocketEvent::Text { socket, text: chunk.into() }, t0, epoch());

        assert_eq!(*log.borrow(), vec![
            ChatEvent::system("one", epoch()),
            ChatEvent::system("two", epoch()),
        ]);
    }

    #[test]
    fn abnormal_close_schedules_single_retry() {
        let t0 = Instant::now();
        let mut conn = manager();
        let socket = authenticated(&mut conn, t0);

        conn.handle(SocketEvent::Closed { socket, code: 1006 }, t0, epoch());

        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(!conn.is_authenticated());
        assert!(conn.has_pending_retry());
        assert!(conn.tick(t0 + Duration::from_millis(2999)).is_empty());

        let retry = open_socket(&conn.tick(t0 + DEFAULT_RECONNECT_INTERVAL));
        assert_ne!(retry, socket);
        assert_eq!(conn.reconnect_attempts(), 1);
        assert!(conn.tick(t0 + Duration::from_secs(60)).is_empty());

        conn.handle(SocketEvent::Opened { socket: retry }, t0, epoch());
        assert_eq!(conn.reconnect_attempts(), 0);
        let auth = parse(&conn.take_outgoing()[0]);
        assert_eq!(auth["userId"], "alice");
    }

    #[test]
    fn normal_close_does_not_retry() {
        let t0 = Instant::now();
        let mut conn = manager();
        let socket = authenticated(&mut conn, t0);

        conn.handle(SocketEvent::Closed { socket, code: NORMAL_CLOSURE }, t0, epoch());

        assert!(!conn.has_pending_retry());
        assert!(conn.tick(t0 + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn retries_stop_after_max_attempts() {
        let mut now = Instant::now();
        let mut conn = manager();
        let mut socket = open_socket(&conn.connect("team-alpha", "alice", "Alice"));

        let mut opened = 0;
        loop {
            conn.handle(SocketEvent::Closed { socket, code: 1006 }, now, epoch());
            now += DEFAULT_RECONNECT_INTERVAL;
            match conn.tick(now).as_slice() {
                [ConnectionAction::OpenSocket { socket: next, .. }] => {
                    socket = *next;
                    opened += 1;
                },
                [] => break,
                other => panic!("unexpected actions {other:?}"),
            }
        }

        assert_eq!(opened, DEFAULT_MAX_RECONNECT_ATTEMPTS);
        assert!(!conn.has_pending_retry());
    }

    #[test]
    fn disconnect_closes_normally_and_clears_session() {
        let t0 = Instant::now();
        let mut conn = manager();
        let socket = authenticated(&mut conn, t0);
        let log = record(&mut conn);

        let actions = conn.disconnect();

        assert_eq!(actions, vec![ConnectionAction::CloseSocket {
            socket,
            code: NORMAL_CLOSURE,
            reason: DISCONNECT_REASON.to_string(),
        }]);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.session().is_none());
        assert_eq!(*log.borrow(), vec![
            ChatEvent::ConnectionStatusChange(ConnectionState::Disconnecting),
            ChatEvent::ConnectionStatusChange(ConnectionState::Disconnected),
            ChatEvent::AuthStatusChange(false),
        ]);
    }

    #[test]
    fn stale_abnormal_close_after_disconnect_is_ignored() {
        let t0 = Instant::now();
        let mut conn = manager();
        let socket = authenticated(&mut conn, t0);

        conn.disconnect();
        conn.handle(SocketEvent::Closed { socket, code: 1006 }, t0, epoch());

        assert!(!conn.has_pending_retry());
        assert!(conn.tick(t0 + Duration::from_secs(60)).is_empty());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn disconnect_cancels_already_scheduled_retry() {
        let t0 = Instant::now();
        let mut conn = manager();
        let socket = authenticated(&mut conn, t0);
        conn.handle(SocketEvent::Closed { socket, code: 1006 }, t0, epoch());
        assert!(conn.has_pending_retry());

        conn.disconnect();

        assert!(conn.tick(t0 + Duration::from_secs(60)).is_empty());
        assert!(conn.is_manually_disconnected());
    }

    #[test]
    fn retries_stay_suppressed_after_explicit_reconnect() {
        let t0 = Instant::now();
        let mut conn = manager();
        authenticated(&mut conn, t0);
        conn.disconnect();

        let socket = authenticated(&mut conn, t0);
        conn.handle(SocketEvent::Closed { socket, code: 1006 }, t0, epoch());

        assert!(!conn.has_pending_retry());
    }

    #[test]
    fn stale_text_is_ignored() {
        let t0 = Instant::now();
        let mut conn = manager();
        let old = open_socket(&conn.connect("team-alpha", "alice", "Alice"));
        conn.handle(SocketEvent::Closed { socket: old, code: 1006 }, t0, epoch());
        let new = open_socket(&conn.tick(t0 + DEFAULT_RECONNECT_INTERVAL));
        let log = record(&mut conn);

        conn.handle(
            SocketEvent::Text { socket: old, text: r#"{"type":"authSuccess"}"#.into() },
            t0,
            epoch(),
        );

        assert!(log.borrow().is_empty());
        assert_eq!(conn.socket(), Some(new));
        assert_eq!(conn.state(), ConnectionState::Connecting);
    }

    #[test]
    fn transport_failure_is_recorded() {
        let t0 = Instant::now();
        let mut conn = manager();
        let socket = open_socket(&conn.connect("team-alpha", "alice", "Alice"));

        conn.handle(SocketEvent::Failed { socket, reason: "refused".into() }, t0, epoch());

        assert_eq!(conn.state(), ConnectionState::Error);
        assert!(conn.last_error().is_some_and(ConnectionError::is_transient));
    }

    #[test]
    fn state_names_match_wire_vocabulary() {
        assert_eq!(ConnectionState::AuthFailed.to_string(), "auth_failed");
        assert_eq!(ConnectionState::Disconnecting.to_string(), "disconnecting");
    }
}

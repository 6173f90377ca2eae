//! Generic runtime for session orchestration.
//!
//! [`ChatSession`] drives the client event loop, coordinating between:
//! - [`ConnectionManager`]: socket lifecycle and wire protocol
//! - [`ChatStateStore`]: view-model state, subscribed to the manager's bus
//! - [`Driver`]: platform-specific socket I/O

use std::{cell::{Ref, RefCell}, rc::Rc, time::Duration};

use parley_core::{
    ChatEvent, ConnectionAction, ConnectionConfig, ConnectionError, ConnectionManager,
    Environment, EventKind, ListenerError, ListenerId, SocketEvent,
};
use thiserror::Error;

use crate::{
    Driver,
    state::MessageId,
    store::{ChatStateStore, StoreConfig},
};

/// How long one event-loop cycle waits for socket input before ticking.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Close code reported when the driver could not start a socket.
const ABNORMAL_CLOSURE: u16 = 1006;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server, credentials and reconnection policy
    pub connection: ConnectionConfig,
    /// Typing timers
    pub store: StoreConfig,
    /// Upper bound on the time between timer checks
    pub tick_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            store: StoreConfig::default(),
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// Errors surfaced by [`ChatSession`].
#[derive(Error, Debug)]
pub enum SessionError<E>
where
    E: std::error::Error + 'static,
{
    /// The session state machines rejected the operation
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The socket driver failed
    #[error("driver error: {0}")]
    Driver(#[source] E),
}

impl<E> SessionError<E>
where
    E: std::error::Error + 'static,
{
    /// Returns true if retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection(err) => err.is_transient(),
            Self::Driver(_) => true,
        }
    }
}

/// Generic runtime that orchestrates connection, state store and driver.
///
/// # Type Parameters
///
/// - `D`: Platform-specific socket driver
/// - `E`: Environment providing time
pub struct ChatSession<D, E>
where
    D: Driver,
    E: Environment,
{
    driver: D,
    env: E,
    manager: ConnectionManager<E::Instant>,
    store: Rc<RefCell<ChatStateStore<E::Instant>>>,
    tick_interval: Duration,
}

impl<D, E> ChatSession<D, E>
where
    D: Driver,
    E: Environment,
{
    /// Create a session and subscribe its state store to the event bus.
    pub fn new(driver: D, env: E, config: SessionConfig) -> Self {
        let mut manager = ConnectionManager::new(config.connection);
        let store = Rc::new(RefCell::new(ChatStateStore::new(config.store)));
        ChatStateStore::attach(&store, manager.bus_mut(), env.clone());

        Self { driver, env, manager, store, tick_interval: config.tick_interval }
    }

    /// Open a session and wait until the socket is open.
    ///
    /// Authentication completes asynchronously; watch
    /// [`EventKind::AuthStatusChange`] or the store. Returns immediately if
    /// a socket is already open or opening.
    ///
    /// # Errors
    ///
    /// - `SessionError::Driver` if the socket could not be started
    /// - `SessionError::Connection` with a transport error if the socket
    ///   failed or closed before opening
    pub async fn connect(
        &mut self,
        team_id: &str,
        user_id: &str,
        display_name: &str,
    ) -> Result<(), SessionError<D::Error>> {
        let actions = self.manager.connect(team_id, user_id, display_name);
        let Some(socket) = opened_socket(&actions) else {
            return Ok(());
        };

        self.store.borrow_mut().set_identity(user_id, display_name);
        self.execute(actions)?;

        let mut failure = None;
        loop {
            let Some(event) =
                self.driver.poll_event(self.tick_interval).await.map_err(SessionError::Driver)?
            else {
                self.tick()?;
                continue;
            };

            // A failure is followed by the close; wait for it so the retry
            // is scheduled before returning.
            let outcome = match &event {
                SocketEvent::Opened { socket: s } if *s == socket => Some(Ok(())),
                SocketEvent::Failed { socket: s, reason } if *s == socket => {
                    failure = Some(reason.clone());
                    None
                },
                SocketEvent::Closed { socket: s, code } if *s == socket => Some(Err(failure
                    .take()
                    .unwrap_or_else(|| format!("closed with code {code} before opening")))),
                _ => None,
            };

            self.handle_transport(event)?;
            match outcome {
                Some(Ok(())) => return Ok(()),
                Some(Err(reason)) => return Err(ConnectionError::Transport(reason).into()),
                None => self.tick()?,
            }
        }
    }

    /// End the session: close the socket, cancel retries and clear the
    /// view-model.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver could not queue the close.
    pub fn disconnect(&mut self) -> Result<(), SessionError<D::Error>> {
        let actions = self.manager.disconnect();
        self.store.borrow_mut().reset();
        self.execute(actions)
    }

    /// Process one cycle of the event loop: wait for at most one socket
    /// event, then fire due timers.
    ///
    /// Cancel-safe: only the driver poll is awaited.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails.
    pub async fn process_cycle(&mut self) -> Result<(), SessionError<D::Error>> {
        let event =
            self.driver.poll_event(self.tick_interval).await.map_err(SessionError::Driver)?;
        if let Some(event) = event {
            self.handle_transport(event)?;
        }
        self.tick()
    }

    /// Feed one socket event through the manager and flush replies.
    ///
    /// # Errors
    ///
    /// Returns an error if a reply could not be written.
    pub fn handle_transport(&mut self, event: SocketEvent) -> Result<(), SessionError<D::Error>> {
        self.manager.handle(event, self.env.now(), self.env.wall_clock());
        self.flush()
    }

    /// Fire due timers: reconnection and typing.
    ///
    /// A reconnect attempt the driver cannot start is logged and counted as
    /// a failed socket, not returned.
    ///
    /// # Errors
    ///
    /// Returns an error if a typing notification could not be written.
    pub fn tick(&mut self) -> Result<(), SessionError<D::Error>> {
        let now = self.env.now();

        let actions = self.manager.tick(now);
        if let Err(err) = self.execute(actions) {
            tracing::warn!(error = %err, "reconnect attempt failed to start");
        }

        self.store.borrow_mut().tick(&mut self.manager, now);
        self.flush()
    }

    /// Send `content` to the active channel.
    ///
    /// # Errors
    ///
    /// Returns an error if not authenticated, the content is blank or the
    /// write fails.
    pub fn send_message(&mut self, content: &str) -> Result<MessageId, SessionError<D::Error>> {
        let sent_at = self.env.wall_clock();
        let id = self.store.borrow_mut().send_message(&mut self.manager, content, sent_at)?;
        self.flush()?;
        Ok(id)
    }

    /// Record a keystroke in the active channel's composer.
    ///
    /// # Errors
    ///
    /// Returns an error if typing-start could not be sent.
    pub fn keystroke(&mut self) -> Result<(), SessionError<D::Error>> {
        let now = self.env.now();
        self.store.borrow_mut().keystroke(&mut self.manager, now)?;
        self.flush()
    }

    /// Activate the main channel.
    ///
    /// # Errors
    ///
    /// Returns an error if a pending typing-stop could not be written.
    pub fn switch_to_main(&mut self) -> Result<(), SessionError<D::Error>> {
        self.store.borrow_mut().switch_to_main(&mut self.manager);
        self.flush()
    }

    /// Open and activate a private channel with `peer`.
    ///
    /// Returns `false` for the local user's own id.
    ///
    /// # Errors
    ///
    /// Returns an error if a pending typing-stop could not be written.
    pub fn open_private_chat(&mut self, peer: &str) -> Result<bool, SessionError<D::Error>> {
        let opened = self.store.borrow_mut().open_private_chat(&mut self.manager, peer);
        self.flush()?;
        Ok(opened)
    }

    /// Discard the private channel with `peer`.
    ///
    /// # Errors
    ///
    /// Returns an error if a pending typing-stop could not be written.
    pub fn close_private_chat(&mut self, peer: &str) -> Result<bool, SessionError<D::Error>> {
        let closed = self.store.borrow_mut().close_private_chat(&mut self.manager, peer);
        self.flush()?;
        Ok(closed)
    }

    /// Rename the local user.
    ///
    /// # Errors
    ///
    /// Returns an error if not authenticated, the name is blank or the write
    /// fails.
    pub fn update_display_name(
        &mut self,
        display_name: &str,
    ) -> Result<(), SessionError<D::Error>> {
        self.store.borrow_mut().update_display_name(&mut self.manager, display_name)?;
        self.flush()
    }

    /// Ask the server for a fresh presence snapshot.
    ///
    /// Returns `false` if the socket is not open.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn request_online_users(&mut self) -> Result<bool, SessionError<D::Error>> {
        let queued = self.manager.request_online_users();
        self.flush()?;
        Ok(queued)
    }

    /// Subscribe to domain events of one kind.
    pub fn subscribe<F>(&mut self, kind: EventKind, listener: F) -> ListenerId
    where
        F: FnMut(&ChatEvent) -> Result<(), ListenerError> + 'static,
    {
        self.manager.bus_mut().subscribe(kind, listener)
    }

    /// Remove a listener added with [`Self::subscribe`].
    pub fn unsubscribe(&mut self, kind: EventKind, id: ListenerId) -> bool {
        self.manager.bus_mut().unsubscribe(kind, id)
    }

    /// View-model state.
    ///
    /// # Panics
    ///
    /// Panics if called from inside an event listener while the store is
    /// being updated.
    pub fn store(&self) -> Ref<'_, ChatStateStore<E::Instant>> {
        self.store.borrow()
    }

    /// Connection state machine.
    pub fn manager(&self) -> &ConnectionManager<E::Instant> {
        &self.manager
    }

    /// Get a reference to the driver
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Get a mutable reference to the driver
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    fn execute(&mut self, actions: Vec<ConnectionAction>) -> Result<(), SessionError<D::Error>> {
        for action in actions {
            match action {
                ConnectionAction::OpenSocket { socket, url } => {
                    if let Err(err) = self.driver.open(socket, &url) {
                        tracing::warn!(%socket, error = %err, "failed to start socket");
                        let now = self.env.now();
                        let at = self.env.wall_clock();
                        let reason = err.to_string();
                        self.manager.handle(SocketEvent::Failed { socket, reason }, now, at);
                        let closed = SocketEvent::Closed { socket, code: ABNORMAL_CLOSURE };
                        self.manager.handle(closed, now, at);
                        return Err(SessionError::Driver(err));
                    }
                },
                ConnectionAction::CloseSocket { socket, code, reason } => {
                    self.driver.close(socket, code, &reason).map_err(SessionError::Driver)?;
                },
            }
        }
        self.flush()
    }

    fn flush(&mut self) -> Result<(), SessionError<D::Error>> {
        let outgoing = self.manager.take_outgoing();
        if outgoing.is_empty() {
            return Ok(());
        }

        let Some(socket) = self.manager.socket() else {
            tracing::debug!(count = outgoing.len(), "dropping outgoing documents, no socket");
            return Ok(());
        };
        for text in outgoing {
            self.driver.send_text(socket, text).map_err(SessionError::Driver)?;
        }
        Ok(())
    }
}

fn opened_socket(actions: &[ConnectionAction]) -> Option<parley_core::SocketId> {
    actions.iter().find_map(|action| match action {
        ConnectionAction::OpenSocket { socket, .. } => Some(*socket),
        ConnectionAction::CloseSocket { .. } => None,
    })
}

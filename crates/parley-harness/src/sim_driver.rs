//! Simulation driver implementing the Driver trait.
//!
//! `SimDriver` provides the same interface as the WebSocket driver but for
//! deterministic testing. It implements [`Driver`] so the same
//! [`parley_app::ChatSession`] orchestration code runs in both production
//! and simulation.
//!
//! A small scripted server answers the handshake documents so tests only
//! inject what they are actually about.

use std::{
    collections::VecDeque,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use parley_app::Driver;
use parley_core::{SocketEvent, SocketId};
use serde_json::{Value, json};

use crate::SimEnv;

/// Close code of a socket that broke without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Error type for simulation driver.
#[derive(Debug, Clone)]
pub struct SimDriverError(pub String);

impl std::fmt::Display for SimDriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimDriverError: {}", self.0)
    }
}

impl std::error::Error for SimDriverError {}

/// How the scripted server answers an `auth` document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthReply {
    /// Reply `authSuccess`
    Accept,
    /// Reply `authError` with this message
    Reject(String),
    /// Stay silent
    Ignore,
}

/// Behavior of the in-memory server.
#[derive(Debug, Clone)]
pub struct ServerScript {
    /// Report sockets open as soon as they are opened
    pub auto_accept: bool,
    /// Answer to `auth`
    pub auth: AuthReply,
    /// `(user_id, display_name)` pairs returned for `getOnlineUsers`
    pub roster: Vec<(String, String)>,
}

impl Default for ServerScript {
    fn default() -> Self {
        Self { auto_accept: true, auth: AuthReply::Accept, roster: Vec::new() }
    }
}

/// Shared state for event injection.
///
/// This allows injection while the session owns the driver.
#[derive(Debug, Default)]
struct SharedState {
    pending: VecDeque<SocketEvent>,
    current: Option<SocketId>,
    opened: Vec<(SocketId, String)>,
    written: Vec<(SocketId, String)>,
    closed: Vec<(SocketId, u16, String)>,
    refuse_opens: u32,
}

/// Simulation driver for deterministic testing.
///
/// Polling an empty queue advances the shared virtual clock by the poll
/// timeout, exactly as a real poll would have waited.
#[derive(Debug, Clone)]
pub struct SimDriver {
    env: SimEnv,
    script: ServerScript,
    state: Arc<Mutex<SharedState>>,
}

impl SimDriver {
    /// Create a driver with the default server script.
    pub fn new(env: SimEnv) -> Self {
        Self::with_script(env, ServerScript::default())
    }

    /// Create a driver with a custom server script.
    pub fn with_script(env: SimEnv, script: ServerScript) -> Self {
        Self { env, script, state: Arc::new(Mutex::new(SharedState::default())) }
    }

    /// Queue an arbitrary socket event.
    pub fn inject(&self, event: SocketEvent) {
        self.lock().pending.push_back(event);
    }

    /// Queue a text chunk on the current socket.
    pub fn inject_text(&self, text: impl Into<String>) {
        let mut state = self.lock();
        if let Some(socket) = state.current {
            state.pending.push_back(SocketEvent::Text { socket, text: text.into() });
        }
    }

    /// Queue a server-side close of the current socket.
    pub fn inject_close(&self, code: u16) {
        let mut state = self.lock();
        if let Some(socket) = state.current.take() {
            state.pending.push_back(SocketEvent::Closed { socket, code });
        }
    }

    /// Queue a transport failure of the current socket, followed by its
    /// close.
    pub fn inject_failure(&self, reason: &str) {
        let mut state = self.lock();
        if let Some(socket) = state.current.take() {
            state.pending.push_back(SocketEvent::Failed { socket, reason: reason.to_string() });
            state.pending.push_back(SocketEvent::Closed { socket, code: ABNORMAL_CLOSURE });
        }
    }

    /// Report the current socket open (when `auto_accept` is off).
    pub fn accept(&self) {
        let mut state = self.lock();
        if let Some(socket) = state.current {
            state.pending.push_back(SocketEvent::Opened { socket });
        }
    }

    /// Make the next `count` opens fail during the handshake.
    pub fn refuse_next_opens(&self, count: u32) {
        self.lock().refuse_opens = count;
    }

    /// Socket most recently opened and not yet closed.
    pub fn current_socket(&self) -> Option<SocketId> {
        self.lock().current
    }

    /// Every socket opened so far, with its URL.
    pub fn opened(&self) -> Vec<(SocketId, String)> {
        self.lock().opened.clone()
    }

    /// Every socket the session closed, with code and reason.
    pub fn closed(&self) -> Vec<(SocketId, u16, String)> {
        self.lock().closed.clone()
    }

    /// Drain documents written since the last call, parsed as JSON.
    pub fn take_written(&self) -> Vec<Value> {
        std::mem::take(&mut self.lock().written)
            .into_iter()
            .filter_map(|(_, text)| serde_json::from_str(&text).ok())
            .collect()
    }

    /// Returns true if events are waiting to be polled.
    pub fn has_pending(&self) -> bool {
        !self.lock().pending.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn answer(&self, state: &mut SharedState, socket: SocketId, text: &str) {
        let Ok(doc) = serde_json::from_str::<Value>(text) else {
            return;
        };

        let reply = match doc.get("type").and_then(Value::as_str) {
            Some("auth") => match &self.script.auth {
                AuthReply::Accept => json!({ "type": "authSuccess" }),
                AuthReply::Reject(message) => json!({ "type": "authError", "message": message }),
                AuthReply::Ignore => return,
            },
            Some("getOnlineUsers") => {
                let users: Vec<Value> = self
                    .script
                    .roster
                    .iter()
                    .map(|(id, name)| json!({ "userId": id, "displayName": name }))
                    .collect();
                json!({ "type": "onlineUsers", "users": users })
            },
            _ => return,
        };

        tracing::trace!(%socket, %reply, "scripted reply");
        state.pending.push_back(SocketEvent::Text { socket, text: reply.to_string() });
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;

    fn open(&mut self, socket: SocketId, url: &str) -> Result<(), Self::Error> {
        let mut state = self.lock();
        state.opened.push((socket, url.to_string()));

        if state.refuse_opens > 0 {
            state.refuse_opens -= 1;
            state.current = None;
            state.pending.push_back(SocketEvent::Failed {
                socket,
                reason: "connection refused".to_string(),
            });
            state.pending.push_back(SocketEvent::Closed { socket, code: ABNORMAL_CLOSURE });
            return Ok(());
        }

        state.current = Some(socket);
        if self.script.auto_accept {
            state.pending.push_back(SocketEvent::Opened { socket });
        }
        Ok(())
    }

    fn send_text(&mut self, socket: SocketId, text: String) -> Result<(), Self::Error> {
        let mut state = self.lock();
        if state.current != Some(socket) {
            return Err(SimDriverError(format!("write to closed {socket}")));
        }

        self.answer(&mut state, socket, &text);
        state.written.push((socket, text));
        Ok(())
    }

    fn close(&mut self, socket: SocketId, code: u16, reason: &str) -> Result<(), Self::Error> {
        let mut state = self.lock();
        state.closed.push((socket, code, reason.to_string()));
        if state.current == Some(socket) {
            state.current = None;
        }
        state.pending.push_back(SocketEvent::Closed { socket, code });
        Ok(())
    }

    fn poll_event(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<SocketEvent>, Self::Error>> + Send {
        let event = self.lock().pending.pop_front();
        if event.is_none() {
            self.env.advance(timeout);
        }
        std::future::ready(Ok(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_server_answers_auth_and_roster() {
        let script = ServerScript {
            roster: vec![("bob".into(), "Bob".into())],
            ..ServerScript::default()
        };
        let mut driver = SimDriver::with_script(SimEnv::new(), script);
        let socket = SocketId::new(1);

        driver.open(socket, "ws://sim/ws").unwrap();
        driver.send_text(socket, r#"{"type":"auth"}"#.into()).unwrap();
        driver.send_text(socket, r#"{"type":"getOnlineUsers"}"#.into()).unwrap();

        let state = driver.lock();
        assert_eq!(state.pending.len(), 3);
        assert_eq!(state.pending[0], SocketEvent::Opened { socket });
        let roster = &state.pending[2];
        assert!(matches!(roster, SocketEvent::Text { text, .. } if text.contains("Bob")));
    }

    #[test]
    fn refused_open_reports_failure_then_close() {
        let mut driver = SimDriver::new(SimEnv::new());
        driver.refuse_next_opens(1);
        let socket = SocketId::new(1);

        driver.open(socket, "ws://sim/ws").unwrap();

        assert_eq!(driver.current_socket(), None);
        let state = driver.lock();
        assert!(matches!(state.pending[0], SocketEvent::Failed { .. }));
        assert_eq!(state.pending[1], SocketEvent::Closed { socket, code: ABNORMAL_CLOSURE });
    }

    #[tokio::test]
    async fn empty_poll_advances_virtual_time() {
        let env = SimEnv::new();
        let mut driver = SimDriver::new(env.clone());

        let event = driver.poll_event(Duration::from_millis(250)).await.unwrap();

        assert_eq!(event, None);
        assert_eq!(env.elapsed(), Duration::from_millis(250));
    }
}

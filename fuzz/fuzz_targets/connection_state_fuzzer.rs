//! Fuzz target for the connection state machine
//!
//! Drives `ConnectionManager` with arbitrary interleavings of user commands,
//! socket events (current and stale sockets) and clock advances.
//!
//! # Invariants
//!
//! - Reconnect attempts never exceed the configured maximum
//! - Authentication implies a live socket
//! - After `disconnect`, no retry is ever pending
//! - Outgoing documents are only queued on an open socket

#![no_main]

use std::time::{Duration, Instant};

use arbitrary::Arbitrary;
use chrono::{TimeZone, Utc};
use libfuzzer_sys::fuzz_target;
use parley_core::{ConnectionAction, ConnectionConfig, ConnectionManager, SocketEvent, SocketId};

#[derive(Debug, Arbitrary)]
enum Op {
    Connect { user: String },
    Disconnect,
    Opened { stale: bool },
    Text { stale: bool, text: String },
    AuthSuccess,
    AuthError,
    Closed { code: u16 },
    Failed,
    Advance { millis: u16 },
    Send { content: String },
    Typing { active: bool },
    Rename { name: String },
    Roster,
}

fuzz_target!(|ops: Vec<Op>| {
    let config = ConnectionConfig::default();
    let max_attempts = config.max_reconnect_attempts;
    let mut manager: ConnectionManager<Instant> = ConnectionManager::new(config);
    let base = Instant::now();
    let mut now = base;
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let mut ever_disconnected = false;

    for op in ops {
        let current = manager.socket();
        let target = |stale: bool| match (stale, current) {
            (false, Some(socket)) => socket,
            (_, Some(socket)) => SocketId::new(socket.get().wrapping_add(1)),
            (_, None) => SocketId::new(0),
        };

        let actions = match op {
            Op::Connect { user } => manager.connect("team", &user, ""),
            Op::Disconnect => {
                ever_disconnected = true;
                manager.disconnect()
            },
            Op::Opened { stale } => {
                manager.handle(SocketEvent::Opened { socket: target(stale) }, now, at);
                Vec::new()
            },
            Op::Text { stale, text } => {
                manager.handle(SocketEvent::Text { socket: target(stale), text }, now, at);
                Vec::new()
            },
            Op::AuthSuccess => {
                let text = r#"{"type":"authSuccess"}"#.to_string();
                manager.handle(SocketEvent::Text { socket: target(false), text }, now, at);
                Vec::new()
            },
            Op::AuthError => {
                let text = r#"{"type":"authError","message":"nope"}"#.to_string();
                manager.handle(SocketEvent::Text { socket: target(false), text }, now, at);
                Vec::new()
            },
            Op::Closed { code } => {
                manager.handle(SocketEvent::Closed { socket: target(false), code }, now, at);
                Vec::new()
            },
            Op::Failed => {
                let reason = "reset".to_string();
                manager.handle(SocketEvent::Failed { socket: target(false), reason }, now, at);
                Vec::new()
            },
            Op::Advance { millis } => {
                now += Duration::from_millis(u64::from(millis));
                manager.tick(now)
            },
            Op::Send { content } => {
                let _ = manager.send_message(&content, at);
                Vec::new()
            },
            Op::Typing { active } => {
                let _ = manager.send_typing(active, None);
                Vec::new()
            },
            Op::Rename { name } => {
                let _ = manager.update_display_name(&name);
                Vec::new()
            },
            Op::Roster => {
                let _ = manager.request_online_users();
                Vec::new()
            },
        };

        for action in &actions {
            if let ConnectionAction::OpenSocket { socket, .. } = action {
                assert_eq!(manager.socket(), Some(*socket), "opened socket is not current");
            }
        }

        assert!(manager.reconnect_attempts() <= max_attempts, "retry budget exceeded");
        if manager.is_authenticated() {
            assert!(manager.socket().is_some(), "authenticated without a socket");
        }
        if ever_disconnected {
            assert!(!manager.has_pending_retry(), "retry pending after disconnect");
        }
        if !manager.is_open() {
            assert!(manager.take_outgoing().is_empty(), "documents queued on a closed socket");
        }
        manager.take_outgoing();
    }
});

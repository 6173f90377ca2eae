//! End-to-end session behavior under virtual time.
//!
//! Runs the production `ChatSession` over the simulation driver. Every test
//! ends with the standard invariant checks.

use std::time::Duration;

use parley_app::{ChannelId, ChatSession, ChatStateStore, SessionConfig, SessionError};
use parley_core::{ConnectionError, ConnectionState, MessageKind};
use parley_harness::{
    AuthReply, InvariantRegistry, ServerScript, SessionSnapshot, SimDriver, SimEnv, SimInstant,
};
use serde_json::Value;

type Session = ChatSession<SimDriver, SimEnv>;

struct Sim {
    env: SimEnv,
    driver: SimDriver,
    session: Session,
}

impl Sim {
    fn new(script: ServerScript) -> Self {
        let env = SimEnv::new();
        let driver = SimDriver::with_script(env.clone(), script);
        let session = ChatSession::new(driver.clone(), env.clone(), SessionConfig::default());
        Self { env, driver, session }
    }

    fn with_roster() -> Self {
        Self::new(ServerScript {
            roster: vec![("bob".into(), "Bob".into()), ("carol".into(), "Carol".into())],
            ..ServerScript::default()
        })
    }

    async fn login(&mut self) {
        self.session.connect("team-alpha", "alice", "Alice").await.unwrap();
        self.drain().await;
    }

    /// Process queued events without moving the clock.
    async fn drain(&mut self) {
        while self.driver.has_pending() {
            self.session.process_cycle().await.unwrap();
        }
    }

    /// Run the event loop until `duration` of virtual time has passed.
    async fn run_for(&mut self, duration: Duration) {
        let target = self.env.elapsed() + duration;
        while self.env.elapsed() < target {
            self.session.process_cycle().await.unwrap();
        }
    }

    fn written_types(&self) -> Vec<String> {
        self.driver
            .take_written()
            .iter()
            .filter_map(|doc| doc["type"].as_str().map(str::to_string))
            .collect()
    }

    fn check_invariants(&self, context: &str) {
        let snapshot = SessionSnapshot::capture(&self.session.store());
        InvariantRegistry::standard().assert_all(&snapshot, context);
    }
}

fn transcript(store: &ChatStateStore<SimInstant>, channel: &ChannelId) -> String {
    store
        .messages(channel)
        .iter()
        .map(|m| {
            let at = m.timestamp.format("%H:%M:%S");
            format!("[{at}] {}: {}", m.sender_name, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[tokio::test]
async fn login_authenticates_and_loads_presence() {
    let mut sim = Sim::with_roster();

    sim.login().await;

    assert_eq!(sim.written_types(), vec!["auth", "getOnlineUsers"]);
    assert_eq!(sim.session.manager().state(), ConnectionState::Authenticated);
    {
        let store = sim.session.store();
        assert!(store.is_authenticated());
        assert_eq!(store.presence().collect::<Vec<_>>(), vec![("bob", "Bob"), ("carol", "Carol")]);
        insta::assert_snapshot!(
            transcript(&store, &ChannelId::Main),
            @"[12:00:00] System: Successfully connected to chat"
        );
    }
    sim.check_invariants("after login");
}

#[tokio::test]
async fn abnormal_close_reconnects_after_interval() {
    let mut sim = Sim::with_roster();
    sim.login().await;
    sim.driver.take_written();

    sim.driver.inject_close(1006);
    sim.drain().await;
    assert_eq!(sim.session.manager().state(), ConnectionState::Disconnected);
    assert!(!sim.session.store().is_authenticated());
    sim.check_invariants("after close");

    sim.run_for(Duration::from_millis(2900)).await;
    assert_eq!(sim.driver.opened().len(), 1);

    sim.run_for(Duration::from_millis(200)).await;
    assert_eq!(sim.driver.opened().len(), 2);
    assert!(sim.session.store().is_authenticated());
    assert_eq!(sim.session.manager().reconnect_attempts(), 0);
    assert_eq!(sim.written_types(), vec!["auth", "getOnlineUsers"]);
    sim.check_invariants("after reconnect");
}

#[tokio::test]
async fn retries_stop_after_max_attempts() {
    let mut sim = Sim::with_roster();
    sim.login().await;

    sim.driver.refuse_next_opens(10);
    sim.driver.inject_close(1011);
    sim.run_for(Duration::from_secs(60)).await;

    assert_eq!(sim.driver.opened().len(), 6);
    assert_eq!(sim.session.manager().reconnect_attempts(), 5);
    assert!(!sim.session.manager().has_pending_retry());
    assert!(matches!(sim.session.manager().last_error(), Some(ConnectionError::Transport(_))));
    sim.check_invariants("after giving up");
}

#[tokio::test]
async fn normal_closure_does_not_reconnect() {
    let mut sim = Sim::with_roster();
    sim.login().await;

    sim.driver.inject_close(1000);
    sim.run_for(Duration::from_secs(10)).await;

    assert_eq!(sim.driver.opened().len(), 1);
    assert_eq!(sim.session.manager().state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn disconnect_cancels_pending_retry() {
    let mut sim = Sim::with_roster();
    sim.login().await;

    sim.driver.inject_close(4000);
    sim.drain().await;
    assert!(sim.session.manager().has_pending_retry());

    sim.session.disconnect().unwrap();
    sim.run_for(Duration::from_secs(10)).await;

    assert_eq!(sim.driver.opened().len(), 1);
    assert!(sim.session.manager().is_manually_disconnected());
    assert!(sim.session.store().messages(&ChannelId::Main).is_empty());
    sim.check_invariants("after logout");
}

#[tokio::test]
async fn disconnect_closes_socket_normally() {
    let mut sim = Sim::with_roster();
    sim.login().await;
    let socket = sim.driver.current_socket().unwrap();

    sim.session.disconnect().unwrap();
    sim.drain().await;

    assert_eq!(sim.driver.closed(), vec![(socket, 1000, "User disconnected".to_string())]);
    assert_eq!(sim.session.manager().state(), ConnectionState::Disconnected);
    assert!(sim.session.manager().session().is_none());
}

#[tokio::test]
async fn rejected_auth_keeps_socket_and_blocks_sends() {
    let mut sim = Sim::new(ServerScript {
        auth: AuthReply::Reject("bad token".into()),
        ..ServerScript::default()
    });
    sim.login().await;

    assert_eq!(sim.session.manager().state(), ConnectionState::AuthFailed);
    assert!(sim.driver.current_socket().is_some());
    assert!(matches!(sim.session.manager().last_error(), Some(ConnectionError::Auth(_))));
    {
        let store = sim.session.store();
        assert!(!store.is_authenticated());
        insta::assert_snapshot!(
            transcript(&store, &ChannelId::Main),
            @"[12:00:00] System: Authentication failed: bad token"
        );
    }

    let err = sim.session.send_message("hello").unwrap_err();
    assert!(matches!(err, SessionError::Connection(ConnectionError::InvalidState { .. })));
    assert!(sim.session.store().messages(&ChannelId::Main).len() == 1);
    sim.check_invariants("after rejection");
}

#[tokio::test]
async fn typing_debounces_to_one_start_and_one_stop() {
    let mut sim = Sim::with_roster();
    sim.login().await;
    sim.driver.take_written();

    for _ in 0..3 {
        sim.session.keystroke().unwrap();
        sim.run_for(Duration::from_millis(500)).await;
    }
    assert_eq!(sim.written_types(), vec!["typingStart"]);

    sim.run_for(Duration::from_millis(2100)).await;
    assert_eq!(sim.written_types(), vec!["typingStop"]);
    assert!(!sim.session.store().is_composing());
}

#[tokio::test]
async fn private_conversation_round_trip() {
    let mut sim = Sim::with_roster();
    sim.login().await;
    sim.driver.take_written();

    sim.driver.inject_text(concat!(
        r#"{"type":"privateMessage","senderId":"bob","senderName":"Bob","#,
        r#""recipientId":"alice","content":"psst","timestamp":1714564800000}"#,
    ));
    sim.drain().await;
    let bob = ChannelId::Private("bob".into());
    assert_eq!(sim.session.store().unread(&bob), 1);
    sim.check_invariants("after private message");

    assert!(sim.session.open_private_chat("bob").unwrap());
    assert_eq!(sim.session.store().unread(&bob), 0);

    sim.session.keystroke().unwrap();
    sim.session.send_message("hi bob").unwrap();
    let written = sim.driver.take_written();
    let types: Vec<_> = written.iter().map(|d| d["type"].clone()).collect();
    assert_eq!(types, vec!["typingStart", "privateMessage", "typingStop"]);
    assert_eq!(written[0]["recipientId"], "bob");
    assert_eq!(written[1]["recipientId"], "bob");
    assert_eq!(written[1]["content"], "hi bob");
    assert_eq!(written[2]["recipientId"], "bob");

    {
        let store = sim.session.store();
        let messages = store.messages(&bob);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].kind, MessageKind::Private);
        assert!(messages[1].is_own);
    }

    assert!(sim.session.close_private_chat("bob").unwrap());
    assert_eq!(sim.session.store().active(), &ChannelId::Main);
    sim.check_invariants("after closing private chat");
}

#[tokio::test]
async fn unknown_documents_do_not_block_the_batch() {
    let mut sim = Sim::with_roster();
    sim.login().await;

    sim.driver.inject_text(concat!(
        r#"{"type":"reaction","emoji":"+1"}"#,
        r#"{"type":"userJoined","userId":"dave","displayName":"Dave"}"#,
        r#"{"type":"userLeft","userId":"carol"}"#,
    ));
    sim.drain().await;

    let store = sim.session.store();
    assert_eq!(store.presence_name("dave"), Some("Dave"));
    assert_eq!(store.presence_name("carol"), None);
    insta::assert_snapshot!(transcript(&store, &ChannelId::Main), @r"
    [12:00:00] System: Successfully connected to chat
    [12:00:00] System: Dave joined the chat
    [12:00:00] System: Carol left the chat
    ");
}

#[tokio::test]
async fn own_echo_from_server_is_not_duplicated() {
    let mut sim = Sim::with_roster();
    sim.login().await;

    sim.session.send_message("hello team").unwrap();
    let sent: Vec<Value> = sim.driver.take_written();
    assert_eq!(sent[0]["type"], "userMessage");

    sim.driver.inject_text(
        r#"{"type":"userMessage","senderId":"alice","senderName":"Alice","content":"hello team"}"#,
    );
    sim.drain().await;

    let store = sim.session.store();
    let main = store.messages(&ChannelId::Main);
    assert_eq!(main.len(), 2);
    assert!(main[1].is_own);
}

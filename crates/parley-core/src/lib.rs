//! Parley session core
//!
//! Sans-IO building blocks of the chat client:
//!
//! - [`bus`]: synchronous publish/subscribe keyed by event kind
//! - [`router`]: wire documents to [`ChatEvent`]s
//! - [`connection`]: socket lifecycle, auth handshake and reconnection
//!
//! Data flows socket text → [`parley_proto::FrameDecoder`] → [`MessageRouter`]
//! → [`EventBus`] → subscribers. Nothing in this crate performs I/O or reads
//! a clock; the runtime feeds in socket events and time and executes the
//! returned [`ConnectionAction`]s.

#![forbid(unsafe_code)]

pub mod bus;
pub mod connection;
pub mod env;
pub mod error;
pub mod event;
pub mod router;
pub mod socket;

pub use bus::{Event, EventBus, Listener, ListenerId, PublishReport};
pub use connection::{
    ConnectionAction, ConnectionConfig, ConnectionManager, ConnectionState, NORMAL_CLOSURE,
    Session,
};
pub use env::Environment;
pub use error::{ConnectionError, ListenerError};
pub use event::{ChatEvent, EventKind, InboundMessage, MessageKind, Peer};
pub use router::{MessageRouter, RouteContext};
pub use socket::{SocketEvent, SocketId};

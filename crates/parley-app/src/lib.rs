//! Application layer for Parley
//!
//! View-model state machine and generic runtime, enabling deterministic
//! simulation testing with the same code that runs in production.
//!
//! # Components
//!
//! - [`ChatStateStore`]: channels, unread counters, typing and presence
//! - [`Driver`]: Trait for platform-specific socket I/O
//! - [`ChatSession`]: Generic orchestration loop using Driver

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod driver;
mod runtime;
mod state;
mod store;

pub use driver::Driver;
pub use runtime::{ChatSession, DEFAULT_TICK_INTERVAL, SessionConfig, SessionError};
pub use state::{Channel, ChannelId, Message, MessageId, TypingKey};
pub use store::{
    ChatStateStore, CommandSink, DEFAULT_REMOTE_TYPING_TTL, DEFAULT_TYPING_TIMEOUT,
    SYSTEM_SENDER, StoreConfig,
};

//! Deterministic simulation harness for Parley session testing.
//!
//! Virtual-time implementations of the Environment and Driver traits, so the
//! production [`parley_app::ChatSession`] runs reproducibly without sockets
//! or wall-clock waits.
//!
//! # Invariant Testing
//!
//! The `invariants` module provides behavioral testing through invariant
//! checks. Invariants verify WHAT must be true across all execution paths, not
//! specific scenarios. Use [`InvariantRegistry::standard()`] for the
//! view-model invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod sim_driver;
pub mod sim_env;

pub use invariants::{
    ActiveChannelExists, ActiveChannelHasNoUnread, AuthImpliesConnected, ChannelSnapshot,
    Invariant, InvariantRegistry, InvariantResult, MainChannelPresent, MessageIdsUnique,
    SelfNeverTyping, SessionSnapshot, UnreadBounded, Violation,
};
pub use sim_driver::{ABNORMAL_CLOSURE, AuthReply, ServerScript, SimDriver, SimDriverError};
pub use sim_env::{SIM_EPOCH_SECS, SimEnv, SimInstant};

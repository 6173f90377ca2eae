//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.

use std::collections::HashSet;

use parley_app::ChannelId;
use parley_core::ConnectionState;

use super::{Invariant, InvariantResult, SessionSnapshot, Violation};

/// The main channel always exists.
pub struct MainChannelPresent;

impl Invariant for MainChannelPresent {
    fn name(&self) -> &'static str {
        "main_channel_present"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        if state.channels.contains_key(&ChannelId::Main) {
            return Ok(());
        }
        Err(Violation { invariant: self.name(), message: "main channel missing".to_string() })
    }
}

/// Active channel must exist.
///
/// This prevents the UI from showing a selected conversation that has been
/// closed.
pub struct ActiveChannelExists;

impl Invariant for ActiveChannelExists {
    fn name(&self) -> &'static str {
        "active_channel_exists"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        if state.channels.contains_key(&state.active) {
            return Ok(());
        }
        Err(Violation {
            invariant: self.name(),
            message: format!(
                "active channel {} not in {:?}",
                state.active,
                state.channels.keys().collect::<Vec<_>>()
            ),
        })
    }
}

/// The channel being viewed never accumulates unread messages.
pub struct ActiveChannelHasNoUnread;

impl Invariant for ActiveChannelHasNoUnread {
    fn name(&self) -> &'static str {
        "active_channel_has_no_unread"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        let unread = state.channels.get(&state.active).map_or(0, |c| c.unread);
        if unread == 0 {
            return Ok(());
        }
        Err(Violation {
            invariant: self.name(),
            message: format!("active channel {} has {unread} unread", state.active),
        })
    }
}

/// Unread counters never exceed the non-system messages in the channel.
pub struct UnreadBounded;

impl Invariant for UnreadBounded {
    fn name(&self) -> &'static str {
        "unread_bounded"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        for (id, channel) in &state.channels {
            if channel.unread > channel.countable() {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "channel {id}: {} unread but only {} countable messages",
                        channel.unread,
                        channel.countable()
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Message ids are unique across all channels.
pub struct MessageIdsUnique;

impl Invariant for MessageIdsUnique {
    fn name(&self) -> &'static str {
        "message_ids_unique"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        let mut seen = HashSet::new();
        for (id, channel) in &state.channels {
            for message in &channel.message_ids {
                if !seen.insert(*message) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("channel {id}: duplicate {message:?}"),
                    });
                }
            }
        }
        Ok(())
    }
}

/// The local user is never listed as typing.
pub struct SelfNeverTyping;

impl Invariant for SelfNeverTyping {
    fn name(&self) -> &'static str {
        "self_never_typing"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        let Some(self_id) = state.self_id.as_deref() else {
            return Ok(());
        };
        match state.typing.iter().find(|(_, user)| user == self_id) {
            Some((channel, _)) => Err(Violation {
                invariant: self.name(),
                message: format!("local user shown typing in {channel}"),
            }),
            None => Ok(()),
        }
    }
}

/// Authentication only holds while a socket is up.
///
/// `Error` is allowed: a transport failure is reported before the close that
/// clears the flag.
pub struct AuthImpliesConnected;

impl Invariant for AuthImpliesConnected {
    fn name(&self) -> &'static str {
        "auth_implies_connected"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        let allowed =
            matches!(state.connection, ConnectionState::Authenticated | ConnectionState::Error);
        if !state.authenticated || allowed {
            return Ok(());
        }
        Err(Violation {
            invariant: self.name(),
            message: format!("authenticated while {}", state.connection),
        })
    }
}

//! Error types for the Parley session core.
//!
//! One variant per failure class the session layer distinguishes:
//!
//! - `Parse`: a framed document could not be decoded. The frame is skipped and
//!   the rest of the batch continues.
//! - `Auth`: the server rejected the credentials. Surfaced as status and a
//!   system notice; the socket stays open.
//! - `Transport`: the socket failed. Eligible for reconnection.
//! - `Protocol`: a well-formed document of a type this client does not know.
//!   Logged and dropped.
//!
//! `InvalidInput` and `InvalidState` reject a caller's command before
//! anything reaches the socket. None of these are fatal to the process.

use parley_proto::ProtocolError;
use thiserror::Error;

use crate::connection::ConnectionState;

/// Errors surfaced by the connection state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Frame was not a decodable document
    #[error("parse error: {0}")]
    Parse(String),

    /// Server rejected authentication
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Socket-level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Document type not understood by this client
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Caller input rejected before anything was sent
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// Operation attempted in a state that does not allow it
    #[error("invalid state transition: cannot {operation} while {state}")]
    InvalidState {
        /// Current state when the error occurred
        state: ConnectionState,
        /// Operation that was attempted
        operation: &'static str,
    },
}

impl ConnectionError {
    /// Returns true if this error may clear up on its own by reconnecting.
    ///
    /// Only transport failures are transient. A rejected token or a broken
    /// document will fail the same way on the next socket.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<ProtocolError> for ConnectionError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Malformed { .. } | ProtocolError::MissingType => {
                Self::Parse(err.to_string())
            },
            ProtocolError::UnknownType(_) | ProtocolError::Encode { .. } => {
                Self::Protocol(err.to_string())
            },
        }
    }
}

/// Failure reported by an event listener.
///
/// The bus logs it and keeps dispatching to the remaining listeners.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("listener failed: {reason}")]
pub struct ListenerError {
    reason: String,
}

impl ListenerError {
    /// Create a listener error with a human-readable reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }

    /// Reason given by the listener.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_transient() {
        assert!(ConnectionError::Transport("connection reset".to_string()).is_transient());
    }

    #[test]
    fn other_errors_are_not_transient() {
        assert!(!ConnectionError::Parse("eof".to_string()).is_transient());
        assert!(!ConnectionError::Auth("bad token".to_string()).is_transient());
        assert!(!ConnectionError::Protocol("reaction".to_string()).is_transient());
        assert!(!ConnectionError::InvalidInput("content is empty").is_transient());
        assert!(
            !ConnectionError::InvalidState {
                state: ConnectionState::Disconnected,
                operation: "send_message",
            }
            .is_transient()
        );
    }

    #[test]
    fn protocol_errors_split_into_parse_and_protocol() {
        let malformed = ProtocolError::Malformed { reason: "eof".to_string() };
        assert!(matches!(ConnectionError::from(malformed), ConnectionError::Parse(_)));
        assert!(matches!(
            ConnectionError::from(ProtocolError::MissingType),
            ConnectionError::Parse(_)
        ));
        assert!(matches!(
            ConnectionError::from(ProtocolError::UnknownType("reaction".to_string())),
            ConnectionError::Protocol(_)
        ));
    }

    #[test]
    fn invalid_state_message_uses_wire_state_name() {
        let err = ConnectionError::InvalidState {
            state: ConnectionState::AuthFailed,
            operation: "send_message",
        };
        assert_eq!(
            err.to_string(),
            "invalid state transition: cannot send_message while auth_failed"
        );
    }
}

//! Socket handles and the events a transport reports about them.

use std::fmt;

/// Generation number of a socket opened by the connection manager.
///
/// Every `OpenSocket` action carries a fresh id. Events tagged with any other
/// id belong to a socket the manager has already abandoned and are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(u64);

impl SocketId {
    /// Wrap a raw generation number.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw generation number.
    pub const fn get(self) -> u64 {
        self.0
    }

    pub(crate) const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket#{}", self.0)
    }
}

/// Something that happened on a socket, as reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// Handshake completed; the socket accepts writes.
    Opened {
        /// Socket that opened
        socket: SocketId,
    },
    /// A text chunk arrived.
    Text {
        /// Socket the chunk arrived on
        socket: SocketId,
        /// Raw chunk, possibly several concatenated documents
        text: String,
    },
    /// The socket closed.
    Closed {
        /// Socket that closed
        socket: SocketId,
        /// Close code; 1000 is a normal closure
        code: u16,
    },
    /// The socket errored. A `Closed` usually follows.
    Failed {
        /// Socket that failed
        socket: SocketId,
        /// Transport diagnostic
        reason: String,
    },
}

impl SocketEvent {
    /// Socket this event refers to.
    pub fn socket(&self) -> SocketId {
        match self {
            Self::Opened { socket }
            | Self::Text { socket, .. }
            | Self::Closed { socket, .. }
            | Self::Failed { socket, .. } => *socket,
        }
    }
}

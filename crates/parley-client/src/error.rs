//! Transport error types.

use parley_core::SocketId;
use thiserror::Error;

/// Failures of the WebSocket driver itself.
///
/// Handshake and socket failures are not errors here: they are reported to
/// the session as `Failed` and `Closed` events so the reconnection policy can
/// act on them.
#[derive(Error, Debug)]
pub enum TransportError {
    /// URL could not be turned into a WebSocket handshake request
    #[error("invalid server url {url}: {reason}")]
    InvalidUrl {
        /// URL as configured
        url: String,
        /// Parser diagnostic
        reason: String,
    },

    /// Opening a socket requires a running Tokio runtime
    #[error("no tokio runtime available to drive the socket")]
    NoRuntime,

    /// No socket with this id was opened, or it has already closed
    #[error("unknown {0}")]
    UnknownSocket(SocketId),

    /// The socket's I/O task has exited
    #[error("{0} is no longer running")]
    SocketGone(SocketId),

    /// The event channel was closed
    #[error("event channel closed")]
    EventChannelClosed,
}

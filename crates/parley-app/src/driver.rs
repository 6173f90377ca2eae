//! Driver trait for abstracting socket I/O.
//!
//! The [`Driver`] trait decouples the session runtime from a specific
//! WebSocket implementation. Production wraps a real socket; simulation
//! scripts a server in memory. The generic [`crate::ChatSession`] handles
//! all orchestration on top of either.

use std::{future::Future, time::Duration};

use parley_core::{SocketEvent, SocketId};

/// Abstracts socket I/O for the session runtime.
///
/// Only [`poll_event`](Driver::poll_event) is asynchronous. Opening, writing
/// and closing hand work to the implementation and return immediately; their
/// outcome arrives later as a [`SocketEvent`]. This keeps the runtime's event
/// loop cancel-safe under `tokio::select!`.
///
/// # Contract
///
/// - Every event carries the [`SocketId`] it was opened with.
/// - A `Failed` event is followed by a `Closed` event for the same socket.
/// - After `close`, the driver may still report a `Closed` for that socket;
///   the runtime treats it as stale.
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Start opening a socket to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt could not even be started (for
    /// example a malformed URL). Handshake failures are reported as events.
    fn open(&mut self, socket: SocketId, url: &str) -> Result<(), Self::Error>;

    /// Queue a text frame on `socket`.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket is unknown or its writer is gone.
    fn send_text(&mut self, socket: SocketId, text: String) -> Result<(), Self::Error>;

    /// Close `socket` with a close code and reason.
    ///
    /// # Errors
    ///
    /// Returns an error if the close frame could not be queued.
    fn close(&mut self, socket: SocketId, code: u16, reason: &str) -> Result<(), Self::Error>;

    /// Wait up to `timeout` for the next socket event.
    ///
    /// Returns `None` on timeout. Dropping the future before it completes
    /// must not lose an event.
    fn poll_event(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<SocketEvent>, Self::Error>> + Send;
}

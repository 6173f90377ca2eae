//! WebSocket driver built on tokio-tungstenite.
//!
//! Each socket runs in its own task that owns both halves of the stream.
//! Commands reach it over an unbounded channel; everything it observes goes
//! back to the driver as [`SocketEvent`]s on a shared channel, so the
//! session sees a single ordered event stream regardless of how many sockets
//! have come and gone.

use std::{collections::HashMap, future::Future, time::Duration};

use futures_util::{SinkExt, StreamExt};
use parley_app::Driver;
use parley_core::{SocketEvent, SocketId};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        handshake::client::Request,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};

use crate::TransportError;

/// Close code reported when the socket ended without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code reported for a close frame that carried no status.
const NO_STATUS_RECEIVED: u16 = 1005;

/// Command from the driver to a socket task.
#[derive(Debug)]
enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// Production [`Driver`] speaking WebSocket text frames.
///
/// Requires a Tokio runtime: [`Driver::open`] spawns the socket task on the
/// current one.
#[derive(Debug)]
pub struct WsDriver {
    events_tx: mpsc::UnboundedSender<SocketEvent>,
    events_rx: mpsc::UnboundedReceiver<SocketEvent>,
    sockets: HashMap<SocketId, mpsc::UnboundedSender<Outbound>>,
}

impl WsDriver {
    /// Create a driver with no sockets.
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self { events_tx, events_rx, sockets: HashMap::new() }
    }

    /// Number of sockets whose task has not yet reported `Closed`.
    pub fn live_sockets(&self) -> usize {
        self.sockets.len()
    }
}

impl Default for WsDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for WsDriver {
    type Error = TransportError;

    fn open(&mut self, socket: SocketId, url: &str) -> Result<(), Self::Error> {
        let request = url.into_client_request().map_err(|err| TransportError::InvalidUrl {
            url: url.to_string(),
            reason: err.to_string(),
        })?;
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        self.sockets.insert(socket, commands_tx);

        tracing::debug!(%socket, url, "opening socket");
        runtime.spawn(run_socket(socket, request, commands_rx, self.events_tx.clone()));
        Ok(())
    }

    fn send_text(&mut self, socket: SocketId, text: String) -> Result<(), Self::Error> {
        let commands = self.sockets.get(&socket).ok_or(TransportError::UnknownSocket(socket))?;
        commands.send(Outbound::Text(text)).map_err(|_| TransportError::SocketGone(socket))
    }

    fn close(&mut self, socket: SocketId, code: u16, reason: &str) -> Result<(), Self::Error> {
        let Some(commands) = self.sockets.remove(&socket) else {
            tracing::debug!(%socket, "close ignored, socket already gone");
            return Ok(());
        };
        commands
            .send(Outbound::Close { code, reason: reason.to_string() })
            .map_err(|_| TransportError::SocketGone(socket))
    }

    fn poll_event(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<SocketEvent>, Self::Error>> + Send {
        async move {
            let Ok(event) = tokio::time::timeout(timeout, self.events_rx.recv()).await else {
                return Ok(None);
            };
            let event = event.ok_or(TransportError::EventChannelClosed)?;

            if let SocketEvent::Closed { socket, .. } = &event {
                self.sockets.remove(socket);
            }
            Ok(Some(event))
        }
    }
}

/// Drive one socket from handshake to close.
///
/// Always ends by emitting `Closed`, preceded by `Failed` when the socket
/// broke rather than closed.
async fn run_socket(
    socket: SocketId,
    request: Request,
    mut commands: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<SocketEvent>,
) {
    let stream = match connect_async(request).await {
        Ok((stream, _response)) => stream,
        Err(err) => {
            tracing::warn!(%socket, error = %err, "handshake failed");
            emit(&events, SocketEvent::Failed { socket, reason: err.to_string() });
            emit(&events, SocketEvent::Closed { socket, code: ABNORMAL_CLOSURE });
            return;
        },
    };

    tracing::info!(%socket, "socket open");
    emit(&events, SocketEvent::Opened { socket });
    let (mut write, mut read) = stream.split();

    let code = loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    emit(&events, SocketEvent::Text { socket, text });
                },
                Some(Ok(Message::Close(frame))) => {
                    break frame.map_or(NO_STATUS_RECEIVED, |f| u16::from(f.code));
                },
                Some(Ok(Message::Binary(data))) => {
                    tracing::debug!(%socket, bytes = data.len(), "ignoring binary frame");
                },
                Some(Ok(_)) => {},
                Some(Err(err)) => {
                    tracing::warn!(%socket, error = %err, "socket read failed");
                    emit(&events, SocketEvent::Failed { socket, reason: err.to_string() });
                    break ABNORMAL_CLOSURE;
                },
                None => break ABNORMAL_CLOSURE,
            },
            command = commands.recv() => match command {
                Some(Outbound::Text(text)) => {
                    if let Err(err) = write.send(Message::Text(text)).await {
                        tracing::warn!(%socket, error = %err, "socket write failed");
                        emit(&events, SocketEvent::Failed { socket, reason: err.to_string() });
                        break ABNORMAL_CLOSURE;
                    }
                },
                Some(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame { code: CloseCode::from(code), reason: reason.into() };
                    if let Err(err) = write.send(Message::Close(Some(frame))).await {
                        tracing::debug!(%socket, error = %err, "close frame not sent");
                    }
                    break code;
                },
                // Driver dropped
                None => break ABNORMAL_CLOSURE,
            },
        }
    };

    tracing::info!(%socket, code, "socket closed");
    emit(&events, SocketEvent::Closed { socket, code });
}

fn emit(events: &mpsc::UnboundedSender<SocketEvent>, event: SocketEvent) {
    if events.send(event).is_err() {
        tracing::debug!("driver gone, dropping socket event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_url_is_rejected_before_spawning() {
        let mut driver = WsDriver::new();
        let err = driver.open(SocketId::new(1), "not a url").unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl { .. }));
        assert_eq!(driver.live_sockets(), 0);
    }

    #[test]
    fn open_outside_runtime_is_an_error() {
        let mut driver = WsDriver::new();
        let err = driver.open(SocketId::new(1), "ws://127.0.0.1:1/ws").unwrap_err();
        assert!(matches!(err, TransportError::NoRuntime));
    }

    #[test]
    fn unknown_socket_rejects_writes_but_not_closes() {
        let mut driver = WsDriver::new();
        let socket = SocketId::new(7);
        assert!(matches!(
            driver.send_text(socket, "{}".into()),
            Err(TransportError::UnknownSocket(_))
        ));
        assert!(driver.close(socket, 1000, "bye").is_ok());
    }

    #[tokio::test]
    async fn refused_connection_reports_failed_then_closed() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut driver = WsDriver::new();
        let socket = SocketId::new(1);
        driver.open(socket, &format!("ws://{addr}/ws")).unwrap();

        let first = driver.poll_event(Duration::from_secs(5)).await.unwrap();
        assert!(matches!(first, Some(SocketEvent::Failed { socket: s, .. }) if s == socket));
        let second = driver.poll_event(Duration::from_secs(5)).await.unwrap();
        assert_eq!(second, Some(SocketEvent::Closed { socket, code: ABNORMAL_CLOSURE }));
        assert_eq!(driver.live_sockets(), 0);
    }
}

//! WebSocket transport over tokio-tungstenite.
//!
//! One background task owns the socket. Callers talk to it through a
//! command channel, which gives a single-writer send queue for free: frames
//! go out in the order commands are processed, never interleaved. Commands
//! issued between `connect` and the handshake completing simply queue and
//! are transmitted once the socket opens.

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;

use crate::{Transport, TransportError, TransportEvent};

enum Command {
    Send {
        text: String,
        done: oneshot::Sender<Result<(), TransportError>>,
    },
    Close {
        done: oneshot::Sender<()>,
    },
}

struct Active {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

/// Evented WebSocket transport. `requires_manual_pump` is false; events are
/// delivered as the socket task reads them.
#[derive(Default)]
pub struct WebSocketTransport {
    active: Option<Active>,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for WebSocketTransport {
    async fn connect(
        &mut self,
        address: &str,
        credential: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<(), TransportError> {
        // A previous socket that died on its own leaves a stale handle
        // behind; only a live actor counts as connected.
        if let Some(active) = &self.active {
            if !active.cmd_tx.is_closed() {
                return Err(TransportError::AlreadyConnected);
            }
        }

        let mut request = address
            .into_client_request()
            .map_err(|e| TransportError::InvalidAddress(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {credential}"))
            .map_err(|e| TransportError::InvalidAddress(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_socket(request, cmd_rx, events));
        self.active = Some(Active { cmd_tx });

        // Deliberately resolved here: the handshake outcome arrives as an
        // Opened or Error event, not through this future.
        Ok(())
    }

    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        let Some(active) = self.active.as_ref() else {
            return Err(TransportError::NotConnected);
        };

        let (done, rx) = oneshot::channel();
        active
            .cmd_tx
            .send(Command::Send { text, done })
            .map_err(|_| TransportError::TaskStopped)?;
        rx.await.map_err(|_| TransportError::TaskStopped)?
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let Some(active) = self.active.take() else {
            return Err(TransportError::NotConnected);
        };

        let (done, rx) = oneshot::channel();
        active
            .cmd_tx
            .send(Command::Close { done })
            .map_err(|_| TransportError::TaskStopped)?;
        rx.await.map_err(|_| TransportError::TaskStopped)
    }
}

/// Socket task: performs the handshake, then drives the command channel and
/// the incoming stream until either side goes away.
async fn run_socket(
    request: tokio_tungstenite::tungstenite::handshake::client::Request,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let (ws, _response) = match connect_async(request).await {
        Ok(pair) => pair,
        Err(e) => {
            tracing::debug!(error = %e, "websocket handshake failed");
            let _ = events.send(TransportEvent::Error(e.to_string()));
            let _ = events.send(TransportEvent::Closed);
            return;
        }
    };
    let _ = events.send(TransportEvent::Opened);

    let (mut sink, mut stream) = ws.split();
    let mut close_done: Option<oneshot::Sender<()>> = None;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Send { text, done }) => {
                    let result = sink
                        .send(Message::Text(text.into()))
                        .await
                        .map_err(TransportError::WebSocket);
                    let _ = done.send(result);
                }
                Some(Command::Close { done }) => {
                    // Send the close frame, then keep reading until the
                    // peer acknowledges; `done` resolves with Closed below.
                    if let Err(e) = sink.close().await {
                        tracing::debug!(error = %e, "closing websocket sink");
                    }
                    close_done = Some(done);
                }
                None => {
                    // Owner dropped the transport.
                    let _ = sink.close().await;
                    break;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(TransportEvent::Message(text.to_string()));
                }
                Some(Ok(Message::Close(_))) => {
                    tracing::debug!("close frame received");
                }
                Some(Ok(_)) => {
                    // Binary, ping and pong frames are not part of the
                    // gateway protocol; the library answers pings itself.
                }
                Some(Err(e)) => {
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                    break;
                }
                None => break,
            },
        }
    }

    let _ = events.send(TransportEvent::Closed);
    if let Some(done) = close_done.take() {
        let _ = done.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_without_connect_is_an_error() {
        let mut transport = WebSocketTransport::new();
        let err = transport.send("hello".to_string()).await.unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }

    #[tokio::test]
    async fn disconnect_without_connect_is_an_error() {
        let mut transport = WebSocketTransport::new();
        let err = transport.disconnect().await.unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }

    #[tokio::test]
    async fn connect_resolves_before_any_handshake_outcome() {
        let mut transport = WebSocketTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Nothing listens on this port; the handshake will fail, but the
        // connect call itself must still resolve successfully.
        transport
            .connect("ws://127.0.0.1:9/", "token", tx)
            .await
            .unwrap();

        // The failure arrives as events, in order.
        assert!(matches!(rx.recv().await, Some(TransportEvent::Error(_))));
        assert_eq!(rx.recv().await, Some(TransportEvent::Closed));
    }
}

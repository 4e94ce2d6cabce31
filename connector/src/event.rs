//! Connection lifecycle events surfaced to the owner of the connection.

use tokio::sync::mpsc;

/// What the connection just did. Reconnect policy lives with whoever
/// consumes these, never in the connector itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The socket is open and usable.
    Opened,
    /// A socket-level failure. The connection may or may not survive it;
    /// `Closed` is the terminal signal.
    TransportError(String),
    /// The socket is gone. A new connect is required.
    Closed,
}

/// Receiver for lifecycle events.
pub struct ConnectionEvents {
    rx: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl ConnectionEvents {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<ConnectionEvent>) -> Self {
        Self { rx }
    }

    /// Receive the next lifecycle event.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.rx.recv().await
    }

    /// Receive without waiting.
    pub fn try_recv(&mut self) -> Option<ConnectionEvent> {
        self.rx.try_recv().ok()
    }

    /// Convert to a Stream for use with StreamExt.
    pub fn into_stream(self) -> impl futures::Stream<Item = ConnectionEvent> {
        tokio_stream::wrappers::UnboundedReceiverStream::new(self.rx)
    }
}

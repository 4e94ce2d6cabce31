//! Error types for the transport layer.

/// Errors surfaced on the call path of a [`crate::Transport`].
///
/// Wire-path failures (a socket dying mid-read) are not represented here;
/// those arrive as [`crate::TransportEvent::Error`] so that the owner of the
/// connection, not the task that happened to touch the socket last, decides
/// what to do about them.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An operation requires an active socket and there is none.
    #[error("transport is not connected")]
    NotConnected,

    /// A connect was issued while a socket is already active.
    #[error("transport is already connected")]
    AlreadyConnected,

    /// The address could not be turned into a socket request.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The socket task stopped before completing the operation.
    #[error("socket task stopped before the operation completed")]
    TaskStopped,

    /// A websocket protocol or I/O failure on the call path.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

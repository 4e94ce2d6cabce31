//! Lifecycle events emitted by every transport implementation.

/// What the socket just did.
///
/// Exactly one logical receive path consumes these; implementations never
/// emit two events concurrently for the same connection, but they may emit
/// from a different task than the caller's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The handshake completed; the socket is usable.
    Opened,
    /// One complete incoming text frame.
    Message(String),
    /// A socket-level failure. The connection is not retried here.
    Error(String),
    /// The socket is gone, cleanly or not. Terminal for this connect.
    Closed,
}

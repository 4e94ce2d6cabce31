//! Socket lifecycle layer for the relay gateway connection.
//!
//! This crate owns exactly one concern: a single long-lived duplex socket
//! and its lifecycle. Everything above it (request correlation, topic
//! fan-out) consumes the same four events regardless of which socket
//! implementation is underneath:
//!
//! - [`TransportEvent::Opened`]: the handshake completed
//! - [`TransportEvent::Message`]: one complete incoming text frame
//! - [`TransportEvent::Error`]: a socket-level failure (no automatic retry)
//! - [`TransportEvent::Closed`]: the socket is gone
//!
//! # The two-phase connect contract
//!
//! [`Transport::connect`] resolves as soon as the connect attempt has been
//! issued, not when the socket is usable. The handshake outcome arrives
//! later as an `Opened` (or `Error`) event. Callers that need a live socket
//! wait for `Opened`; the returned future only acknowledges the request.
//!
//! # Manual pumping
//!
//! Socket stacks without a native event loop need a periodic tick to drain
//! their receive queue. That capability is expressed as a runtime flag
//! ([`Transport::requires_manual_pump`]) rather than a compile-time branch,
//! so the layers above run unmodified on every target. Evented transports
//! report `false` and their [`Transport::pump`] is a no-op.

mod error;
mod event;
mod websocket;

pub mod testing;

pub use error::TransportError;
pub use event::TransportEvent;
pub use websocket::WebSocketTransport;

use std::future::Future;

use tokio::sync::mpsc;

/// A duplex socket with an explicit lifecycle.
///
/// Implementations deliver events on the channel supplied to `connect`.
/// Events may be emitted from any task; consumers must not assume
/// same-thread delivery.
pub trait Transport: Send + 'static {
    /// Whether this transport needs a periodic [`Transport::pump`] tick to
    /// deliver events. Evented transports return `false`.
    fn requires_manual_pump(&self) -> bool {
        false
    }

    /// Issue a connect attempt to `address`, authenticating with
    /// `credential`.
    ///
    /// Resolves once the attempt is underway, NOT once the socket is open.
    /// The handshake result is observed via [`TransportEvent::Opened`] or
    /// [`TransportEvent::Error`] on `events`.
    fn connect(
        &mut self,
        address: &str,
        credential: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Send one text frame.
    fn send(&mut self, text: String) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Request socket closure. Resolves once the close handshake has
    /// completed (a `Closed` event fires alongside).
    fn disconnect(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Drain internally queued frames, emitting events synchronously.
    ///
    /// Only meaningful when [`Transport::requires_manual_pump`] is true.
    fn pump(&mut self) {}
}

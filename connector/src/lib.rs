//! Request correlation and topic fan-out over one relay gateway socket.
//!
//! A game client (or a server-side service) holds one long-lived duplex
//! socket to the gateway. This crate lets any number of independent call
//! sites share it:
//!
//! - [`Connection::send`] / [`Connection::request`] issue a request and
//!   await its correlated response,
//! - [`Connection::subscribe`] routes server-pushed events on a named topic
//!   to typed callbacks,
//! - lifecycle events ([`ConnectionEvent`]) tell the owner when the socket
//!   is actually open, failing, or gone.
//!
//! # Guarantees
//!
//! - A request id resolves at most once; replays are reported to the
//!   diagnostic sink and dropped.
//! - Registrations are never lost: the pending entry exists before the
//!   frame is on the wire, and concurrent senders cannot corrupt the table.
//! - Responses may resolve out of send order; no cross-request ordering is
//!   promised.
//! - Dropping a [`ResponseHandle`] cancels its request cleanly.
//! - One misbehaving subscriber cannot block its siblings or kill the
//!   receive loop.
//!
//! # Example
//!
//! ```ignore
//! use connector::{Connection, StaticCredential};
//! use transport::WebSocketTransport;
//!
//! let connection = Connection::new(WebSocketTransport::new(), StaticCredential::new(token));
//! let mut events = connection.events().unwrap();
//!
//! connection.connect("wss://gateway.example.com/socket").await?;
//! // The connect future acknowledges the request; Opened means usable.
//! assert_eq!(events.recv().await, Some(ConnectionEvent::Opened));
//!
//! let _sub = connection.subscribe("content.manifest", |m: &Manifest| { /* … */ });
//!
//! let stats: Stats = connection
//!     .request(&serde_json::json!({"path": "stats/get"}))
//!     .await?
//!     .recv()
//!     .await?;
//! ```

mod connection;
mod diagnostics;
mod dispatcher;
mod error;
mod event;
mod pending;
mod session;

pub use connection::{
    Connection, ConnectionBuilder, ConnectionOptions, LifecycleState, ResponseHandle,
};
pub use diagnostics::{Diagnostic, DiagnosticSink, tracing_sink};
pub use dispatcher::SubscriptionHandle;
pub use error::{ConnectError, RequestError, SendError};
pub use event::{ConnectionEvent, ConnectionEvents};
pub use session::{CredentialSource, StaticCredential};

//! Wire envelope types and codec for the relay gateway protocol.
//!
//! Every frame that crosses the gateway socket is a JSON envelope:
//!
//! ```text
//! { "context": "<id-or-topic>", "payload": <opaque JSON> }
//! ```
//!
//! The `context` field is the routing key. An integer context correlates the
//! frame with an in-flight request; any other string names a topic for
//! server-pushed events. The `payload` is opaque at this layer and is handed
//! verbatim to whichever parser the caller registered.
//!
//! # Scope
//!
//! This crate intentionally handles only wire concerns:
//! - Decoding incoming text frames into [`Envelope`]s
//! - Encoding outgoing request frames
//!
//! Request correlation, topic fan-out, and business payloads belong in
//! upstream crates (e.g. `connector`).

mod codec;
mod envelope;
mod error;

pub use codec::{decode, encode_request};
pub use envelope::{Envelope, RequestId, RoutingKey};
pub use error::{DecodeError, EncodeError};

//! The envelope type shared by both directions of the gateway socket.

use serde_json::value::RawValue;

/// Correlation id for an in-flight request.
///
/// Ids are allocated from a monotonic 63-bit counter by the sender, so a
/// decoded id never collides with a live request from a previous epoch.
pub type RequestId = i64;

/// How an incoming frame is routed.
///
/// An integer context always targets the request correlator, even when no
/// request is pending any more (a replay is reported and dropped, never
/// reinterpreted as a topic). Everything else names a topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoutingKey {
    /// Response to the request with this id.
    Request(RequestId),
    /// Server-pushed event on a named topic.
    Topic(String),
}

/// A decoded frame: routing key plus opaque payload.
///
/// Envelopes are ephemeral; one is produced per incoming frame and consumed
/// by the dispatch path. The payload keeps its raw JSON text so the caller's
/// parser sees exactly what the server sent.
#[derive(Debug)]
pub struct Envelope {
    pub context: RoutingKey,
    pub payload: Box<RawValue>,
}

impl Envelope {
    /// The raw JSON text of the payload.
    pub fn payload_str(&self) -> &str {
        self.payload.get()
    }
}

//! Error types for the wire layer.

/// Errors that can occur while decoding an incoming frame.
///
/// A decode failure never propagates a panic into the dispatch path; the
/// frame is dropped and the error is reported through the diagnostic sink
/// by the caller.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The frame was not valid JSON at all.
    #[error("frame is not valid JSON: {0}")]
    Frame(#[source] serde_json::Error),

    /// The frame was valid JSON but not a well-formed envelope.
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),
}

/// Errors that can occur while encoding an outgoing frame.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// The request payload failed to serialize.
    #[error("payload serialization failed: {0}")]
    Payload(#[source] serde_json::Error),
}

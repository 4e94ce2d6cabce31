//! Error types for the connector layer.
//!
//! The split mirrors the propagation policy: request-scoped failures resolve
//! that request's future ([`RequestError`]), call-path failures return from
//! the call ([`SendError`], [`ConnectError`]), and wire-path failures arrive
//! as lifecycle events.

use transport::TransportError;

/// Failures issuing a connect.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// The connection is already connecting, open, or closing.
    #[error("connection is already active")]
    AlreadyActive,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failures getting a request onto the wire. The pending entry is removed
/// before this is returned, so a failed send leaves no trace.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("failed to encode request frame: {0}")]
    Encode(#[from] wire::EncodeError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failures of an in-flight request after it was sent.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The response arrived but the caller's parser rejected the payload.
    #[error("response payload failed to parse: {0}")]
    Parse(#[source] eyre::Report),

    /// The connection went away with the request still pending.
    #[error("connection dropped before a response arrived")]
    ConnectionDropped,
}

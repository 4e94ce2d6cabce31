//! The diagnostic sink: one injectable callback for every contained error.
//!
//! Decode failures, parse failures, replays, and subscriber faults are all
//! recoverable by design; they are reported here instead of tearing down the
//! receive loop. The sink must never panic.

use std::sync::Arc;

use wire::{DecodeError, RequestId};

/// Longest frame excerpt attached to a diagnostic.
const FRAME_PREVIEW_LIMIT: usize = 256;

/// A contained error on the receive path.
#[derive(Debug)]
pub enum Diagnostic {
    /// An incoming frame was not a well-formed envelope; it was dropped.
    Decode { error: DecodeError, frame: String },
    /// A response arrived but the caller's parser rejected the payload. The
    /// caller's future failed with the same error.
    Parse { id: RequestId, error: String },
    /// A response arrived for an id with no pending entry: already resolved,
    /// cancelled, or never sent. Dropped.
    UnmatchedResponse { id: RequestId },
    /// An event payload did not decode as the type some subscribers expect.
    /// Subscribers of other types were still served.
    SubscriberDecode { topic: String, error: String },
    /// A subscriber callback panicked. Its siblings were still invoked.
    SubscriberPanic { topic: String, message: String },
}

/// Injectable diagnostic callback.
pub type DiagnosticSink = Arc<dyn Fn(Diagnostic) + Send + Sync>;

/// The default sink: structured warnings through `tracing`.
pub fn tracing_sink() -> DiagnosticSink {
    Arc::new(|diagnostic| match diagnostic {
        Diagnostic::Decode { error, frame } => {
            tracing::warn!(error = %error, frame = %frame, "dropping undecodable frame");
        }
        Diagnostic::Parse { id, error } => {
            tracing::warn!(id, error = %error, "response payload failed to parse");
        }
        Diagnostic::UnmatchedResponse { id } => {
            tracing::warn!(id, "response for unknown request id");
        }
        Diagnostic::SubscriberDecode { topic, error } => {
            tracing::warn!(topic = %topic, error = %error, "event payload failed to decode");
        }
        Diagnostic::SubscriberPanic { topic, message } => {
            tracing::warn!(topic = %topic, message = %message, "subscriber panicked during dispatch");
        }
    })
}

/// A bounded excerpt of a raw frame, safe to attach to logs.
pub(crate) fn frame_preview(raw: &str) -> String {
    if raw.len() <= FRAME_PREVIEW_LIMIT {
        return raw.to_string();
    }
    let mut end = FRAME_PREVIEW_LIMIT;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &raw[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_frames_kept_verbatim() {
        assert_eq!(frame_preview("{}"), "{}");
    }

    #[test]
    fn long_frames_truncated_on_a_char_boundary() {
        let frame = "ä".repeat(300);
        let preview = frame_preview(&frame);
        assert!(preview.len() <= FRAME_PREVIEW_LIMIT + '…'.len_utf8());
        assert!(preview.ends_with('…'));
    }
}

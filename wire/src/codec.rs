//! Envelope decode/encode.
//!
//! Incoming frames arrive as complete text frames (the socket layer already
//! handles framing), so decoding is a single JSON pass. Malformed input is
//! reported as a typed [`DecodeError`]; nothing in this module panics on
//! attacker-controlled bytes.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::envelope::{Envelope, RequestId, RoutingKey};
use crate::error::{DecodeError, EncodeError};

#[derive(Deserialize)]
struct WireEnvelope {
    context: Context,
    #[serde(default)]
    payload: Option<Box<RawValue>>,
}

/// The gateway emits the context either as a bare number or as a string.
#[derive(Deserialize)]
#[serde(untagged)]
enum Context {
    Id(i64),
    Name(String),
}

#[derive(Serialize)]
struct OutgoingEnvelope<'a, T: ?Sized> {
    context: String,
    payload: &'a T,
}

/// Decode one incoming text frame into an [`Envelope`].
///
/// Routing policy: a context that is an integer (bare or inside a string) is
/// a request id; any other string is a topic name. The policy is fixed here
/// so the connector never has to guess.
pub fn decode(raw: &str) -> Result<Envelope, DecodeError> {
    let wire: WireEnvelope = serde_json::from_str(raw).map_err(|e| {
        use serde_json::error::Category;
        match e.classify() {
            Category::Data => DecodeError::Envelope(e),
            _ => DecodeError::Frame(e),
        }
    })?;

    let context = match wire.context {
        Context::Id(id) => RoutingKey::Request(id),
        Context::Name(name) => match name.parse::<RequestId>() {
            Ok(id) => RoutingKey::Request(id),
            Err(_) => RoutingKey::Topic(name),
        },
    };

    // A frame with no payload still routes; subscribers see JSON null.
    let payload = match wire.payload {
        Some(payload) => payload,
        None => RawValue::from_string("null".to_owned()).map_err(DecodeError::Envelope)?,
    };

    Ok(Envelope { context, payload })
}

/// Encode an outgoing request frame for the given correlation id.
pub fn encode_request<T: Serialize + ?Sized>(
    id: RequestId,
    payload: &T,
) -> Result<String, EncodeError> {
    let frame = OutgoingEnvelope {
        context: id.to_string(),
        payload,
    };
    serde_json::to_string(&frame).map_err(EncodeError::Payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_request_context_as_string() {
        let env = decode(r#"{"context":"42","payload":{"ok":true}}"#).unwrap();
        assert_eq!(env.context, RoutingKey::Request(42));
        assert_eq!(env.payload_str(), r#"{"ok":true}"#);
    }

    #[test]
    fn decode_request_context_as_number() {
        let env = decode(r#"{"context":42,"payload":1}"#).unwrap();
        assert_eq!(env.context, RoutingKey::Request(42));
    }

    #[test]
    fn decode_topic_context() {
        let env = decode(r#"{"context":"content.manifest","payload":[]}"#).unwrap();
        assert_eq!(
            env.context,
            RoutingKey::Topic("content.manifest".to_string())
        );
    }

    #[test]
    fn numeric_string_is_a_request_id_not_a_topic() {
        // Routing policy: integers always belong to the correlator namespace.
        let env = decode(r#"{"context":"7","payload":null}"#).unwrap();
        assert_eq!(env.context, RoutingKey::Request(7));
    }

    #[test]
    fn negative_id_still_correlates() {
        let env = decode(r#"{"context":"-3","payload":null}"#).unwrap();
        assert_eq!(env.context, RoutingKey::Request(-3));
    }

    #[test]
    fn missing_payload_decodes_as_null() {
        let env = decode(r#"{"context":"tick"}"#).unwrap();
        assert_eq!(env.payload_str(), "null");
    }

    #[test]
    fn payload_preserved_verbatim() {
        let raw = r#"{"context":"t","payload":{"a":[1,2,{"b":"c"}]}}"#;
        let env = decode(raw).unwrap();
        assert_eq!(env.payload_str(), r#"{"a":[1,2,{"b":"c"}]}"#);
    }

    #[test]
    fn garbage_is_a_frame_error() {
        let err = decode("not json").unwrap_err();
        assert!(matches!(err, DecodeError::Frame(_)));
    }

    #[test]
    fn wrong_shape_is_an_envelope_error() {
        let err = decode(r#"[1,2,3]"#).unwrap_err();
        assert!(matches!(err, DecodeError::Envelope(_)));

        let err = decode(r#"{"payload":1}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Envelope(_)));
    }

    #[test]
    fn float_context_is_rejected() {
        let err = decode(r#"{"context":1.5,"payload":null}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Envelope(_)));
    }

    #[test]
    fn encode_request_shape() {
        let text = encode_request(9, &serde_json::json!({"path": "stats/get"})).unwrap();
        let env = decode(&text).unwrap();
        assert_eq!(env.context, RoutingKey::Request(9));
        assert_eq!(env.payload_str(), r#"{"path":"stats/get"}"#);
    }
}

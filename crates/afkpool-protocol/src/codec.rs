//! Codec trait and implementations for the gateway wire format.
//!
//! The transport layer does not care how envelopes become bytes; it is
//! handed something that implements [`Codec`]. Today that is always
//! [`JsonCodec`], since the gateway speaks JSON text frames.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes values to bytes and decodes bytes back.
///
/// `Send + Sync + 'static` because a codec lives inside connection tasks
/// for the whole life of a session.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or do not
    /// match `T`.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// ```rust
/// use afkpool_protocol::{Codec, GatewayRequest, JsonCodec};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&GatewayRequest::Disconnect).unwrap();
/// assert_eq!(bytes, br#"{"op":"disconnect"}"#);
///
/// let decoded: GatewayRequest = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded, GatewayRequest::Disconnect);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{ClientEvent, GatewayRequest, TextPacket};

    #[test]
    fn test_decode_spawn_event() {
        let ev: ClientEvent = JsonCodec
            .decode(br#"{"event":"spawned","username":"playerOne"}"#)
            .unwrap();
        assert_eq!(
            ev,
            ClientEvent::Spawned {
                username: "playerOne".into()
            }
        );
    }

    #[test]
    fn test_decode_unknown_event_is_error() {
        let result: Result<ClientEvent, _> = JsonCodec.decode(br#"{"event":"teleported"}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_garbage_is_error() {
        let result: Result<ClientEvent, _> = JsonCodec.decode(b"\xff\x00not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_encode_text_request_flattens_packet() {
        let bytes = JsonCodec
            .encode(&GatewayRequest::Text(TextPacket::chat(".p", "hello")))
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["op"], "text");
        assert_eq!(value["type"], "chat");
        assert_eq!(value["message"], "hello");
    }
}

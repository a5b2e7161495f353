//! Codec trait and implementations for serializing/deserializing messages.
//!
//! The transport moves opaque bytes; the runtime picks a [`Codec`] to turn
//! [`HostEnvelope`](crate::HostEnvelope)s and
//! [`PlayerMessage`](crate::PlayerMessage)s into those bytes and back.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` so one codec value can live inside the
/// long-running host and player actors.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// JSON keeps the wire readable by browser clients and in logs. Behind the
/// `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use lupus_protocol::{Codec, JsonCodec, PlayerMessage, Uid};
///
/// let codec = JsonCodec;
/// let msg = PlayerMessage::RequestState { uid: Uid::new("p1") };
///
/// let bytes = codec.encode(&msg).unwrap();
/// let decoded: PlayerMessage = codec.decode(&bytes).unwrap();
/// assert_eq!(msg, decoded);
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
    use crate::{HostBroadcast, PlayerMessage, Seat};

    #[test]
    fn test_decode_garbage_returns_decode_error() {
        let result: Result<PlayerMessage, _> = JsonCodec.decode(b"not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_unknown_type_tag_fails() {
        let result: Result<HostBroadcast, _> = JsonCodec.decode(br#"{"type":"TELEPORT"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_encode_produces_wire_json() {
        let msg = PlayerMessage::WolfVote {
            seat: Seat(2),
            target: Seat(5),
        };
        let bytes = JsonCodec.encode(&msg).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["type"], "WOLF_VOTE");
        assert_eq!(json["target"], 5);

        let back: PlayerMessage = JsonCodec.decode(&bytes).unwrap();
        assert_eq!(back, msg);
    }
}

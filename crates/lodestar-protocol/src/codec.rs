//! Codec trait and implementations for serializing/deserializing frames.
//!
//! The hub never calls `serde_json` directly: sockets and the hot-tier
//! cache both go through a [`Codec`], so swapping the encoding touches a
//! single type.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task and by the broadcast dispatcher.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or
    /// don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// JSON is what browser clients speak natively, so this is the default
/// codec for both the socket and the cache.
///
/// ```rust
/// use lodestar_protocol::{Codec, JsonCodec, MessageKind, PlayerState, Pose};
///
/// let codec = JsonCodec;
/// let state = PlayerState::at(MessageKind::Move, "p1".into(), Pose::new(1.0, 2.0, 0.5));
///
/// let bytes = codec.encode(&state).unwrap();
/// let decoded: PlayerState = codec.decode(&bytes).unwrap();
/// assert_eq!(state, decoded);
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
    use crate::PlayerState;

    #[test]
    fn test_decode_garbage_returns_error() {
        let result: Result<PlayerState, _> = JsonCodec.decode(b"not json at all");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_non_object_returns_error() {
        let result: Result<PlayerState, _> = JsonCodec.decode(b"[1, 2, 3]");
        assert!(result.is_err());
    }

    #[test]
    fn test_encode_produces_utf8_json() {
        let bytes = JsonCodec
            .encode(&PlayerState::leave("p9".into()))
            .unwrap();
        let text = std::str::from_utf8(&bytes).expect("json is utf-8");
        assert!(text.contains(r#""type":"leave""#));
        assert!(text.contains(r#""id":"p9""#));
    }
}

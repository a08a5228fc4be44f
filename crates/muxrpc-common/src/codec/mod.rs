//! Pluggable wire codecs.
//!
//! A codec turns headers and bodies into frame payloads and back. The
//! codec for a connection is selected once, during the handshake, by its
//! string tag; see [`WireCodec::from_tag`].

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::protocol::error::{Result, RpcError};

/// Wire format for message payloads.
///
/// Two formats are supported: JSON (self-describing, easy to debug on
/// the wire) and bincode (compact binary). Selection happens per
/// connection, never per message.
///
/// # Example
///
/// ```
/// use muxrpc_common::WireCodec;
///
/// let codec = WireCodec::from_tag("application/json").unwrap();
/// let bytes = codec.encode(&42u32).unwrap();
/// let n: u32 = codec.decode(&bytes).unwrap();
/// assert_eq!(n, 42);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireCodec {
    #[default]
    Json,
    Bincode,
}

impl WireCodec {
    /// Resolves a handshake codec tag into a codec.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedCodec` for any unknown tag.
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "application/json" => Ok(WireCodec::Json),
            "application/bincode" => Ok(WireCodec::Bincode),
            other => Err(RpcError::UnsupportedCodec(other.to_string())),
        }
    }

    /// The handshake tag identifying this codec.
    pub fn tag(&self) -> &'static str {
        match self {
            WireCodec::Json => "application/json",
            WireCodec::Bincode => "application/bincode",
        }
    }

    /// Encodes a value into a frame payload.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            WireCodec::Json => {
                serde_json::to_vec(value).map_err(|e| RpcError::Encode(e.to_string()))
            }
            WireCodec::Bincode => {
                bincode::serialize(value).map_err(|e| RpcError::Encode(e.to_string()))
            }
        }
    }

    /// Decodes a frame payload into a value.
    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        match self {
            WireCodec::Json => {
                serde_json::from_slice(data).map_err(|e| RpcError::Decode(e.to_string()))
            }
            WireCodec::Bincode => {
                bincode::deserialize(data).map_err(|e| RpcError::Decode(e.to_string()))
            }
        }
    }

    /// The fixed body sent alongside an error response header.
    ///
    /// Encoding `()` never fails for either supported format.
    pub fn invalid_body(&self) -> Vec<u8> {
        self.encode(&()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Header;

    #[test]
    fn tag_round_trip() {
        for codec in [WireCodec::Json, WireCodec::Bincode] {
            assert_eq!(WireCodec::from_tag(codec.tag()).unwrap(), codec);
        }
    }

    #[test]
    fn unknown_tag_is_unsupported() {
        let err = WireCodec::from_tag("application/gob").unwrap_err();
        assert!(matches!(err, RpcError::UnsupportedCodec(_)));
    }

    #[test]
    fn header_round_trip_both_codecs() {
        let header = Header {
            service_method: "Foo.Sum".to_string(),
            seq: 7,
            error: String::new(),
        };
        for codec in [WireCodec::Json, WireCodec::Bincode] {
            let bytes = codec.encode(&header).unwrap();
            let decoded: Header = codec.decode(&bytes).unwrap();
            assert_eq!(decoded, header);
        }
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = WireCodec::Json.decode::<Header>(b"{not json").unwrap_err();
        assert!(matches!(err, RpcError::Decode(_)));
    }

    #[test]
    fn invalid_body_decodes_as_unit() {
        for codec in [WireCodec::Json, WireCodec::Bincode] {
            let body = codec.invalid_body();
            codec.decode::<()>(&body).unwrap();
        }
    }
}

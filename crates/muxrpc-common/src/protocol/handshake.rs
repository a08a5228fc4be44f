use serde::{Deserialize, Serialize};

use crate::codec::WireCodec;
use crate::protocol::error::{Result, RpcError};

/// Marks a connection as speaking the muxrpc protocol.
pub const MAGIC_NUMBER: u32 = 0x3bef5c;

/// Connection-level negotiation record.
///
/// Sent exactly once by the dialing side, before any header/body pair.
/// It is always encoded as a single JSON frame regardless of the chosen
/// codec, because the codec type is itself part of the payload.
///
/// The receiver verifies the magic number and resolves `codec_type` into
/// a [`WireCodec`] for all subsequent traffic on the connection; a
/// mismatch or unknown tag is fatal and the connection is dropped
/// without a response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectOptions {
    pub magic_number: u32,
    pub codec_type: String,
}

impl ConnectOptions {
    /// Options carrying the given codec and the fixed magic number.
    pub fn with_codec(codec: WireCodec) -> Self {
        ConnectOptions {
            magic_number: MAGIC_NUMBER,
            codec_type: codec.tag().to_string(),
        }
    }

    /// Validates the record and resolves the codec for this connection.
    ///
    /// # Errors
    ///
    /// `InvalidMagic` if the magic number does not match exactly,
    /// `UnsupportedCodec` if the codec tag is unknown.
    pub fn negotiate(&self) -> Result<WireCodec> {
        if self.magic_number != MAGIC_NUMBER {
            return Err(RpcError::InvalidMagic(self.magic_number));
        }
        WireCodec::from_tag(&self.codec_type)
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ConnectOptions::with_codec(WireCodec::default())
    }
}

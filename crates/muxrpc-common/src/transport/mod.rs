//! Length-prefixed framing and message IO.
//!
//! Everything on the wire is a frame: `[4-byte length as u32 big-endian]
//! + [payload]`. The handshake is a single JSON frame; after that, each
//! message is a header frame followed by a body frame, both encoded with
//! the connection's negotiated [`WireCodec`](crate::WireCodec).
//!
//! Because bodies are length-delimited, a reader can always skip a body
//! it has no use for ([`MessageReader::skip_body`]) without knowing its
//! type, which is what keeps the stream aligned when a response arrives
//! for a call that is no longer pending.

pub mod frame;
pub mod message;

#[cfg(test)]
mod tests;

pub use frame::{read_frame, write_frame, MAX_FRAME_SIZE};
pub use message::{read_options, write_options, MessageReader, MessageWriter};

//! muxrpc Common Types and Wire Protocol
//!
//! This crate provides the protocol definitions, wire codecs and framing
//! shared by the muxrpc client and server.
//!
//! # Overview
//!
//! muxrpc is a call-multiplexing RPC engine: a client submits concurrent
//! calls over one connection, each tagged with a sequence number, and a
//! background receive loop matches responses back to their callers. This
//! crate contains everything both sides agree on:
//!
//! - **Protocol layer**: [`Header`], the [`ConnectOptions`] handshake
//!   record, and the [`RpcError`] taxonomy
//! - **Codec layer**: pluggable [`WireCodec`] implementations (JSON,
//!   bincode), selected once per connection during the handshake
//! - **Transport layer**: length-prefixed framing plus the
//!   [`MessageReader`]/[`MessageWriter`] pair used for header+body traffic
//!
//! # Wire format
//!
//! Every unit on the wire is a frame: `[4-byte length as u32 big-endian] +
//! [payload]`. The handshake is one JSON frame; after it, each message is a
//! header frame followed by a body frame, both encoded with the negotiated
//! codec.

pub mod codec;
pub mod protocol;
pub mod transport;

pub use codec::WireCodec;
pub use protocol::{ConnectOptions, Header, RpcError, Result, MAGIC_NUMBER};
pub use transport::{MessageReader, MessageWriter};

//! muxrpc Server
//!
//! This crate provides the dispatch side of the engine: a [`Server`]
//! accepts connections, runs one request pipeline per connection, and
//! invokes methods registered through [`ServiceBuilder`].
//!
//! Decoding and dispatch are concurrent per connection (a slow handler
//! never blocks the next request), but every response is written under a
//! per-connection send lock so header and body frames of different calls
//! are never interleaved on the wire.

pub mod server;
pub mod service;

pub use server::{Server, ServerConfig};
pub use service::{MethodHandle, Service, ServiceBuilder};

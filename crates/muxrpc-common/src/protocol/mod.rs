//! Protocol types shared by client and server.
//!
//! A connection carries exactly one [`ConnectOptions`] record (the
//! handshake), then any number of [`Header`]+body message pairs encoded
//! with the negotiated codec.

pub mod error;
pub mod handshake;
pub mod header;


pub use error::{Result, RpcError};
pub use handshake::{ConnectOptions, MAGIC_NUMBER};
pub use header::Header;

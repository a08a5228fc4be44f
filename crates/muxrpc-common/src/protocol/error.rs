use std::time::Duration;

use thiserror::Error;

/// Errors produced by the muxrpc engine.
///
/// The variants fall into a few classes with different blast radii:
///
/// - **Protocol** (`InvalidMagic`, `UnsupportedCodec`): fatal to the
///   connection before any request is exchanged
/// - **Transport** (`Io`, `Connection`, `Decode`, `MessageTooLarge`):
///   fatal to the connection they occur on; on the client this is the
///   trigger that force-completes the pending table
/// - **Application** (`MalformedMethod`, `ServiceNotFound`,
///   `MethodNotFound`, `Server`, `Handler`, `Timeout`): carried in the
///   response header, delivered to exactly one caller, never fatal to
///   the connection
/// - **Shutdown** (`Shutdown`): returned synchronously to submissions on
///   a closing or closed client, no round trip involved
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Message too large: {0} bytes (max {1} bytes)")]
    MessageTooLarge(usize, usize),

    #[error("Invalid magic number {0:#x}")]
    InvalidMagic(u32),

    #[error("Unsupported codec type: {0}")]
    UnsupportedCodec(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Service/method request ill-formed: {0}")]
    MalformedMethod(String),

    #[error("Can't find service: {0}")]
    ServiceNotFound(String),

    #[error("Can't find method: {0}")]
    MethodNotFound(String),

    #[error("Service already defined: {0}")]
    ServiceAlreadyDefined(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Client is shut down")]
    Shutdown,
}

impl RpcError {
    /// Whether this error belongs to the shutdown/transport class, i.e.
    /// the connection it occurred on is no longer usable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RpcError::Io(_)
                | RpcError::Connection(_)
                | RpcError::MessageTooLarge(..)
                | RpcError::InvalidMagic(_)
                | RpcError::UnsupportedCodec(_)
                | RpcError::Shutdown
        )
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;

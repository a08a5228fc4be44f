use serde::{Deserialize, Serialize};

/// Per-message envelope preceding every request and response body.
///
/// A sequence number is assigned by the client when the call is
/// registered and echoed back by the server, which is what lets the
/// receive loop match an out-of-order response to its caller. A number
/// is only reused after its call has been fully resolved and removed
/// from the pending table.
///
/// `error` is the empty string on success; a server puts the failure
/// text here and sends the unit placeholder as the body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Header {
    /// Qualified method name, `"Service.Method"`, split on the last `.`
    pub service_method: String,
    /// Request identifier, unique per client connection while pending
    pub seq: u64,
    /// Error text; empty on success
    pub error: String,
}

impl Header {
    /// Creates a request header for the given method and sequence number.
    pub fn request(service_method: impl Into<String>, seq: u64) -> Self {
        Header {
            service_method: service_method.into(),
            seq,
            error: String::new(),
        }
    }
}

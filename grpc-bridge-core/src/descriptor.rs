//! Call descriptors.

use std::fmt;

use bytes::Bytes;

use crate::Metadata;

/// The shape of an RPC exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallType {
    /// One request message, one response message.
    Unary,
    /// One request message, a stream of response messages.
    ServerStreaming,
    /// A stream of request messages, one response message.
    ClientStreaming,
    /// Streams in both directions. Not supported by the engine; starting a
    /// duplex call fails fast.
    Duplex,
}

impl CallType {
    /// Get the string representation of this call type.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallType::Unary => "unary",
            CallType::ServerStreaming => "server_streaming",
            CallType::ClientStreaming => "client_streaming",
            CallType::Duplex => "duplex",
        }
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a transport needs to begin one call.
///
/// The request payload is an opaque byte sequence; message encoding is the
/// caller's concern. The method path is normalized to carry a leading slash
/// (`/pkg.Service/Method`).
#[derive(Debug, Clone)]
pub struct CallDescriptor {
    /// Full method path, e.g. `/pkg.Service/Method`.
    pub method: String,
    /// The shape of the exchange.
    pub call_type: CallType,
    /// Request payload. Empty for client-streaming calls, where messages are
    /// sent after the call has started.
    pub request: Bytes,
    /// Request metadata forwarded to the server.
    pub metadata: Metadata,
}

impl CallDescriptor {
    /// Descriptor for a unary call.
    pub fn unary(method: impl Into<String>, request: Bytes, metadata: Metadata) -> Self {
        Self::new(method, CallType::Unary, request, metadata)
    }

    /// Descriptor for a server-streaming call.
    pub fn server_streaming(method: impl Into<String>, request: Bytes, metadata: Metadata) -> Self {
        Self::new(method, CallType::ServerStreaming, request, metadata)
    }

    /// Descriptor for a client-streaming call. Request messages follow via
    /// the call transport, so the payload starts empty.
    pub fn client_streaming(method: impl Into<String>, metadata: Metadata) -> Self {
        Self::new(method, CallType::ClientStreaming, Bytes::new(), metadata)
    }

    /// Descriptor with an explicit call type.
    pub fn new(
        method: impl Into<String>,
        call_type: CallType,
        request: Bytes,
        metadata: Metadata,
    ) -> Self {
        let method = method.into();
        let method = if method.starts_with('/') {
            method
        } else {
            format!("/{method}")
        };
        Self {
            method,
            call_type,
            request,
            metadata,
        }
    }
}

//! Consumer-facing call handles.
//!
//! A handle is what the caller holds while a call is in flight: a set of
//! independently awaitable pieces (headers, response, trailers), a stream
//! subscription for server-streaming calls, and a cancel operation. Handles
//! never block the engine; awaiting one only suspends the caller.

mod client_streaming;
mod streaming;
mod unary;

pub use client_streaming::{ClientStreamingCall, CompletedClientStreamingCall};
pub use streaming::{CompletedStreamingCall, ServerStreamingCall, StreamEvent, StreamSubscription};
pub use unary::{CompletedUnaryCall, UnaryCall};

/// A started call of any supported type.
///
/// Returned by [`GrpcClient::start_call`](crate::GrpcClient::start_call) when
/// the call shape is only known at runtime; the typed constructors on
/// [`GrpcClient`](crate::GrpcClient) return the concrete handle directly.
#[derive(Debug)]
pub enum CallHandle {
    Unary(UnaryCall),
    ServerStreaming(ServerStreamingCall),
    ClientStreaming(ClientStreamingCall),
}

impl CallHandle {
    /// The call id shared by every variant.
    pub fn call_id(&self) -> grpc_bridge_core::CallId {
        match self {
            CallHandle::Unary(call) => call.call_id(),
            CallHandle::ServerStreaming(call) => call.call_id(),
            CallHandle::ClientStreaming(call) => call.call_id(),
        }
    }

    /// Request cancellation, whatever the variant.
    pub fn cancel(&self) -> bool {
        match self {
            CallHandle::Unary(call) => call.cancel(),
            CallHandle::ServerStreaming(call) => call.cancel(),
            CallHandle::ClientStreaming(call) => call.cancel(),
        }
    }
}

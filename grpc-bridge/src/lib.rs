//! Call-correlation and lifecycle engine for gRPC clients that delegate the
//! wire to a native transport.
//!
//! The hard problem this crate solves is not gRPC itself (framing, TLS,
//! compression and connection pooling belong to an external [`Transport`]
//! collaborator) but keeping many concurrent calls straight on top of one
//! shared completion channel:
//!
//! - every call and connection gets a process-unique id;
//! - all completion events for all calls funnel through a single dispatch
//!   channel, whatever thread produced them;
//! - a correlator task reconstructs each call's ordered lifecycle
//!   (headers → data → trailers / error) from that shared channel;
//! - consumers hold awaitable/streamable handles that resolve exactly once;
//! - cancellation crosses the async boundary deterministically, observed
//!   only through the transport's own terminal event.
//!
//! # Example
//!
//! ```ignore
//! use grpc_bridge::{GrpcClient, StreamEvent};
//! use grpc_bridge_core::{ConnectionConfig, Metadata};
//! use futures::StreamExt;
//!
//! let client = GrpcClient::new(NativeTransport::new());
//! let conn = client.connect(ConnectionConfig::new("https://api.example.com"));
//!
//! // Unary: await the whole call, or its pieces independently.
//! let call = client.unary_call(conn, "pkg.Service/Get", request, Metadata::new())?;
//! let done = call.await?;
//!
//! // Server streaming: subscribe, then consume live events.
//! let call = client.server_streaming_call(conn, "pkg.Feed/Watch", request, Metadata::new())?;
//! let mut events = call.subscribe();
//! while let Some(StreamEvent::Data(payload)) = events.next().await {
//!     handle(payload);
//! }
//! ```
//!
//! # Cancellation
//!
//! [`UnaryCall::cancel`] (and its streaming counterparts) forward an intent
//! to the transport and return immediately. The call's futures are not
//! rejected synchronously; the transport's own terminal error event is the
//! single source of truth, and when it arrives every not-yet-resolved piece
//! rejects with [`CallError::Cancelled`]. Cancelling a call that already
//! finished is a benign no-op.

mod call;
mod client;
mod correlator;
mod deferred;
mod error;
mod registry;
mod transport;

pub use call::{
    CallHandle, ClientStreamingCall, CompletedClientStreamingCall, CompletedStreamingCall,
    CompletedUnaryCall, ServerStreamingCall, StreamEvent, StreamSubscription, UnaryCall,
};
pub use client::GrpcClient;
pub use error::CallError;
pub use transport::{CallTransport, Channel, EventSink, Transport};

// The shared leaf types, re-exported so most consumers need only this crate.
pub use grpc_bridge_core::{
    CallDescriptor, CallEvent, CallId, CallType, Code, CompressionPolicy, ConnectionConfig,
    ConnectionId, InvalidHostError, KeepalivePolicy, Metadata, TaggedEvent, Target,
};

//! The client facade.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use grpc_bridge_core::{
    CallDescriptor, CallId, CallType, ConnectionConfig, ConnectionId, Metadata, TaggedEvent,
};

use crate::CallError;
use crate::call::{CallHandle, ClientStreamingCall, ServerStreamingCall, StreamEvent, UnaryCall};
use crate::correlator::{Correlator, PendingCall, ResponseSlot};
use crate::deferred::Deferred;
use crate::registry::{CallRegistry, ConnectionRegistry};
use crate::transport::{EventSink, Transport};

/// Buffered events per streaming call. A subscriber that falls further
/// behind than this loses the overwritten events (at-most-once delivery).
const STREAM_EVENT_BUFFER: usize = 128;

/// gRPC client over a pluggable transport.
///
/// `GrpcClient` owns the connection and call registries, the event dispatch
/// channel and the correlator task that consumes it. It is cheap to clone;
/// clones share all state.
///
/// Must be created inside a tokio runtime: construction spawns the
/// correlator task. The task stops once the client and every outstanding
/// event sink have been dropped.
///
/// # Example
///
/// ```ignore
/// use grpc_bridge::GrpcClient;
/// use grpc_bridge_core::{ConnectionConfig, Metadata};
///
/// let client = GrpcClient::new(NativeTransport::new());
/// let conn = client.connect(ConnectionConfig::new("api.example.com"));
///
/// let call = client.unary_call(conn, "pkg.Service/Get", request_bytes, Metadata::new())?;
/// let done = call.await?;
/// ```
#[derive(Clone)]
pub struct GrpcClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    connections: ConnectionRegistry,
    calls: Arc<CallRegistry>,
    correlator: Arc<Correlator>,
    events: mpsc::UnboundedSender<TaggedEvent>,
}

impl GrpcClient {
    /// Create a client over the given transport and spawn its correlator.
    pub fn new(transport: impl Transport) -> Self {
        Self::from_arc(Arc::new(transport))
    }

    /// Like [`GrpcClient::new`], for an already-shared transport.
    pub fn from_arc(transport: Arc<dyn Transport>) -> Self {
        let (events, rx) = mpsc::unbounded_channel();
        let calls = Arc::new(CallRegistry::new());
        let correlator = Arc::new(Correlator::new(Arc::clone(&calls)));
        tokio::spawn(Arc::clone(&correlator).run(rx));

        Self {
            inner: Arc::new(ClientInner {
                connections: ConnectionRegistry::new(transport),
                calls,
                correlator,
                events,
            }),
        }
    }

    /// Create a connection with a freshly allocated id.
    ///
    /// A failed channel build is swallowed here exactly as in
    /// [`upsert_connection`](Self::upsert_connection): the id is returned
    /// either way and calls against a dead connection fail with
    /// [`CallError::ConnectionFailure`].
    pub fn connect(&self, config: ConnectionConfig) -> ConnectionId {
        let id = ConnectionId::next();
        self.upsert_connection(id, config);
        id
    }

    /// Create or replace the connection for `id`.
    ///
    /// An existing channel is retired gracefully before the new one is
    /// activated; calls in flight on it drain on their own. Misconfiguration
    /// never panics here; it surfaces on the next call attempt.
    pub fn upsert_connection(&self, id: ConnectionId, config: ConnectionConfig) {
        debug!(connection_id = %id, host = config.host(), "upserting connection");
        self.inner.connections.upsert(id, &config);
    }

    /// Close and forget the connection for `id`. Idempotent.
    pub fn destroy_connection(&self, id: ConnectionId) {
        debug!(connection_id = %id, "destroying connection");
        self.inner.connections.remove(id);
    }

    /// Start a call described by `descriptor`.
    ///
    /// Fails synchronously with [`CallError::ConnectionFailure`] when the
    /// connection is absent and [`CallError::NotImplemented`] for duplex
    /// descriptors; in both cases no call id is registered and nothing
    /// reaches the event channel.
    pub fn start_call(
        &self,
        connection: ConnectionId,
        descriptor: CallDescriptor,
    ) -> Result<CallHandle, CallError> {
        match descriptor.call_type {
            CallType::Unary => self
                .start_single_response(connection, descriptor)
                .map(CallHandle::Unary),
            CallType::ServerStreaming => self
                .start_server_streaming(connection, descriptor)
                .map(CallHandle::ServerStreaming),
            CallType::ClientStreaming => self
                .start_client_streaming(connection, descriptor)
                .map(CallHandle::ClientStreaming),
            CallType::Duplex => Err(CallError::NotImplemented("duplex calls")),
        }
    }

    /// Start a unary call.
    pub fn unary_call(
        &self,
        connection: ConnectionId,
        method: impl Into<String>,
        request: Bytes,
        metadata: Metadata,
    ) -> Result<UnaryCall, CallError> {
        self.start_single_response(connection, CallDescriptor::unary(method, request, metadata))
    }

    /// Start a server-streaming call.
    pub fn server_streaming_call(
        &self,
        connection: ConnectionId,
        method: impl Into<String>,
        request: Bytes,
        metadata: Metadata,
    ) -> Result<ServerStreamingCall, CallError> {
        self.start_server_streaming(
            connection,
            CallDescriptor::server_streaming(method, request, metadata),
        )
    }

    /// Start a client-streaming call. Messages follow via
    /// [`ClientStreamingCall::send_message`].
    pub fn client_streaming_call(
        &self,
        connection: ConnectionId,
        method: impl Into<String>,
        metadata: Metadata,
    ) -> Result<ClientStreamingCall, CallError> {
        self.start_client_streaming(connection, CallDescriptor::client_streaming(method, metadata))
    }

    /// Send one message on an in-flight client-streaming call.
    pub fn send_client_message(&self, call_id: CallId, message: Bytes) -> Result<(), CallError> {
        self.inner.calls.send_message(call_id, message)
    }

    /// End the request stream of an in-flight client-streaming call.
    pub fn end_client_stream(&self, call_id: CallId) -> Result<(), CallError> {
        self.inner.calls.end_stream(call_id)
    }

    /// Request cancellation of a call.
    ///
    /// Returns `true` iff the call was found and cancellation was forwarded.
    /// `false` means the call already completed or never existed, an
    /// expected race rather than an error. The call's futures reject with
    /// [`CallError::Cancelled`] once the transport reports its terminal
    /// event, never synchronously.
    pub fn cancel_call(&self, call_id: CallId) -> bool {
        debug!(call_id = %call_id, "cancel requested");
        self.inner.calls.cancel(call_id)
    }

    fn start_single_response(
        &self,
        connection: ConnectionId,
        descriptor: CallDescriptor,
    ) -> Result<UnaryCall, CallError> {
        let call_id = CallId::next();

        let headers = Deferred::new();
        let response = Deferred::new();
        let trailers = Deferred::new();
        let pending = PendingCall {
            headers: headers.clone(),
            trailers: trailers.clone(),
            response: ResponseSlot::Single(response.clone()),
        };

        let method = descriptor.method.clone();
        let request = descriptor.request.clone();
        let metadata = descriptor.metadata.clone();
        self.issue(connection, call_id, descriptor, pending)?;

        Ok(UnaryCall::new(
            method,
            request,
            metadata,
            call_id,
            headers,
            response,
            trailers,
            Arc::clone(&self.inner.calls),
        ))
    }

    fn start_server_streaming(
        &self,
        connection: ConnectionId,
        descriptor: CallDescriptor,
    ) -> Result<ServerStreamingCall, CallError> {
        let call_id = CallId::next();

        let headers = Deferred::new();
        let trailers = Deferred::new();
        let (stream, _) = broadcast::channel::<StreamEvent>(STREAM_EVENT_BUFFER);
        let pending = PendingCall {
            headers: headers.clone(),
            trailers: trailers.clone(),
            response: ResponseSlot::Stream(stream.clone()),
        };

        let method = descriptor.method.clone();
        let request = descriptor.request.clone();
        let metadata = descriptor.metadata.clone();
        self.issue(connection, call_id, descriptor, pending)?;

        Ok(ServerStreamingCall::new(
            method,
            request,
            metadata,
            call_id,
            headers,
            trailers,
            stream,
            Arc::clone(&self.inner.calls),
        ))
    }

    fn start_client_streaming(
        &self,
        connection: ConnectionId,
        descriptor: CallDescriptor,
    ) -> Result<ClientStreamingCall, CallError> {
        let call_id = CallId::next();

        let headers = Deferred::new();
        let response = Deferred::new();
        let trailers = Deferred::new();
        let pending = PendingCall {
            headers: headers.clone(),
            trailers: trailers.clone(),
            response: ResponseSlot::Single(response.clone()),
        };

        let method = descriptor.method.clone();
        let metadata = descriptor.metadata.clone();
        self.issue(connection, call_id, descriptor, pending)?;

        Ok(ClientStreamingCall::new(
            method,
            metadata,
            call_id,
            headers,
            response,
            trailers,
            Arc::clone(&self.inner.calls),
        ))
    }

    /// The shared issuing path: resolve the connection, register state,
    /// start the transport.
    ///
    /// Bookkeeping is registered before the transport is invoked so that
    /// events arriving mid-start always find their call; on a synchronous
    /// start failure it is rolled back and nothing leaks.
    fn issue(
        &self,
        connection: ConnectionId,
        call_id: CallId,
        descriptor: CallDescriptor,
        pending: PendingCall,
    ) -> Result<(), CallError> {
        let channel = self.inner.connections.get(connection)?;

        debug!(
            call_id = %call_id,
            connection_id = %connection,
            method = %descriptor.method,
            call_type = %descriptor.call_type,
            "starting call"
        );

        self.inner.correlator.register(call_id, pending);
        self.inner.calls.register(call_id, descriptor.call_type);

        let sink = EventSink::new(call_id, self.inner.events.clone());
        match channel.start_call(call_id, descriptor, sink) {
            Ok(transport) => {
                self.inner.calls.attach_transport(call_id, Arc::from(transport));
                Ok(())
            }
            Err(err) => {
                self.inner.correlator.discard(call_id);
                self.inner.calls.remove(call_id);
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for GrpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcClient").finish_non_exhaustive()
    }
}

//! Client-streaming call handles.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;

use grpc_bridge_core::{CallId, Metadata};

use crate::CallError;
use crate::deferred::Deferred;
use crate::registry::CallRegistry;

/// Handle to an in-flight client-streaming call.
///
/// Request messages are pushed with [`send_message`](Self::send_message) and
/// the stream is closed with [`end_stream`](Self::end_stream), after which
/// the call proceeds exactly like a unary terminal path: one response
/// payload, then trailers or an error.
///
/// # Example
///
/// ```ignore
/// let call = client.client_streaming_call(conn, "pkg.Ingest/Upload", Metadata::new())?;
///
/// for chunk in chunks {
///     call.send_message(chunk)?;
/// }
/// call.end_stream()?;
///
/// let done = call.await?;
/// ```
pub struct ClientStreamingCall {
    method: String,
    request_metadata: Metadata,
    call_id: CallId,
    headers: Deferred<Metadata>,
    response: Deferred<Bytes>,
    trailers: Deferred<Metadata>,
    calls: Arc<CallRegistry>,
}

impl ClientStreamingCall {
    pub(crate) fn new(
        method: String,
        request_metadata: Metadata,
        call_id: CallId,
        headers: Deferred<Metadata>,
        response: Deferred<Bytes>,
        trailers: Deferred<Metadata>,
        calls: Arc<CallRegistry>,
    ) -> Self {
        Self {
            method,
            request_metadata,
            call_id,
            headers,
            response,
            trailers,
            calls,
        }
    }

    /// The call's id.
    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    /// The method path this call was issued against.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The request metadata that was sent.
    pub fn request_metadata(&self) -> &Metadata {
        &self.request_metadata
    }

    /// Send one request message.
    ///
    /// Fails with [`CallError::InvalidCallId`] once the call is terminal.
    pub fn send_message(&self, message: Bytes) -> Result<(), CallError> {
        self.calls.send_message(self.call_id, message)
    }

    /// Signal that no more request messages follow.
    pub fn end_stream(&self) -> Result<(), CallError> {
        self.calls.end_stream(self.call_id)
    }

    /// Await the initial server metadata.
    pub async fn headers(&self) -> Result<Metadata, CallError> {
        self.headers.wait().await
    }

    /// Await the response payload.
    pub async fn response(&self) -> Result<Bytes, CallError> {
        self.response.wait().await
    }

    /// Await the trailing server metadata.
    pub async fn trailers(&self) -> Result<Metadata, CallError> {
        self.trailers.wait().await
    }

    /// Await headers, response and trailers together.
    pub async fn await_done(&self) -> Result<CompletedClientStreamingCall, CallError> {
        let headers = self.headers.wait().await?;
        let response = self.response.wait().await?;
        let trailers = self.trailers.wait().await?;
        Ok(CompletedClientStreamingCall {
            method: self.method.clone(),
            request_metadata: self.request_metadata.clone(),
            headers,
            response,
            trailers,
        })
    }

    /// Request cancellation. Same contract as
    /// [`UnaryCall::cancel`](crate::UnaryCall::cancel).
    pub fn cancel(&self) -> bool {
        self.calls.cancel(self.call_id)
    }
}

impl IntoFuture for ClientStreamingCall {
    type Output = Result<CompletedClientStreamingCall, CallError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.await_done().await })
    }
}

impl fmt::Debug for ClientStreamingCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientStreamingCall")
            .field("call_id", &self.call_id)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// Everything a finished client-streaming call produced.
#[derive(Debug, Clone)]
pub struct CompletedClientStreamingCall {
    pub method: String,
    pub request_metadata: Metadata,
    pub headers: Metadata,
    pub response: Bytes,
    pub trailers: Metadata,
}

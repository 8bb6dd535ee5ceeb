//! Unary call handles.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;

use grpc_bridge_core::{CallId, Metadata};

use crate::CallError;
use crate::deferred::Deferred;
use crate::registry::CallRegistry;

/// Handle to an in-flight unary call.
///
/// Headers, response and trailers are independently awaitable, each any
/// number of times; a piece that has resolved keeps its value even if the
/// call later fails. Awaiting the handle itself (it implements
/// [`IntoFuture`]) awaits all three and yields a [`CompletedUnaryCall`].
///
/// # Example
///
/// ```ignore
/// let call = client.unary_call(conn, "pkg.Service/Get", request, Metadata::new())?;
///
/// let headers = call.headers().await?;
/// let response = call.response().await?;
///
/// // Or take everything at once:
/// let done = call.await?;
/// println!("{} bytes", done.response.len());
/// ```
pub struct UnaryCall {
    method: String,
    request: Bytes,
    request_metadata: Metadata,
    call_id: CallId,
    headers: Deferred<Metadata>,
    response: Deferred<Bytes>,
    trailers: Deferred<Metadata>,
    calls: Arc<CallRegistry>,
}

impl UnaryCall {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        method: String,
        request: Bytes,
        request_metadata: Metadata,
        call_id: CallId,
        headers: Deferred<Metadata>,
        response: Deferred<Bytes>,
        trailers: Deferred<Metadata>,
        calls: Arc<CallRegistry>,
    ) -> Self {
        Self {
            method,
            request,
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

    /// The request payload that was sent.
    pub fn request(&self) -> &Bytes {
        &self.request
    }

    /// The request metadata that was sent.
    pub fn request_metadata(&self) -> &Metadata {
        &self.request_metadata
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
    pub async fn await_done(&self) -> Result<CompletedUnaryCall, CallError> {
        let headers = self.headers.wait().await?;
        let response = self.response.wait().await?;
        let trailers = self.trailers.wait().await?;
        Ok(CompletedUnaryCall {
            method: self.method.clone(),
            request_metadata: self.request_metadata.clone(),
            request: self.request.clone(),
            headers,
            response,
            trailers,
        })
    }

    /// Request cancellation.
    ///
    /// Forwards an intent to the transport and returns; pieces still
    /// unresolved reject with [`CallError::Cancelled`] once the transport
    /// reports its terminal event. Returns `false` when the call already
    /// completed, which is a benign race, not a fault.
    pub fn cancel(&self) -> bool {
        self.calls.cancel(self.call_id)
    }
}

impl IntoFuture for UnaryCall {
    type Output = Result<CompletedUnaryCall, CallError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.await_done().await })
    }
}

impl fmt::Debug for UnaryCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnaryCall")
            .field("call_id", &self.call_id)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// Everything a finished unary call produced, together with what was sent.
#[derive(Debug, Clone)]
pub struct CompletedUnaryCall {
    pub method: String,
    pub request_metadata: Metadata,
    pub request: Bytes,
    pub headers: Metadata,
    pub response: Bytes,
    pub trailers: Metadata,
}

//! Server-streaming call handles.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use futures::future::BoxFuture;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

use grpc_bridge_core::{CallId, Metadata};

use crate::CallError;
use crate::deferred::Deferred;
use crate::registry::CallRegistry;

/// One notification on a server-streaming call's live channel.
///
/// `Error` and `Complete` are mutually exclusive and always last.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// One response message payload.
    Data(Bytes),
    /// The call failed; no further events follow.
    Error(CallError),
    /// The call finished cleanly; no further events follow.
    Complete,
}

/// Handle to an in-flight server-streaming call.
///
/// The response side is a live multi-subscriber channel: each subscriber
/// sees events from its subscription point onward, in emission order, and
/// events published before a subscriber existed are not replayed. Subscribe
/// before events of interest can arrive.
///
/// # Example
///
/// ```ignore
/// use futures::StreamExt;
///
/// let call = client.server_streaming_call(conn, "pkg.Feed/Watch", request, Metadata::new())?;
/// let mut events = call.subscribe();
///
/// while let Some(event) = events.next().await {
///     match event {
///         StreamEvent::Data(payload) => handle(payload),
///         StreamEvent::Complete => break,
///         StreamEvent::Error(err) => return Err(err),
///     }
/// }
/// ```
pub struct ServerStreamingCall {
    method: String,
    request: Bytes,
    request_metadata: Metadata,
    call_id: CallId,
    headers: Deferred<Metadata>,
    trailers: Deferred<Metadata>,
    stream: broadcast::Sender<StreamEvent>,
    calls: Arc<CallRegistry>,
}

impl ServerStreamingCall {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        method: String,
        request: Bytes,
        request_metadata: Metadata,
        call_id: CallId,
        headers: Deferred<Metadata>,
        trailers: Deferred<Metadata>,
        stream: broadcast::Sender<StreamEvent>,
        calls: Arc<CallRegistry>,
    ) -> Self {
        Self {
            method,
            request,
            request_metadata,
            call_id,
            headers,
            trailers,
            stream,
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

    /// Await the trailing server metadata.
    pub async fn trailers(&self) -> Result<Metadata, CallError> {
        self.trailers.wait().await
    }

    /// Subscribe to the call's event stream from this point onward.
    ///
    /// A subscription taken after the call finished yields nothing and ends
    /// immediately.
    pub fn subscribe(&self) -> StreamSubscription {
        // Subscribe before checking for a terminal state; a terminal event
        // landing in between is buffered in the receiver and still drained.
        let inner = BroadcastStream::new(self.stream.subscribe());
        StreamSubscription {
            call_id: self.call_id,
            inner,
            done: false,
            end_when_drained: self.trailers.is_complete(),
        }
    }

    /// Await headers and trailers together.
    ///
    /// Resolves once the call is terminal; data must be consumed through a
    /// [`StreamSubscription`] taken before the events of interest.
    pub async fn await_done(&self) -> Result<CompletedStreamingCall, CallError> {
        let headers = self.headers.wait().await?;
        let trailers = self.trailers.wait().await?;
        Ok(CompletedStreamingCall {
            method: self.method.clone(),
            request_metadata: self.request_metadata.clone(),
            request: self.request.clone(),
            headers,
            trailers,
        })
    }

    /// Request cancellation. Same contract as
    /// [`UnaryCall::cancel`](crate::UnaryCall::cancel).
    pub fn cancel(&self) -> bool {
        self.calls.cancel(self.call_id)
    }
}

impl IntoFuture for ServerStreamingCall {
    type Output = Result<CompletedStreamingCall, CallError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.await_done().await })
    }
}

impl fmt::Debug for ServerStreamingCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerStreamingCall")
            .field("call_id", &self.call_id)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// Everything a finished streaming call produced, minus the data, which is
/// only observable through a live subscription.
#[derive(Debug, Clone)]
pub struct CompletedStreamingCall {
    pub method: String,
    pub request_metadata: Metadata,
    pub request: Bytes,
    pub headers: Metadata,
    pub trailers: Metadata,
}

/// One subscriber's view of a streaming call's events.
///
/// Ends after yielding [`StreamEvent::Complete`] or [`StreamEvent::Error`],
/// or immediately if the subscription was taken after the call finished.
pub struct StreamSubscription {
    call_id: CallId,
    inner: BroadcastStream<StreamEvent>,
    /// Set once a terminal event has been yielded; every later poll ends
    /// the stream.
    done: bool,
    /// The call was already terminal when the subscription was taken; end
    /// as soon as any buffered events have been drained.
    end_when_drained: bool,
}

impl Stream for StreamSubscription {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => {
                    if matches!(event, StreamEvent::Complete | StreamEvent::Error(_)) {
                        self.done = true;
                    }
                    return Poll::Ready(Some(event));
                }
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(missed)))) => {
                    // Delivery is at-most-once; a slow subscriber loses the
                    // overwritten events and keeps going.
                    warn!(call_id = %self.call_id, missed, "stream subscriber lagged");
                    continue;
                }
                Poll::Ready(None) => {
                    self.done = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => {
                    if self.end_when_drained {
                        self.done = true;
                        return Poll::Ready(None);
                    }
                    return Poll::Pending;
                }
            }
        }
    }
}

impl fmt::Debug for StreamSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSubscription")
            .field("call_id", &self.call_id)
            .finish_non_exhaustive()
    }
}

//! The transport collaborator boundary.
//!
//! The engine never touches the wire. Everything network-shaped (HTTP/2
//! framing, TLS, compression, DNS) lives behind these three traits, which a
//! native transport implements and the engine drives through narrow entry
//! points. Results flow back the other way through the [`EventSink`] handed
//! to [`Channel::start_call`], never through return values.
//!
//! A transport may invoke the sink from any thread; the engine serializes
//! all published events through its single dispatch channel before acting on
//! them.

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use grpc_bridge_core::{CallDescriptor, CallEvent, CallId, Code, ConnectionConfig, Metadata, TaggedEvent};

use crate::CallError;

/// Factory for channels. One implementation per native networking stack.
pub trait Transport: Send + Sync + 'static {
    /// Build a channel for the given configuration.
    ///
    /// Expected to validate `config.target()` and fail with
    /// [`CallError::InvalidHost`] when the host does not parse. A failed
    /// build leaves the connection absent; it must not panic.
    fn open_channel(&self, config: &ConnectionConfig) -> Result<Box<dyn Channel>, CallError>;
}

/// One live transport resource bound to a [`ConnectionConfig`].
pub trait Channel: Send + Sync {
    /// Begin a call.
    ///
    /// The returned [`CallTransport`] is used only for client-streaming
    /// messages and cancellation; all completion signals for the call are
    /// published on `events`, tagged with `call_id`. Events may start
    /// arriving before this method returns.
    fn start_call(
        &self,
        call_id: CallId,
        descriptor: CallDescriptor,
        events: EventSink,
    ) -> Result<Box<dyn CallTransport>, CallError>;

    /// Retire this channel gracefully. Calls already in flight are allowed
    /// to finish or fail on their own; no new calls will be started on it.
    fn close(&self);
}

/// Per-call handle into the transport.
pub trait CallTransport: Send + Sync {
    /// Send one request message on a client-streaming call.
    fn send_message(&self, message: Bytes) -> Result<(), CallError>;

    /// Signal that no more client-stream messages follow. The transport then
    /// proceeds to its normal terminal path (trailers or error).
    fn end_stream(&self) -> Result<(), CallError>;

    /// Request cancellation. Asynchronous and cooperative: completion of the
    /// cancellation is observed through the terminal error event, never here.
    fn cancel(&self);
}

/// Publisher half of the engine's event channel, bound to one call id.
///
/// Cloneable so a transport can hand it to whichever worker thread produces
/// a given signal. Publishing after the engine has shut down is a no-op.
#[derive(Debug, Clone)]
pub struct EventSink {
    call_id: CallId,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl EventSink {
    pub(crate) fn new(call_id: CallId, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { call_id, tx }
    }

    /// The call this sink publishes for.
    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    /// Publish initial server metadata.
    pub fn headers(&self, metadata: Metadata) {
        self.publish(CallEvent::Headers(metadata));
    }

    /// Publish one response message payload.
    pub fn data(&self, payload: Bytes) {
        self.publish(CallEvent::Data(payload));
    }

    /// Publish trailing metadata; success terminal.
    pub fn trailers(&self, metadata: Metadata) {
        self.publish(CallEvent::Trailers(metadata));
    }

    /// Publish a success terminal without trailing metadata.
    pub fn completed(&self) {
        self.publish(CallEvent::Completed);
    }

    /// Publish a failure terminal.
    pub fn error(&self, message: impl Into<String>, code: Option<Code>, trailers: Metadata) {
        self.publish(CallEvent::Error {
            message: message.into(),
            code,
            trailers,
        });
    }

    /// Publish a raw event.
    pub fn publish(&self, event: CallEvent) {
        let tagged = TaggedEvent {
            call_id: self.call_id,
            event,
        };
        if self.tx.send(tagged).is_err() {
            debug!(call_id = %self.call_id, "event dropped, engine no longer running");
        }
    }
}

//! The call correlator: the engine's state machine.
//!
//! Every completion signal from every transport worker funnels into one
//! unbounded channel of [`TaggedEvent`]s with a single consumer task. That
//! task looks up the event's call id and advances that call's state:
//! resolving futures, feeding the call's broadcast stream, and retiring the
//! call on its terminal event. Because the channel has exactly one consumer,
//! two events for the same call are never processed concurrently and a
//! call's events are observed in emission order, regardless of which native
//! thread produced them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use grpc_bridge_core::{CallEvent, CallId, Metadata, TaggedEvent};

use crate::CallError;
use crate::call::StreamEvent;
use crate::deferred::Deferred;
use crate::registry::CallRegistry;

/// How the response side of a call is delivered to its consumer. Exactly one
/// of these exists per call, fixed by the call type at start.
pub(crate) enum ResponseSlot {
    /// Unary and client-streaming calls: a single awaitable payload.
    Single(Deferred<Bytes>),
    /// Server-streaming calls: a live multi-subscriber broadcast.
    Stream(broadcast::Sender<StreamEvent>),
}

/// Per-call bookkeeping held between start and terminal event.
pub(crate) struct PendingCall {
    pub(crate) headers: Deferred<Metadata>,
    pub(crate) trailers: Deferred<Metadata>,
    pub(crate) response: ResponseSlot,
}

/// Maps tagged events back to their call and advances its state machine.
pub(crate) struct Correlator {
    pending: Mutex<HashMap<CallId, PendingCall>>,
    calls: Arc<CallRegistry>,
}

impl Correlator {
    pub(crate) fn new(calls: Arc<CallRegistry>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            calls,
        }
    }

    /// Consume the dispatch channel until every sink is dropped.
    ///
    /// The loop never awaits anything but the channel itself, so one call's
    /// slow consumer can never stall another call's delivery.
    pub(crate) async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<TaggedEvent>) {
        while let Some(tagged) = events.recv().await {
            self.handle_event(tagged);
        }
        debug!("event channel closed, correlator stopping");
    }

    /// Register a call's bookkeeping. Must happen before the transport is
    /// asked to start the call, so the first event always finds its state.
    pub(crate) fn register(&self, call_id: CallId, call: PendingCall) {
        self.pending
            .lock()
            .expect("pending map poisoned")
            .insert(call_id, call);
    }

    /// Forget a call whose start failed synchronously. No events were or
    /// will be published for it.
    pub(crate) fn discard(&self, call_id: CallId) {
        self.pending
            .lock()
            .expect("pending map poisoned")
            .remove(&call_id);
    }

    /// Advance one call's state machine by one event.
    pub(crate) fn handle_event(&self, tagged: TaggedEvent) {
        let TaggedEvent { call_id, event } = tagged;
        let terminal = event.is_terminal();

        {
            let mut pending = self.pending.lock().expect("pending map poisoned");
            let Some(call) = pending.get(&call_id) else {
                // Either a transport bug or an event that lost the race with
                // its call's terminal event. Drop it, loudly.
                warn!(call_id = %call_id, kind = event.kind(), "event for unknown call id dropped");
                return;
            };

            match event {
                CallEvent::Headers(metadata) => {
                    if !call.headers.resolve(metadata) {
                        warn!(call_id = %call_id, "duplicate headers event, keeping first");
                    }
                }
                CallEvent::Data(payload) => match &call.response {
                    ResponseSlot::Single(response) => {
                        if !response.resolve(payload) {
                            warn!(call_id = %call_id, "duplicate response payload, keeping first");
                        }
                    }
                    ResponseSlot::Stream(stream) => {
                        // No receivers is fine; delivery is at-most-once per
                        // subscriber and nobody may be listening yet.
                        let _ = stream.send(StreamEvent::Data(payload));
                    }
                },
                CallEvent::Trailers(metadata) => {
                    self.finish_success(call, metadata);
                }
                CallEvent::Completed => {
                    self.finish_success(call, Metadata::new());
                }
                CallEvent::Error {
                    message,
                    code,
                    trailers,
                } => {
                    let error = if self.calls.cancel_requested(call_id) {
                        CallError::Cancelled
                    } else {
                        CallError::remote(message, code, trailers)
                    };
                    call.headers.reject(error.clone());
                    call.trailers.reject(error.clone());
                    match &call.response {
                        ResponseSlot::Single(response) => {
                            response.reject(error);
                        }
                        ResponseSlot::Stream(stream) => {
                            let _ = stream.send(StreamEvent::Error(error));
                        }
                    }
                }
            }

            if terminal {
                // Dropped atomically with delivering the terminal event: no
                // further event can find this call.
                pending.remove(&call_id);
            }
        }

        if terminal {
            // Happens-after the dispatch above, so a cancel landing in the
            // gap is a harmless no-op on an already-dispatched call.
            self.calls.remove(call_id);
            debug!(call_id = %call_id, "call reached terminal state");
        }
    }

    fn finish_success(&self, call: &PendingCall, trailers: Metadata) {
        // A transport that never sent headers on a success path is out of
        // spec; resolve them empty rather than leaving waiters hanging.
        call.headers.resolve(Metadata::new());
        call.trailers.resolve(trailers);
        match &call.response {
            ResponseSlot::Single(response) => {
                response.reject(CallError::remote(
                    "call completed without a response payload",
                    None,
                    Metadata::new(),
                ));
            }
            ResponseSlot::Stream(stream) => {
                let _ = stream.send(StreamEvent::Complete);
            }
        }
    }

    /// Whether a call is still pending (used by tests and diagnostics).
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn is_pending(&self, call_id: CallId) -> bool {
        self.pending
            .lock()
            .expect("pending map poisoned")
            .contains_key(&call_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grpc_bridge_core::{CallType, Code};

    fn unary_pending() -> (PendingCall, Deferred<Metadata>, Deferred<Bytes>, Deferred<Metadata>) {
        let headers = Deferred::new();
        let trailers = Deferred::new();
        let response = Deferred::new();
        let pending = PendingCall {
            headers: headers.clone(),
            trailers: trailers.clone(),
            response: ResponseSlot::Single(response.clone()),
        };
        (pending, headers, response, trailers)
    }

    fn tagged(call_id: CallId, event: CallEvent) -> TaggedEvent {
        TaggedEvent { call_id, event }
    }

    #[test]
    fn test_unary_success_sequence() {
        let calls = Arc::new(CallRegistry::new());
        let correlator = Correlator::new(calls.clone());
        let call_id = CallId::next();
        let (pending, headers, response, trailers) = unary_pending();

        calls.register(call_id, CallType::Unary);
        correlator.register(call_id, pending);

        let meta: Metadata = [("x", "1")].into_iter().collect();
        correlator.handle_event(tagged(call_id, CallEvent::Headers(meta.clone())));
        correlator.handle_event(tagged(call_id, CallEvent::Data(Bytes::from_static(&[1, 2]))));
        correlator.handle_event(tagged(call_id, CallEvent::Trailers(Metadata::new())));

        assert_eq!(headers.peek().unwrap().unwrap(), meta);
        assert_eq!(response.peek().unwrap().unwrap(), Bytes::from_static(&[1, 2]));
        assert_eq!(trailers.peek().unwrap().unwrap(), Metadata::new());
        assert!(!correlator.is_pending(call_id));
        assert!(!calls.contains(call_id));
    }

    #[test]
    fn test_duplicate_headers_keeps_first() {
        let calls = Arc::new(CallRegistry::new());
        let correlator = Correlator::new(calls);
        let call_id = CallId::next();
        let (pending, headers, _, _) = unary_pending();
        correlator.register(call_id, pending);

        let first: Metadata = [("a", "1")].into_iter().collect();
        let second: Metadata = [("a", "2")].into_iter().collect();
        correlator.handle_event(tagged(call_id, CallEvent::Headers(first.clone())));
        correlator.handle_event(tagged(call_id, CallEvent::Headers(second)));

        assert_eq!(headers.peek().unwrap().unwrap(), first);
    }

    #[test]
    fn test_error_rejects_unresolved_futures() {
        let calls = Arc::new(CallRegistry::new());
        let correlator = Correlator::new(calls);
        let call_id = CallId::next();
        let (pending, headers, response, trailers) = unary_pending();
        correlator.register(call_id, pending);

        let meta: Metadata = [("x", "1")].into_iter().collect();
        correlator.handle_event(tagged(call_id, CallEvent::Headers(meta.clone())));
        correlator.handle_event(tagged(
            call_id,
            CallEvent::Error {
                message: "timeout".into(),
                code: Some(Code::DeadlineExceeded),
                trailers: Metadata::new(),
            },
        ));

        // Headers already resolved keep their value; the rest reject.
        assert_eq!(headers.peek().unwrap().unwrap(), meta);
        let err = response.peek().unwrap().unwrap_err();
        assert_eq!(err.code(), Code::DeadlineExceeded);
        assert!(trailers.peek().unwrap().is_err());
        assert!(!correlator.is_pending(call_id));
    }

    #[test]
    fn test_error_after_cancel_is_cancelled() {
        let calls = Arc::new(CallRegistry::new());
        let correlator = Correlator::new(calls.clone());
        let call_id = CallId::next();
        let (pending, _, response, _) = unary_pending();

        calls.register(call_id, CallType::Unary);
        correlator.register(call_id, pending);

        assert!(calls.cancel(call_id));
        correlator.handle_event(tagged(
            call_id,
            CallEvent::Error {
                message: "aborted by client".into(),
                code: Some(Code::Cancelled),
                trailers: Metadata::new(),
            },
        ));

        assert!(response.peek().unwrap().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_event_for_unknown_call_is_dropped() {
        let calls = Arc::new(CallRegistry::new());
        let correlator = Correlator::new(calls);
        // Must not panic.
        correlator.handle_event(tagged(CallId::from_raw(404), CallEvent::Completed));
    }

    #[test]
    fn test_no_events_after_terminal() {
        let calls = Arc::new(CallRegistry::new());
        let correlator = Correlator::new(calls);
        let call_id = CallId::next();
        let (pending, _, response, _) = unary_pending();
        correlator.register(call_id, pending);

        correlator.handle_event(tagged(call_id, CallEvent::Data(Bytes::from_static(b"ok"))));
        correlator.handle_event(tagged(call_id, CallEvent::Trailers(Metadata::new())));
        // A straggler for the same id finds no state and is dropped.
        correlator.handle_event(tagged(call_id, CallEvent::Data(Bytes::from_static(b"late"))));

        assert_eq!(response.peek().unwrap().unwrap(), Bytes::from_static(b"ok"));
    }

    #[test]
    fn test_completed_without_payload_rejects_single_response() {
        let calls = Arc::new(CallRegistry::new());
        let correlator = Correlator::new(calls);
        let call_id = CallId::next();
        let (pending, headers, response, trailers) = unary_pending();
        correlator.register(call_id, pending);

        correlator.handle_event(tagged(call_id, CallEvent::Completed));

        assert!(headers.peek().unwrap().is_ok());
        assert!(trailers.peek().unwrap().is_ok());
        assert!(response.peek().unwrap().is_err());
    }

    #[test]
    fn test_streaming_events_broadcast_in_order() {
        let calls = Arc::new(CallRegistry::new());
        let correlator = Correlator::new(calls);
        let call_id = CallId::next();

        let (stream_tx, mut stream_rx) = broadcast::channel(16);
        let pending = PendingCall {
            headers: Deferred::new(),
            trailers: Deferred::new(),
            response: ResponseSlot::Stream(stream_tx),
        };
        correlator.register(call_id, pending);

        for payload in [&b"a"[..], b"b", b"c"] {
            correlator.handle_event(tagged(call_id, CallEvent::Data(Bytes::from_static(payload))));
        }
        correlator.handle_event(tagged(call_id, CallEvent::Trailers(Metadata::new())));

        for expected in [&b"a"[..], b"b", b"c"] {
            match stream_rx.try_recv().unwrap() {
                StreamEvent::Data(data) => assert_eq!(data, Bytes::from_static(expected)),
                other => panic!("expected data, got {other:?}"),
            }
        }
        assert!(matches!(stream_rx.try_recv().unwrap(), StreamEvent::Complete));
    }
}

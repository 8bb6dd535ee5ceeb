//! Connection and call registries.
//!
//! Two maps partition the engine's shared mutable state:
//!
//! - [`ConnectionRegistry`]: connection id → live channel. Mutated only by
//!   `upsert`/`remove`, which serialize against calls being started on the
//!   same connection.
//! - [`CallRegistry`]: call id → per-call transport handle. Inserted on the
//!   call-issuing path, removed on the terminal-event path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing::{debug, warn};

use grpc_bridge_core::{CallId, CallType, ConnectionConfig, ConnectionId};

use crate::CallError;
use crate::transport::{CallTransport, Channel, Transport};

/// Owns the connection id → channel map.
pub(crate) struct ConnectionRegistry {
    transport: Arc<dyn Transport>,
    channels: Mutex<HashMap<ConnectionId, Arc<dyn Channel>>>,
}

impl ConnectionRegistry {
    pub(crate) fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Replace (or create) the channel for `id`.
    ///
    /// Any existing channel is closed first, so at most one channel per id
    /// is ever live; in-flight calls on the old channel drain on their own.
    /// A failed build is swallowed: the connection is left absent and later
    /// call attempts fail with [`CallError::ConnectionFailure`].
    pub(crate) fn upsert(&self, id: ConnectionId, config: &ConnectionConfig) {
        // The lock is held across the build so no call can start on a
        // half-replaced connection.
        let mut channels = self.channels.lock().expect("connection registry poisoned");

        if let Some(old) = channels.remove(&id) {
            debug!(connection_id = %id, "closing replaced channel");
            old.close();
        }

        match self.transport.open_channel(config) {
            Ok(channel) => {
                channels.insert(id, Arc::from(channel));
            }
            Err(err) => {
                warn!(connection_id = %id, host = config.host(), %err, "channel build failed, connection left absent");
            }
        }
    }

    /// Close and forget the channel for `id`. Idempotent.
    pub(crate) fn remove(&self, id: ConnectionId) {
        let channel = self
            .channels
            .lock()
            .expect("connection registry poisoned")
            .remove(&id);
        if let Some(channel) = channel {
            channel.close();
        }
    }

    /// The live channel for `id`.
    pub(crate) fn get(&self, id: ConnectionId) -> Result<Arc<dyn Channel>, CallError> {
        self.channels
            .lock()
            .expect("connection registry poisoned")
            .get(&id)
            .cloned()
            .ok_or(CallError::ConnectionFailure(id))
    }
}

struct CallEntry {
    call_type: CallType,
    cancel_requested: bool,
    /// Attached once `Channel::start_call` returns; `None` in the window
    /// between registration and that return.
    transport: Option<Arc<dyn CallTransport>>,
}

/// Owns the call id → transport handle map.
pub(crate) struct CallRegistry {
    calls: Mutex<HashMap<CallId, CallEntry>>,
}

impl CallRegistry {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Register a call before the transport is asked to start it, so that a
    /// cancel or terminal event racing the start always finds the entry.
    pub(crate) fn register(&self, call_id: CallId, call_type: CallType) {
        self.calls
            .lock()
            .expect("call registry poisoned")
            .insert(
                call_id,
                CallEntry {
                    call_type,
                    cancel_requested: false,
                    transport: None,
                },
            );
    }

    /// Attach the transport handle once the start has returned.
    ///
    /// If the call already reached a terminal state the handle is dropped;
    /// if a cancel was requested in the window, it is forwarded now.
    pub(crate) fn attach_transport(&self, call_id: CallId, transport: Arc<dyn CallTransport>) {
        let forward_cancel = {
            let mut calls = self.calls.lock().expect("call registry poisoned");
            match calls.get_mut(&call_id) {
                Some(entry) => {
                    entry.transport = Some(Arc::clone(&transport));
                    entry.cancel_requested
                }
                None => {
                    debug!(call_id = %call_id, "call finished before its transport handle arrived");
                    return;
                }
            }
        };
        if forward_cancel {
            transport.cancel();
        }
    }

    /// Drop the entry for a call that reached a terminal state. Idempotent.
    pub(crate) fn remove(&self, call_id: CallId) {
        self.calls
            .lock()
            .expect("call registry poisoned")
            .remove(&call_id);
    }

    /// Request cancellation of a call.
    ///
    /// Returns `true` iff the call was found. A miss is benign: the call
    /// already completed or never existed, and racing a natural completion
    /// is expected. The transport-level cancel is forwarded at most once per
    /// call, no matter how many times this is invoked.
    pub(crate) fn cancel(&self, call_id: CallId) -> bool {
        let transport = {
            let mut calls = self.calls.lock().expect("call registry poisoned");
            let Some(entry) = calls.get_mut(&call_id) else {
                return false;
            };
            if entry.cancel_requested {
                return true;
            }
            entry.cancel_requested = true;
            entry.transport.clone()
        };
        // Transport not yet attached: attach_transport forwards the cancel.
        if let Some(transport) = transport {
            transport.cancel();
        }
        true
    }

    /// Whether a cancel has been requested for this call.
    pub(crate) fn cancel_requested(&self, call_id: CallId) -> bool {
        self.calls
            .lock()
            .expect("call registry poisoned")
            .get(&call_id)
            .is_some_and(|entry| entry.cancel_requested)
    }

    /// Send one message on a registered client-streaming call.
    pub(crate) fn send_message(&self, call_id: CallId, message: Bytes) -> Result<(), CallError> {
        self.client_streaming_transport(call_id)?.send_message(message)
    }

    /// End the client stream of a registered client-streaming call.
    pub(crate) fn end_stream(&self, call_id: CallId) -> Result<(), CallError> {
        self.client_streaming_transport(call_id)?.end_stream()
    }

    fn client_streaming_transport(
        &self,
        call_id: CallId,
    ) -> Result<Arc<dyn CallTransport>, CallError> {
        let calls = self.calls.lock().expect("call registry poisoned");
        let entry = calls.get(&call_id).ok_or(CallError::InvalidCallId(call_id))?;
        if entry.call_type != CallType::ClientStreaming {
            return Err(CallError::CallTypeMismatch {
                expected: CallType::ClientStreaming,
                actual: entry.call_type,
            });
        }
        entry
            .transport
            .clone()
            .ok_or(CallError::InvalidCallId(call_id))
    }

    /// Whether the call is still registered (not yet terminal).
    pub(crate) fn contains(&self, call_id: CallId) -> bool {
        self.calls
            .lock()
            .expect("call registry poisoned")
            .contains_key(&call_id)
    }
}

//! The event vocabulary transports report back to the engine.
//!
//! A well-behaved transport emits, per call, a sequence matching one of:
//!
//! - `Headers? Data* Trailers`
//! - `Headers? Data* Completed`
//! - `Headers? Data* Error`
//!
//! Headers is only absent when the transport fails before any server
//! metadata arrived. Nothing may follow a terminal event.

use std::fmt;

use bytes::Bytes;

use crate::{CallId, Code, Metadata};

/// One low-level completion event for a call.
#[derive(Debug, Clone)]
pub enum CallEvent {
    /// Initial server metadata. At most one per call, before any data.
    Headers(Metadata),
    /// One response message payload.
    Data(Bytes),
    /// Trailing server metadata; success terminal.
    Trailers(Metadata),
    /// Failure terminal.
    Error {
        /// Human-readable failure description.
        message: String,
        /// Status code, when the server supplied one.
        code: Option<Code>,
        /// Trailing metadata captured before the failure.
        trailers: Metadata,
    },
    /// Success terminal without trailing metadata.
    Completed,
}

impl CallEvent {
    /// Whether this event ends the call's sequence.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallEvent::Trailers(_) | CallEvent::Error { .. } | CallEvent::Completed
        )
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            CallEvent::Headers(_) => "headers",
            CallEvent::Data(_) => "data",
            CallEvent::Trailers(_) => "trailers",
            CallEvent::Error { .. } => "error",
            CallEvent::Completed => "completed",
        }
    }
}

impl fmt::Display for CallEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// A [`CallEvent`] tagged with the call it belongs to, as carried on the
/// engine's single dispatch channel.
#[derive(Debug, Clone)]
pub struct TaggedEvent {
    /// The call this event belongs to.
    pub call_id: CallId,
    /// The event itself.
    pub event: CallEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        assert!(!CallEvent::Headers(Metadata::new()).is_terminal());
        assert!(!CallEvent::Data(Bytes::from_static(b"x")).is_terminal());
        assert!(CallEvent::Trailers(Metadata::new()).is_terminal());
        assert!(CallEvent::Completed.is_terminal());
        assert!(
            CallEvent::Error {
                message: "boom".into(),
                code: None,
                trailers: Metadata::new(),
            }
            .is_terminal()
        );
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(CallEvent::Completed.kind(), "completed");
        assert_eq!(CallEvent::Headers(Metadata::new()).to_string(), "headers");
    }
}

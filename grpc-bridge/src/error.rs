//! The engine's error type.
//!
//! This module provides [`CallError`], the single tagged error type for every
//! failure the engine surfaces. Synchronous failures (absent connection,
//! unsupported call type) are returned directly from the issuing operation;
//! everything after a call has been accepted arrives through the terminal
//! error event and rejects the call's futures or stream.

use grpc_bridge_core::{CallId, CallType, Code, ConnectionId, InvalidHostError, Metadata};

/// Errors surfaced by the call engine.
///
/// `CallError` is `Clone` because one terminal failure fans out to several
/// futures and stream subscribers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CallError {
    /// No channel exists for the given connection id.
    #[error("no connection for {0}")]
    ConnectionFailure(ConnectionId),

    /// The configured host could not be parsed into a usable target.
    #[error("invalid host: {0}")]
    InvalidHost(String),

    /// Malformed request payload at the transport boundary.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// An operation referenced a call id the engine does not know.
    #[error("unknown call id {0}")]
    InvalidCallId(CallId),

    /// An operation valid for one call type was attempted on another, e.g.
    /// sending a client-stream message on a unary call.
    #[error("call type mismatch: expected {expected}, call is {actual}")]
    CallTypeMismatch {
        expected: CallType,
        actual: CallType,
    },

    /// The requested capability is not supported by the engine.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// A transport- or server-reported failure.
    #[error("remote error: {message}")]
    Remote {
        message: String,
        code: Option<Code>,
        /// Trailing metadata captured before the failure.
        trailers: Metadata,
    },

    /// The consumer cancelled the call.
    #[error("call cancelled")]
    Cancelled,
}

impl CallError {
    /// Create a remote error.
    pub fn remote(message: impl Into<String>, code: Option<Code>, trailers: Metadata) -> Self {
        CallError::Remote {
            message: message.into(),
            code,
            trailers,
        }
    }

    /// The status code this error maps to.
    ///
    /// For non-remote variants this is a fixed mapping; a remote error
    /// without an explicit code maps to `Unknown`.
    pub fn code(&self) -> Code {
        match self {
            CallError::ConnectionFailure(_) => Code::Unavailable,
            CallError::InvalidHost(_) | CallError::InvalidPayload(_) => Code::InvalidArgument,
            CallError::InvalidCallId(_) => Code::NotFound,
            CallError::CallTypeMismatch { .. } => Code::FailedPrecondition,
            CallError::NotImplemented(_) => Code::Unimplemented,
            CallError::Remote { code, .. } => code.unwrap_or(Code::Unknown),
            CallError::Cancelled => Code::Cancelled,
        }
    }

    /// Whether this is a consumer-initiated cancellation, as opposed to a
    /// remote failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CallError::Cancelled)
    }

    /// Trailing metadata attached to the error, if any.
    pub fn trailers(&self) -> Option<&Metadata> {
        match self {
            CallError::Remote { trailers, .. } => Some(trailers),
            _ => None,
        }
    }
}

impl From<InvalidHostError> for CallError {
    fn from(err: InvalidHostError) -> Self {
        CallError::InvalidHost(err.to_string())
    }
}

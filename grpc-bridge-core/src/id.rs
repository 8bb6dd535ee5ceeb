//! Process-unique identifiers for connections and calls.
//!
//! Both id kinds draw from a single process-wide monotonic counter. Ids are
//! strictly increasing and never reused within the lifetime of the process,
//! so a completed call's id can never be confused with a later call's.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// The shared counter. Starts at 1 so that 0 is never a valid id and can be
/// safely used as a sentinel by transports that need one.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_raw() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Identifies one configured, reusable transport target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate a fresh connection id from the process-wide counter.
    pub fn next() -> Self {
        ConnectionId(next_raw())
    }

    /// Wrap an externally assigned id.
    ///
    /// Useful when the host application manages connection identity itself.
    /// Mixing externally assigned ids with [`ConnectionId::next`] is the
    /// caller's responsibility.
    pub fn from_raw(id: u64) -> Self {
        ConnectionId(id)
    }

    /// The raw integer value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Identifies one RPC invocation's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(u64);

impl CallId {
    /// Allocate a fresh call id from the process-wide counter.
    pub fn next() -> Self {
        CallId(next_raw())
    }

    /// Wrap an externally assigned id.
    pub fn from_raw(id: u64) -> Self {
        CallId(id)
    }

    /// The raw integer value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call-{}", self.0)
    }
}

//! Shared types for the grpc-bridge call engine.
//!
//! This crate holds the leaf types shared between the engine and transport
//! implementations:
//!
//! - [`ConnectionId`] / [`CallId`]: process-unique identifiers
//! - [`Metadata`]: ordered, duplicate-preserving string multimap
//! - [`Code`]: gRPC status codes
//! - [`ConnectionConfig`]: per-connection transport configuration
//! - [`CallDescriptor`] / [`CallType`]: what to call and how
//! - [`CallEvent`] / [`TaggedEvent`]: the event vocabulary transports report
//!
//! No engine logic lives here; see the `grpc-bridge` crate for the call
//! correlator, registries and client facade.

mod code;
mod config;
mod descriptor;
mod event;
mod id;
mod metadata;

pub use code::Code;
pub use config::{CompressionPolicy, ConnectionConfig, InvalidHostError, KeepalivePolicy, Target};
pub use descriptor::{CallDescriptor, CallType};
pub use event::{CallEvent, TaggedEvent};
pub use id::{CallId, ConnectionId};
pub use metadata::Metadata;

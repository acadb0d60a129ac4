//! Event-sourcing engine for the healthcare registry.
//!
//! This crate provides:
//! - `Event`, the immutable content-addressed record, with its wire codec
//! - `LookupTable`, the committed-event index that enforces linear chains
//! - `EventHandler` / `EventLookup` trait boundaries for domain collaborators
//! - `SignatureValidator`, run ahead of domain handlers
//! - `EventSystem`, the orchestrator with its retry and dead-letter sets
//! - One-file-per-event directory storage and replay
//! - `SharedEventSystem` for concurrent callers, and commit listeners that
//!   forward committed events to peers

pub mod config;
pub mod error;
pub mod event;
pub mod files;
pub mod handler;
pub mod listener;
pub mod lookup;
pub mod retry;
pub mod shared;
pub mod signature;
pub mod system;

pub use config::{EngineConfig, RetryConfig};
pub use error::{EventError, EventResult, HandlerError, HandlerResult, LookupError};
pub use event::{Event, CURRENT_VERSION};
pub use files::{EventFile, EventFileName};
pub use handler::{handler_fn, EventHandler, FnHandler};
pub use listener::{CommitListener, NetworkForwarder, OutboundEvent, PeerTransport, TransportError};
pub use lookup::{EventLookup, LookupTable};
pub use retry::{DeadLetter, DeferReason, Deferred, RetrySet};
pub use shared::SharedEventSystem;
pub use signature::{KeyVerifier, SignatureValidator, SignatureVerifier};
pub use system::{EngineStats, EventSystem, LoadReport, ProcessOutcome};

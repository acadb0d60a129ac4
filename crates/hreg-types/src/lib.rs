//! Foundation types for the healthcare registry event log.
//!
//! Every other `hreg` crate depends on `hreg-types`.
//!
//! # Key Types
//!
//! - [`EventRef`]: Content-addressed event reference (BLAKE3 digest)
//! - [`EventType`]: String tag selecting the handlers for an event
//! - [`FileTimestamp`]: Millisecond UTC timestamp used in event file names

pub mod error;
pub mod event_type;
pub mod reference;
pub mod timestamp;

pub use error::TypeError;
pub use event_type::EventType;
pub use reference::EventRef;
pub use timestamp::{FileTimestamp, FILE_TIMESTAMP_LEN};

use std::io;
use std::path::PathBuf;

use hreg_crypto::CryptoError;
use hreg_types::{EventRef, EventType, TypeError};

/// Errors raised by the lookup table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("previous event not found: {prev} (referenced by {event})")]
    PreviousNotFound { event: EventRef, prev: EventRef },

    #[error("previous event already referred to: {prev} is followed by {existing}, cannot chain {event}")]
    AlreadyReferred {
        event: EventRef,
        prev: EventRef,
        existing: EventRef,
    },

    #[error("previous event type differs: {prev} is {prev_type}, {event} is {event_type}")]
    TypeMismatch {
        event: EventRef,
        prev: EventRef,
        event_type: EventType,
        prev_type: EventType,
    },

    #[error("event already registered: {0}")]
    Duplicate(EventRef),

    #[error("ambiguous lookup: {paths} independent event chains match")]
    Ambiguous { paths: usize },
}

/// Errors returned by event handlers.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("signature verification failed: {0}")]
    Signature(#[source] CryptoError),

    #[error("event is unsigned and signatures are required")]
    Unsigned,

    #[error("event rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Event(Box<EventError>),
}

impl From<EventError> for HandlerError {
    fn from(err: EventError) -> Self {
        Self::Event(Box::new(err))
    }
}

/// Errors produced by the event engine.
///
/// Variants follow the engine's failure classes: configuration, validation,
/// fatal dependency errors, transient handler failures, and I/O.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("event system is not configured: no storage location set")]
    NotConfigured,

    #[error("missing event type")]
    MissingEventType,

    #[error("event ref mismatch: declared {declared}, computed {computed}")]
    RefMismatch {
        declared: EventRef,
        computed: EventRef,
    },

    #[error("unsupported event type: {0}")]
    UnsupportedType(EventType),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("no handlers registered for event type {0}")]
    NoHandlers(EventType),

    #[error("handler failed for {event_type} event {event}: {source}")]
    Handler {
        event: EventRef,
        event_type: EventType,
        #[source]
        source: HandlerError,
    },

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("unable to parse event: {0}")]
    Parse(String),

    #[error("event has no payload")]
    NoPayload,

    #[error("unable to decode event payload: {0}")]
    Payload(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to load event file {file}: {source}")]
    File {
        file: PathBuf,
        #[source]
        source: Box<EventError>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("event system state lock poisoned")]
    StatePoisoned,
}

impl EventError {
    /// Returns `true` for failures that leave the event in the retry set.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Handler { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn in_file(file: impl Into<PathBuf>, source: EventError) -> Self {
        Self::File {
            file: file.into(),
            source: Box::new(source),
        }
    }
}

/// Convenience alias used throughout the engine.
pub type EventResult<T> = std::result::Result<T, EventError>;

/// Result returned by an [`crate::EventHandler`].
pub type HandlerResult = std::result::Result<(), HandlerError>;

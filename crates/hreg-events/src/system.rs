//! The event system: routes events through their handlers and commits them.
//!
//! Every event passes the same pipeline whether it was produced locally
//! ([`EventSystem::publish_event`]), received from a peer
//! ([`EventSystem::process_event`]) or replayed from disk
//! ([`EventSystem::load_and_apply_events`]):
//!
//! 1. reject if the system has no storage location or the type is unknown;
//! 2. return early if the event is already committed;
//! 3. park it if its predecessor has not been committed yet;
//! 4. check chain linearity, then run the type's handlers in order;
//! 5. on success register it in the lookup table and notify listeners;
//! 6. drain the retry set, since the commit may unblock deferred events.
//!
//! The system does no locking of its own. Share it through
//! [`crate::SharedEventSystem`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use hreg_types::EventType;

use crate::config::EngineConfig;
use crate::error::{EventError, EventResult, LookupError};
use crate::event::Event;
use crate::files;
use crate::handler::EventHandler;
use crate::listener::CommitListener;
use crate::lookup::LookupTable;
use crate::retry::{DeadLetter, Deferred, RetrySet};

/// What happened to an event handed to the system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// All handlers succeeded and the event is in the lookup table.
    Committed,
    /// The event was committed earlier; nothing ran.
    AlreadyCommitted,
    /// The predecessor is missing; the event waits in the retry set.
    Deferred,
}

/// Counters describing the system's current state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub committed: usize,
    pub deferred: usize,
    pub dead_letters: usize,
}

/// Summary of a directory replay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Event files read and handed to the pipeline.
    pub files_read: usize,
    /// Directory entries that do not follow the event naming scheme.
    pub skipped: usize,
    /// Events committed during the replay, including drained ones.
    pub committed: usize,
    /// Files whose event was already committed.
    pub already_committed: usize,
    /// Handler failures; those events remain in the retry set.
    pub failed: usize,
    /// Events still in the retry set after the replay.
    pub deferred: usize,
}

/// Orchestrates handlers, the lookup table and the retry set.
pub struct EventSystem {
    config: EngineConfig,
    handlers: HashMap<EventType, Vec<Arc<dyn EventHandler>>>,
    lookup: LookupTable,
    retry: RetrySet,
    listeners: Vec<Arc<dyn CommitListener>>,
}

impl EventSystem {
    pub fn new(config: EngineConfig) -> Self {
        let retry = RetrySet::new(config.retry.clone());
        Self {
            config,
            handlers: HashMap::new(),
            lookup: LookupTable::new(),
            retry,
            listeners: Vec::new(),
        }
    }

    /// Set the directory events are written to and replayed from.
    pub fn configure(&mut self, data_dir: impl Into<PathBuf>) {
        self.config.data_dir = Some(data_dir.into());
    }

    pub fn is_configured(&self) -> bool {
        self.config.data_dir.is_some()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Append `handler` to the ordered handler list of `event_type`.
    pub fn register_event_handler(&mut self, event_type: EventType, handler: Arc<dyn EventHandler>) {
        debug!(%event_type, "handler registered");
        self.handlers.entry(event_type).or_default().push(handler);
    }

    pub fn add_commit_listener(&mut self, listener: Arc<dyn CommitListener>) {
        self.listeners.push(listener);
    }

    /// Feed one event through the pipeline.
    ///
    /// A missing predecessor is not an error: the event is parked and
    /// [`ProcessOutcome::Deferred`] returned. A handler failure returns
    /// [`EventError::Handler`] and leaves the event in the retry set.
    pub fn process_event(&mut self, event: Event) -> EventResult<ProcessOutcome> {
        if !self.is_configured() {
            return Err(EventError::NotConfigured);
        }
        if !self.config.supports(event.event_type()) {
            return Err(EventError::UnsupportedType(event.event_type().clone()));
        }

        let reference = event.reference();
        if self.lookup.contains(&reference) {
            debug!(event_ref = %reference, "event already committed");
            return Ok(ProcessOutcome::AlreadyCommitted);
        }
        if let Some(prev) = event.prev() {
            if !self.lookup.contains(&prev) {
                debug!(event_ref = %reference, %prev, "previous event missing, deferring");
                self.retry.park(event, prev);
                return Ok(ProcessOutcome::Deferred);
            }
        }

        let result = self.commit(&event);
        self.retry_events();
        result
    }

    /// Process an event and, once accepted, write it to the data directory.
    pub fn publish_event(&mut self, event: Event) -> EventResult<PathBuf> {
        let dir = self.data_dir()?.to_path_buf();
        self.process_event(event.clone())?;
        files::write_event(&dir, &event)
    }

    /// Replay every event file in the data directory in file-name order.
    ///
    /// Files that do not follow the naming scheme are ignored. A file that
    /// cannot be read or parsed aborts the replay with an error naming it;
    /// events committed before that point stay committed. Handler failures
    /// do not abort: those events wait in the retry set like any other.
    pub fn load_and_apply_events(&mut self) -> EventResult<LoadReport> {
        let dir = self.data_dir()?.to_path_buf();
        let listing = files::list_events(&dir)?;
        let committed_before = self.lookup.len();

        let mut report = LoadReport {
            skipped: listing.skipped,
            ..LoadReport::default()
        };
        for file in &listing.files {
            let event = files::read_event(file)?;
            report.files_read += 1;
            match self.process_event(event) {
                Ok(ProcessOutcome::AlreadyCommitted) => report.already_committed += 1,
                Ok(_) => {}
                Err(e) if e.is_retryable() => {
                    warn!(path = %file.path.display(), error = %e, "event deferred during replay");
                    report.failed += 1;
                }
                Err(e) => return Err(EventError::in_file(&file.path, e)),
            }
        }

        report.committed = self.lookup.len() - committed_before;
        report.deferred = self.retry.len();
        info!(
            dir = %dir.display(),
            files = report.files_read,
            committed = report.committed,
            deferred = report.deferred,
            "event replay finished"
        );
        Ok(report)
    }

    /// Re-attempt deferred events, oldest `issuedAt` first, until a pass
    /// commits nothing. Returns the number of events committed.
    ///
    /// Entries past the retry bounds are dead-lettered first. Events whose
    /// predecessor is still missing are skipped without running handlers.
    /// Failures are logged, never returned.
    pub fn retry_events(&mut self) -> usize {
        self.retry.expire(Instant::now());

        let mut committed = 0;
        loop {
            let mut progressed = false;
            for reference in self.retry.pending() {
                let Some(deferred) = self.retry.get(&reference) else {
                    continue;
                };
                if deferred
                    .event
                    .prev()
                    .is_some_and(|prev| !self.lookup.contains(&prev))
                {
                    continue;
                }
                let event = deferred.event.clone();
                match self.commit(&event) {
                    Ok(ProcessOutcome::Committed) => {
                        committed += 1;
                        progressed = true;
                    }
                    Ok(_) => {}
                    Err(e) => warn!(event_ref = %reference, error = %e, "deferred event still failing"),
                }
            }
            if !progressed {
                break;
            }
        }
        committed
    }

    /// Committed events.
    pub fn lookup(&self) -> &LookupTable {
        &self.lookup
    }

    /// Number of events waiting in the retry set.
    pub fn deferred_count(&self) -> usize {
        self.retry.len()
    }

    pub fn deferred(&self) -> impl Iterator<Item = &Deferred> {
        self.retry.iter()
    }

    pub fn dead_letters(&self) -> &[DeadLetter] {
        self.retry.dead_letters()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            committed: self.lookup.len(),
            deferred: self.retry.len(),
            dead_letters: self.retry.dead_letters().len(),
        }
    }

    fn data_dir(&self) -> EventResult<&Path> {
        self.config
            .data_dir
            .as_deref()
            .ok_or(EventError::NotConfigured)
    }

    /// Run handlers and register. The caller has checked configuration,
    /// type support and idempotency.
    fn commit(&mut self, event: &Event) -> EventResult<ProcessOutcome> {
        let reference = event.reference();
        let event_type = event.event_type();

        let Some(handlers) = self.handlers.get(event_type).filter(|h| !h.is_empty()) else {
            self.retry.bury(&reference, "no handlers registered");
            return Err(EventError::NoHandlers(event_type.clone()));
        };

        match self.lookup.check(event) {
            Ok(()) => {}
            Err(LookupError::PreviousNotFound { prev, .. }) => {
                self.retry.park(event.clone(), prev);
                return Ok(ProcessOutcome::Deferred);
            }
            Err(LookupError::Duplicate(_)) => {
                self.retry.remove(&reference);
                return Ok(ProcessOutcome::AlreadyCommitted);
            }
            Err(e) => {
                self.retry.bury(&reference, e.to_string());
                return Err(e.into());
            }
        }

        for handler in handlers {
            if let Err(source) = handler.handle(event, &self.lookup) {
                let attempts = self.retry.record_failure(event, &source.to_string());
                debug!(event_ref = %reference, attempts, error = %source, "handler failed");
                return Err(EventError::Handler {
                    event: reference,
                    event_type: event_type.clone(),
                    source,
                });
            }
        }

        self.lookup.register(event.clone())?;
        self.retry.remove(&reference);
        info!(
            event_ref = %reference,
            prev = ?event.prev().map(|p| p.to_hex()),
            %event_type,
            issued_at = ?event.issued_at(),
            "event committed"
        );
        for listener in &self.listeners {
            listener.on_commit(event);
        }
        Ok(ProcessOutcome::Committed)
    }
}

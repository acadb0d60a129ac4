use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use hreg_types::{EventRef, EventType};

use crate::error::{EventError, EventResult};
use crate::event::Event;
use crate::handler::EventHandler;
use crate::listener::CommitListener;
use crate::lookup::EventLookup;
use crate::system::{EngineStats, EventSystem, LoadReport, ProcessOutcome};

/// A cloneable handle that serializes all access to one [`EventSystem`].
///
/// Handlers run while the lock is held, so a handler must never call back
/// into the same handle.
#[derive(Clone)]
pub struct SharedEventSystem {
    inner: Arc<Mutex<EventSystem>>,
}

impl SharedEventSystem {
    pub fn new(system: EventSystem) -> Self {
        Self {
            inner: Arc::new(Mutex::new(system)),
        }
    }

    /// Run `f` with exclusive access to the system.
    pub fn with<R>(&self, f: impl FnOnce(&mut EventSystem) -> R) -> EventResult<R> {
        let mut guard = self.lock()?;
        Ok(f(&mut guard))
    }

    pub fn register_event_handler(
        &self,
        event_type: EventType,
        handler: Arc<dyn EventHandler>,
    ) -> EventResult<()> {
        self.with(|system| system.register_event_handler(event_type, handler))
    }

    pub fn add_commit_listener(&self, listener: Arc<dyn CommitListener>) -> EventResult<()> {
        self.with(|system| system.add_commit_listener(listener))
    }

    pub fn process_event(&self, event: Event) -> EventResult<ProcessOutcome> {
        self.lock()?.process_event(event)
    }

    pub fn publish_event(&self, event: Event) -> EventResult<PathBuf> {
        self.lock()?.publish_event(event)
    }

    pub fn load_and_apply_events(&self) -> EventResult<LoadReport> {
        self.lock()?.load_and_apply_events()
    }

    pub fn retry_events(&self) -> EventResult<usize> {
        self.with(EventSystem::retry_events)
    }

    /// Copy of the committed event with `reference`.
    pub fn get(&self, reference: &EventRef) -> EventResult<Option<Event>> {
        self.with(|system| system.lookup().get(reference).cloned())
    }

    /// Copy of the tail of the single chain matching `matcher`.
    pub fn find_last_event(
        &self,
        matcher: impl Fn(&Event) -> bool,
    ) -> EventResult<Option<Event>> {
        let guard = self.lock()?;
        let found = guard.lookup().find_last_event(&matcher)?;
        Ok(found.cloned())
    }

    pub fn deferred_count(&self) -> EventResult<usize> {
        self.with(|system| system.deferred_count())
    }

    pub fn stats(&self) -> EventResult<EngineStats> {
        self.with(|system| system.stats())
    }

    fn lock(&self) -> EventResult<MutexGuard<'_, EventSystem>> {
        self.inner.lock().map_err(|_| EventError::StatePoisoned)
    }
}

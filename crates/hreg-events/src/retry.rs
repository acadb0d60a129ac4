//! Events waiting for a missing predecessor or a handler retry.

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use tracing::warn;

use hreg_types::EventRef;

use crate::config::RetryConfig;
use crate::event::Event;

/// Why an event sits in the retry set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeferReason {
    /// The event's `prev` has not been committed yet.
    MissingPrevious(EventRef),
    /// A handler rejected the event; carries the last error message.
    HandlerFailed(String),
}

impl fmt::Display for DeferReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPrevious(prev) => write!(f, "waiting for previous event {prev}"),
            Self::HandlerFailed(err) => write!(f, "handler failed: {err}"),
        }
    }
}

/// A deferred event.
#[derive(Clone, Debug)]
pub struct Deferred {
    pub event: Event,
    pub reason: DeferReason,
    /// Handler executions that failed. Waiting on a predecessor does not count.
    pub attempts: u32,
    pub first_deferred: Instant,
}

/// An event that exceeded the retry bounds or can never commit.
#[derive(Clone, Debug)]
pub struct DeadLetter {
    pub event: Event,
    pub attempts: u32,
    pub reason: String,
}

/// Transient set of deferred events, keyed by their own reference.
#[derive(Debug)]
pub struct RetrySet {
    config: RetryConfig,
    entries: HashMap<EventRef, Deferred>,
    dead: Vec<DeadLetter>,
}

impl RetrySet {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            dead: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, reference: &EventRef) -> bool {
        self.entries.contains_key(reference)
    }

    pub fn get(&self, reference: &EventRef) -> Option<&Deferred> {
        self.entries.get(reference)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Deferred> {
        self.entries.values()
    }

    /// Park an event whose predecessor is missing. Re-parking keeps the
    /// original deferral instant and attempt count.
    pub fn park(&mut self, event: Event, prev: EventRef) {
        let reference = event.reference();
        self.entries
            .entry(reference)
            .and_modify(|d| d.reason = DeferReason::MissingPrevious(prev))
            .or_insert_with(|| Deferred {
                event,
                reason: DeferReason::MissingPrevious(prev),
                attempts: 0,
                first_deferred: Instant::now(),
            });
    }

    /// Record a failed handler run, parking the event if it is new.
    pub fn record_failure(&mut self, event: &Event, error: &str) -> u32 {
        let reason = DeferReason::HandlerFailed(error.to_string());
        let entry = self
            .entries
            .entry(event.reference())
            .or_insert_with(|| Deferred {
                event: event.clone(),
                reason: reason.clone(),
                attempts: 0,
                first_deferred: Instant::now(),
            });
        entry.reason = reason;
        entry.attempts += 1;
        entry.attempts
    }

    pub fn remove(&mut self, reference: &EventRef) -> Option<Deferred> {
        self.entries.remove(reference)
    }

    /// Deferred references in retry order: ascending `issuedAt`, legacy
    /// events without one first, ties broken by reference.
    pub fn pending(&self) -> Vec<EventRef> {
        let mut order: Vec<&Deferred> = self.entries.values().collect();
        order.sort_by(|a, b| {
            a.event
                .issued_at()
                .cmp(&b.event.issued_at())
                .then_with(|| a.event.reference().cmp(&b.event.reference()))
        });
        order.into_iter().map(|d| d.event.reference()).collect()
    }

    /// Move a deferred event to the dead-letter list.
    pub fn bury(&mut self, reference: &EventRef, reason: impl Into<String>) -> bool {
        let Some(deferred) = self.entries.remove(reference) else {
            return false;
        };
        let reason = reason.into();
        warn!(
            event_ref = %reference,
            event_type = %deferred.event.event_type(),
            attempts = deferred.attempts,
            reason = %reason,
            "event moved to dead letters"
        );
        self.dead.push(DeadLetter {
            event: deferred.event,
            attempts: deferred.attempts,
            reason,
        });
        true
    }

    /// Dead-letter every entry past the configured bounds. Returns the number
    /// of entries moved.
    pub fn expire(&mut self, now: Instant) -> usize {
        let max_age = self.config.max_age();
        let expired: Vec<(EventRef, String)> = self
            .entries
            .values()
            .filter_map(|d| {
                if let Some(max) = self.config.max_attempts {
                    if d.attempts >= max {
                        return Some((
                            d.event.reference(),
                            format!("gave up after {} attempts ({})", d.attempts, d.reason),
                        ));
                    }
                }
                let age = now.saturating_duration_since(d.first_deferred);
                match max_age {
                    Some(max) if age > max => Some((
                        d.event.reference(),
                        format!("deferred for {}s ({})", age.as_secs(), d.reason),
                    )),
                    _ => None,
                }
            })
            .collect();

        let count = expired.len();
        for (reference, reason) in expired {
            self.bury(&reference, reason);
        }
        count
    }

    pub fn dead_letters(&self) -> &[DeadLetter] {
        &self.dead
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use hreg_types::EventType;

    use super::*;

    fn event_at(minute: u32) -> Event {
        Event::create_at(
            EventType::vendor_claim(),
            &json!({"minute": minute}),
            None,
            Utc.with_ymd_and_hms(2022, 6, 1, 10, minute, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn park_does_not_count_attempts() {
        let mut set = RetrySet::new(RetryConfig::default());
        let event = event_at(1);
        let prev = EventRef::digest(b"prev");
        set.park(event.clone(), prev);
        set.park(event.clone(), prev);

        assert_eq!(set.len(), 1);
        let deferred = set.get(&event.reference()).unwrap();
        assert_eq!(deferred.attempts, 0);
        assert_eq!(deferred.reason, DeferReason::MissingPrevious(prev));
    }

    #[test]
    fn record_failure_counts_attempts() {
        let mut set = RetrySet::new(RetryConfig::default());
        let event = event_at(1);
        assert_eq!(set.record_failure(&event, "issuer unknown"), 1);
        assert_eq!(set.record_failure(&event, "issuer still unknown"), 2);
        assert_eq!(
            set.get(&event.reference()).unwrap().reason,
            DeferReason::HandlerFailed("issuer still unknown".into())
        );
    }

    #[test]
    fn pending_is_ordered_by_issued_at() {
        let mut set = RetrySet::new(RetryConfig::default());
        let late = event_at(30);
        let early = event_at(5);
        let middle = event_at(10);
        for e in [&late, &early, &middle] {
            set.record_failure(e, "x");
        }
        assert_eq!(
            set.pending(),
            vec![early.reference(), middle.reference(), late.reference()]
        );
    }

    #[test]
    fn expire_enforces_attempt_bound() {
        let mut set = RetrySet::new(RetryConfig {
            max_attempts: Some(2),
            max_age_secs: None,
        });
        let flaky = event_at(1);
        let waiting = event_at(2);
        set.record_failure(&flaky, "boom");
        set.record_failure(&flaky, "boom");
        set.park(waiting.clone(), EventRef::digest(b"never"));

        assert_eq!(set.expire(Instant::now()), 1);
        assert!(set.contains(&waiting.reference()));
        assert_eq!(set.dead_letters().len(), 1);
        assert_eq!(set.dead_letters()[0].event, flaky);
        assert_eq!(set.dead_letters()[0].attempts, 2);
    }

    #[test]
    fn expire_enforces_age_bound() {
        let mut set = RetrySet::new(RetryConfig {
            max_attempts: None,
            max_age_secs: Some(60),
        });
        let waiting = event_at(1);
        set.park(waiting.clone(), EventRef::digest(b"never"));

        assert_eq!(set.expire(Instant::now()), 0);
        assert_eq!(set.expire(Instant::now() + Duration::from_secs(61)), 1);
        assert!(set.is_empty());
        assert!(set.dead_letters()[0].reason.contains("waiting for previous event"));
    }

    #[test]
    fn unbounded_never_expires() {
        let mut set = RetrySet::new(RetryConfig::unbounded());
        let event = event_at(1);
        for _ in 0..100 {
            set.record_failure(&event, "boom");
        }
        assert_eq!(set.expire(Instant::now() + Duration::from_secs(86_400)), 0);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn bury_unknown_is_noop() {
        let mut set = RetrySet::new(RetryConfig::default());
        assert!(!set.bury(&EventRef::digest(b"x"), "gone"));
        assert!(set.dead_letters().is_empty());
    }
}

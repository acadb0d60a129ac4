use std::collections::{HashMap, HashSet};

use hreg_types::EventRef;

use crate::error::LookupError;
use crate::event::Event;

/// Read-only view over committed events, handed to handlers and projections.
pub trait EventLookup {
    /// Direct lookup by reference.
    fn get(&self, reference: &EventRef) -> Option<&Event>;

    /// Find the most recent event of the single causal chain containing
    /// events that satisfy `matcher`.
    ///
    /// Returns `Ok(None)` when nothing matches and
    /// [`LookupError::Ambiguous`] when matches fall on more than one
    /// independent chain.
    fn find_last_event(
        &self,
        matcher: &dyn Fn(&Event) -> bool,
    ) -> Result<Option<&Event>, LookupError>;
}

/// Registry of committed events and their single successors.
///
/// Only grows, and only through [`LookupTable::register`]. Every registered
/// event's `prev`, if any, is itself registered, has the same type, and has
/// exactly this event as its successor.
#[derive(Debug, Default)]
pub struct LookupTable {
    events: HashMap<EventRef, Event>,
    successors: HashMap<EventRef, EventRef>,
}

impl LookupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn contains(&self, reference: &EventRef) -> bool {
        self.events.contains_key(reference)
    }

    /// Run every check `register` would, without mutating the table.
    pub fn check(&self, event: &Event) -> Result<(), LookupError> {
        let reference = event.reference();
        if self.events.contains_key(&reference) {
            return Err(LookupError::Duplicate(reference));
        }
        let Some(prev) = event.prev() else {
            return Ok(());
        };

        let previous = self
            .events
            .get(&prev)
            .ok_or(LookupError::PreviousNotFound {
                event: reference,
                prev,
            })?;

        if let Some(existing) = self.successors.get(&prev) {
            return Err(LookupError::AlreadyReferred {
                event: reference,
                prev,
                existing: *existing,
            });
        }

        if previous.event_type() != event.event_type() {
            return Err(LookupError::TypeMismatch {
                event: reference,
                prev,
                event_type: event.event_type().clone(),
                prev_type: previous.event_type().clone(),
            });
        }

        Ok(())
    }

    /// Add a committed event, linking it behind its predecessor.
    pub fn register(&mut self, event: Event) -> Result<EventRef, LookupError> {
        self.check(&event)?;
        let reference = event.reference();
        if let Some(prev) = event.prev() {
            self.successors.insert(prev, reference);
        }
        self.events.insert(reference, event);
        Ok(reference)
    }

    /// The event chained directly behind `reference`, if any.
    pub fn successor(&self, reference: &EventRef) -> Option<&Event> {
        self.successors
            .get(reference)
            .and_then(|next| self.events.get(next))
    }

    /// All committed events, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.values()
    }

    /// The full chain containing `reference`, head first.
    pub fn chain(&self, reference: &EventRef) -> Vec<&Event> {
        let Some(mut head) = self.events.get(reference) else {
            return Vec::new();
        };
        while let Some(prev) = head.prev().and_then(|p| self.events.get(&p)) {
            head = prev;
        }

        let mut path = vec![head];
        let mut current = head.reference();
        while let Some(next) = self.successor(&current) {
            current = next.reference();
            path.push(next);
        }
        path
    }
}

impl EventLookup for LookupTable {
    fn get(&self, reference: &EventRef) -> Option<&Event> {
        self.events.get(reference)
    }

    fn find_last_event(
        &self,
        matcher: &dyn Fn(&Event) -> bool,
    ) -> Result<Option<&Event>, LookupError> {
        let mut absorbed: HashSet<EventRef> = HashSet::new();
        let mut tails: Vec<&Event> = Vec::new();

        for event in self.events.values() {
            if absorbed.contains(&event.reference()) || !matcher(event) {
                continue;
            }
            let path = self.chain(&event.reference());
            absorbed.extend(path.iter().map(|e| e.reference()));
            if let Some(&tail) = path.last() {
                tails.push(tail);
            }
        }

        match tails.len() {
            0 => Ok(None),
            1 => Ok(tails.pop()),
            paths => Err(LookupError::Ambiguous { paths }),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    use hreg_types::EventType;

    use super::*;

    fn event(event_type: EventType, org: &str, seq: i64, prev: Option<&Event>) -> Event {
        let at = Utc.with_ymd_and_hms(2021, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(seq);
        Event::create_at(
            event_type,
            &json!({"organization": org, "seq": seq}),
            prev.map(Event::reference),
            at,
        )
        .unwrap()
    }

    fn claim(org: &str, seq: i64, prev: Option<&Event>) -> Event {
        event(EventType::vendor_claim(), org, seq, prev)
    }

    fn for_org(org: &'static str) -> impl Fn(&Event) -> bool {
        move |e: &Event| e.payload().map(|p| p["organization"] == org).unwrap_or(false)
    }

    #[test]
    fn register_head_and_successor() {
        let mut table = LookupTable::new();
        let e1 = claim("org-a", 1, None);
        let e2 = claim("org-a", 2, Some(&e1));

        let r1 = table.register(e1.clone()).unwrap();
        let r2 = table.register(e2.clone()).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(&r1), Some(&e1));
        assert_eq!(table.successor(&r1).map(Event::reference), Some(r2));
        assert!(table.successor(&r2).is_none());
    }

    #[test]
    fn get_returns_none_for_unknown_ref() {
        let table = LookupTable::new();
        assert!(table.get(&EventRef::digest(b"unknown")).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn missing_previous_is_rejected() {
        let mut table = LookupTable::new();
        let e1 = claim("org-a", 1, None);
        let e2 = claim("org-a", 2, Some(&e1));
        let err = table.register(e2).unwrap_err();
        assert!(matches!(err, LookupError::PreviousNotFound { prev, .. } if prev == e1.reference()));
        assert!(table.is_empty());
    }

    #[test]
    fn fork_is_rejected() {
        let mut table = LookupTable::new();
        let e1 = claim("org-a", 1, None);
        let left = claim("org-a", 2, Some(&e1));
        let right = claim("org-a", 3, Some(&e1));

        table.register(e1).unwrap();
        table.register(left.clone()).unwrap();
        let err = table.register(right.clone()).unwrap_err();

        assert_eq!(
            err,
            LookupError::AlreadyReferred {
                event: right.reference(),
                prev: right.prev().unwrap(),
                existing: left.reference(),
            }
        );
        assert!(err.to_string().contains("already referred to"));
        assert!(!table.contains(&right.reference()));
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let mut table = LookupTable::new();
        let vendor = event(EventType::register_vendor(), "org-a", 1, None);
        let claim = claim("org-a", 2, Some(&vendor));

        table.register(vendor).unwrap();
        let err = table.register(claim).unwrap_err();
        assert!(matches!(err, LookupError::TypeMismatch { .. }));
        assert!(err.to_string().contains("previous event type differs"));
    }

    #[test]
    fn duplicate_is_rejected() {
        let mut table = LookupTable::new();
        let e1 = claim("org-a", 1, None);
        table.register(e1.clone()).unwrap();
        assert_eq!(
            table.register(e1.clone()),
            Err(LookupError::Duplicate(e1.reference()))
        );
    }

    #[test]
    fn chain_walks_from_any_member() {
        let mut table = LookupTable::new();
        let e1 = claim("org-a", 1, None);
        let e2 = claim("org-a", 2, Some(&e1));
        let e3 = claim("org-a", 3, Some(&e2));
        for e in [&e1, &e2, &e3] {
            table.register(e.clone()).unwrap();
        }

        let from_middle: Vec<_> = table.chain(&e2.reference()).into_iter().cloned().collect();
        assert_eq!(from_middle, vec![e1, e2, e3]);
    }

    #[test]
    fn find_last_event_without_matches() {
        let mut table = LookupTable::new();
        table.register(claim("org-a", 1, None)).unwrap();
        assert_eq!(table.find_last_event(&for_org("org-z")), Ok(None));
    }

    #[test]
    fn find_last_event_returns_chain_tail() {
        let mut table = LookupTable::new();
        let e1 = claim("org-a", 1, None);
        let e2 = claim("org-a", 2, Some(&e1));
        let e3 = claim("org-a", 3, Some(&e2));
        for e in [&e1, &e2, &e3] {
            table.register(e.clone()).unwrap();
        }
        table.register(claim("org-b", 4, None)).unwrap();

        let found = table.find_last_event(&for_org("org-a")).unwrap();
        assert_eq!(found, Some(&e3));
    }

    #[test]
    fn find_last_event_matching_only_the_head_still_returns_tail() {
        let mut table = LookupTable::new();
        let e1 = claim("org-a", 1, None);
        let e2 = claim("org-b", 2, Some(&e1));
        table.register(e1.clone()).unwrap();
        table.register(e2.clone()).unwrap();

        assert_eq!(table.find_last_event(&for_org("org-a")).unwrap(), Some(&e2));
    }

    #[test]
    fn find_last_event_reports_ambiguity() {
        let mut table = LookupTable::new();
        let a1 = claim("org-a", 1, None);
        let a2 = claim("org-a", 2, Some(&a1));
        let b1 = claim("org-a", 3, None);
        for e in [&a1, &a2, &b1] {
            table.register(e.clone()).unwrap();
        }

        assert_eq!(
            table.find_last_event(&for_org("org-a")),
            Err(LookupError::Ambiguous { paths: 2 })
        );
    }
}

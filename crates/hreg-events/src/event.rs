//! The immutable, content-addressed event record.
//!
//! An [`Event`] is created once, optionally signed, and from then on only
//! read. Its [`EventRef`] is the domain-separated BLAKE3 digest of the
//! canonical JSON of a versioned field subset:
//!
//! | version | hashed fields                                   |
//! |---------|-------------------------------------------------|
//! | 0       | `issuedAt`, `type`, `jws`, `payload`            |
//! | ≥ 1     | the above plus `prev`, `version`                |
//!
//! Any explicit `ref` carried by serialized input is never hashed; it must
//! match the recomputed value or parsing fails. An `issuedAt` backfilled
//! from a file name is visible through [`Event::issued_at`] but is neither
//! hashed nor written back, so a legacy event keeps its original reference.

use std::sync::OnceLock;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use hreg_crypto::{canonical_bytes, jws, Certificate, ContentHasher, CryptoResult, SigningKey};
use hreg_types::reference::optional_ref;
use hreg_types::{EventRef, EventType};

use crate::error::{EventError, EventResult};

/// Schema version written by this implementation.
pub const CURRENT_VERSION: u32 = 1;

/// Wire form of an event.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventDocument {
    #[serde(default)]
    version: u32,
    #[serde(default, rename = "type")]
    event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    issued_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        rename = "ref",
        with = "optional_ref",
        skip_serializing_if = "Option::is_none"
    )]
    reference: Option<EventRef>,
    #[serde(default, with = "optional_ref", skip_serializing_if = "Option::is_none")]
    prev: Option<EventRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    jws: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
}

/// A typed, content-addressed registry event.
#[derive(Clone, Debug)]
pub struct Event {
    version: u32,
    event_type: EventType,
    issued_at: Option<DateTime<Utc>>,
    issued_at_backfilled: bool,
    prev: Option<EventRef>,
    signature: Option<String>,
    payload: Option<Value>,
    reference: OnceLock<EventRef>,
    serialized: OnceLock<Vec<u8>>,
}

impl Event {
    /// Create a new event issued now, at the current schema version.
    ///
    /// `issuedAt` is truncated to milliseconds so it survives the file-name
    /// timestamp unchanged.
    pub fn create<P: Serialize>(
        event_type: EventType,
        payload: &P,
        prev: Option<EventRef>,
    ) -> EventResult<Self> {
        Self::create_at(event_type, payload, prev, Utc::now())
    }

    /// Create a new event with an explicit issue instant.
    pub fn create_at<P: Serialize>(
        event_type: EventType,
        payload: &P,
        prev: Option<EventRef>,
        issued_at: DateTime<Utc>,
    ) -> EventResult<Self> {
        let payload =
            serde_json::to_value(payload).map_err(|e| EventError::Serialization(e.to_string()))?;
        Ok(Self {
            version: CURRENT_VERSION,
            event_type,
            issued_at: Some(issued_at.trunc_subsecs(3)),
            issued_at_backfilled: false,
            prev,
            signature: None,
            payload: Some(payload),
            reference: OnceLock::new(),
            serialized: OnceLock::new(),
        })
    }

    /// Decode serialized bytes.
    ///
    /// Fails with [`EventError::MissingEventType`] for an empty `type` and
    /// with [`EventError::RefMismatch`] if an explicit `ref` does not equal
    /// the recomputed reference.
    pub fn parse(bytes: &[u8]) -> EventResult<Self> {
        let raw: Value = serde_json::from_slice(bytes).map_err(|e| EventError::Parse(e.to_string()))?;
        let legacy_payload = locate_payload(&raw);
        let doc: EventDocument =
            serde_json::from_value(raw).map_err(|e| EventError::Parse(e.to_string()))?;

        if doc.event_type.is_empty() {
            return Err(EventError::MissingEventType);
        }

        let event = Self {
            version: doc.version,
            event_type: EventType::new(doc.event_type)?,
            issued_at: doc.issued_at,
            issued_at_backfilled: false,
            prev: doc.prev,
            signature: doc.jws.filter(|s| !s.is_empty()),
            payload: doc.payload.or(legacy_payload),
            reference: OnceLock::new(),
            serialized: OnceLock::new(),
        };

        if let Some(declared) = doc.reference {
            let computed = event.reference();
            if declared != computed {
                return Err(EventError::RefMismatch { declared, computed });
            }
        }

        Ok(event)
    }

    /// The content-addressed reference of this event.
    pub fn reference(&self) -> EventRef {
        *self
            .reference
            .get_or_init(|| ContentHasher::EVENT.hash_canonical(&self.hash_input()))
    }

    /// Serialized form, with `ref` always set. Cached until the event changes.
    pub fn marshal(&self) -> EventResult<Vec<u8>> {
        if let Some(bytes) = self.serialized.get() {
            return Ok(bytes.clone());
        }
        let doc = EventDocument {
            version: self.version,
            event_type: self.event_type.to_string(),
            issued_at: self.recorded_issued_at(),
            reference: Some(self.reference()),
            prev: self.prev,
            jws: self.signature.clone(),
            payload: self.payload.clone(),
        };
        let bytes = serde_json::to_vec(&doc).map_err(|e| EventError::Serialization(e.to_string()))?;
        Ok(self.serialized.get_or_init(|| bytes).clone())
    }

    /// Decode the payload into `T`.
    ///
    /// Signed events decode from the signature envelope's payload bytes,
    /// never from the outer JSON, so a swapped outer payload has no effect.
    /// The envelope must already have been verified by the signature
    /// validator.
    pub fn unmarshal<T: DeserializeOwned>(&self) -> EventResult<T> {
        match &self.signature {
            Some(compact) => {
                let bytes = jws::payload_of(compact)?;
                serde_json::from_slice(&bytes).map_err(|e| EventError::Payload(e.to_string()))
            }
            None => {
                let payload = self.payload.clone().ok_or(EventError::NoPayload)?;
                serde_json::from_value(payload).map_err(|e| EventError::Payload(e.to_string()))
            }
        }
    }

    /// Decode the payload and run `post_process` against the originating
    /// event, e.g. to enforce cross-field invariants.
    pub fn unmarshal_with<T, F>(&self, post_process: F) -> EventResult<T>
    where
        T: DeserializeOwned,
        F: FnOnce(&mut T, &Event) -> EventResult<()>,
    {
        let mut value = self.unmarshal::<T>()?;
        post_process(&mut value, self)?;
        Ok(value)
    }

    /// Sign the canonical payload bytes with an external signing callback.
    pub fn sign<F>(&mut self, sign_fn: F) -> EventResult<()>
    where
        F: FnOnce(&[u8]) -> CryptoResult<String>,
    {
        let payload = self.payload.as_ref().ok_or(EventError::NoPayload)?;
        let signature = sign_fn(&canonical_bytes(payload))?;
        self.signature = Some(signature);
        self.invalidate();
        Ok(())
    }

    /// Sign as a compact JWS carrying `chain` (leaf first).
    pub fn sign_with_key(&mut self, key: &SigningKey, chain: Vec<Certificate>) -> EventResult<()> {
        self.sign(|payload| jws::sign(payload, key, chain))
    }

    /// Set `issuedAt` if the event predates that field. Returns `true` if
    /// the value was filled in.
    ///
    /// The backfilled instant is only reported by [`Event::issued_at`]. The
    /// reference and the serialized form stay those of the recorded event.
    pub fn backfill_issued_at(&mut self, issued_at: DateTime<Utc>) -> bool {
        if self.issued_at.is_some() {
            return false;
        }
        self.issued_at = Some(issued_at);
        self.issued_at_backfilled = true;
        true
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    /// `None` only for legacy events read before the field existed.
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    pub fn prev(&self) -> Option<EventRef> {
        self.prev
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// The outer payload as carried in the serialized form.
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    fn invalidate(&mut self) {
        self.reference = OnceLock::new();
        self.serialized = OnceLock::new();
    }

    /// `issuedAt` as actually recorded, excluding a backfilled value.
    fn recorded_issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at.filter(|_| !self.issued_at_backfilled)
    }

    fn hash_input(&self) -> Value {
        let mut fields = Map::new();
        if let Some(issued_at) = self.recorded_issued_at() {
            fields.insert(
                "issuedAt".into(),
                Value::String(issued_at.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            );
        }
        fields.insert("type".into(), Value::String(self.event_type.to_string()));
        if let Some(signature) = &self.signature {
            fields.insert("jws".into(), Value::String(signature.clone()));
        }
        if let Some(payload) = &self.payload {
            fields.insert("payload".into(), payload.clone());
        }
        if self.version >= 1 {
            if let Some(prev) = self.prev {
                fields.insert("prev".into(), Value::String(prev.to_hex()));
            }
            fields.insert("version".into(), Value::from(self.version));
        }
        Value::Object(fields)
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.reference() == other.reference()
    }
}

impl Eq for Event {}

/// Older writers capitalised field names; find the payload by name when the
/// structured decode has no `payload` member.
fn locate_payload(raw: &Value) -> Option<Value> {
    let Value::Object(map) = raw else {
        return None;
    };
    if map.contains_key("payload") {
        return None;
    }
    map.iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("payload"))
        .map(|(_, value)| value.clone())
}

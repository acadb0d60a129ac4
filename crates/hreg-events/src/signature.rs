use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use hreg_crypto::{CryptoResult, VerifyingKey};
use hreg_types::EventType;

use crate::error::{HandlerError, HandlerResult};
use crate::event::Event;
use crate::handler::EventHandler;
use crate::lookup::EventLookup;
use crate::system::EventSystem;

/// Verifies a compact signature as of an instant and returns the signed
/// payload bytes.
///
/// `event_type` is the type of the event carrying the signature, so a
/// verifier can restrict trust exceptions to the events that need them.
pub trait SignatureVerifier: Send + Sync {
    fn verify(
        &self,
        jws: &str,
        event_type: &EventType,
        at: DateTime<Utc>,
    ) -> CryptoResult<Vec<u8>>;
}

/// Verifier that accepts envelopes signed by one fixed key, ignoring any
/// embedded chain.
pub struct KeyVerifier {
    key: VerifyingKey,
}

impl KeyVerifier {
    pub fn new(key: VerifyingKey) -> Self {
        Self { key }
    }
}

impl SignatureVerifier for KeyVerifier {
    fn verify(&self, jws: &str, _: &EventType, _at: DateTime<Utc>) -> CryptoResult<Vec<u8>> {
        let envelope = hreg_crypto::CompactJws::parse(jws)?;
        envelope.verify_with(&self.key)?;
        Ok(envelope.payload)
    }
}

/// Handler that checks event signatures before any domain handler runs.
///
/// Unsigned events pass with a warning unless signatures are required. A
/// signature that fails to verify is a handler failure and therefore
/// retried: the signer's issuer may simply not be trusted yet.
pub struct SignatureValidator {
    verifier: Arc<dyn SignatureVerifier>,
    require_signatures: bool,
}

impl SignatureValidator {
    pub fn new(verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self {
            verifier,
            require_signatures: false,
        }
    }

    pub fn require_signatures(mut self, required: bool) -> Self {
        self.require_signatures = required;
        self
    }

    pub fn validate(&self, event: &Event) -> HandlerResult {
        let Some(jws) = event.signature() else {
            if self.require_signatures {
                return Err(HandlerError::Unsigned);
            }
            warn!(
                event_ref = %event.reference(),
                event_type = %event.event_type(),
                "accepting unsigned event"
            );
            return Ok(());
        };

        let at = event.issued_at().unwrap_or_else(Utc::now);
        self.verifier
            .verify(jws, event.event_type(), at)
            .map_err(HandlerError::Signature)?;
        debug!(event_ref = %event.reference(), "signature verified");
        Ok(())
    }

    /// Subscribe to every type the system supports. Register before any
    /// domain handler so signatures are checked first.
    pub fn register(self: Arc<Self>, system: &mut EventSystem) {
        let types = system.config().supported_types.clone();
        for event_type in types {
            system.register_event_handler(event_type, self.clone());
        }
    }
}

impl EventHandler for SignatureValidator {
    fn handle(&self, event: &Event, _lookup: &dyn EventLookup) -> HandlerResult {
        self.validate(event)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use chrono::{Duration, TimeZone};
    use serde_json::json;

    use hreg_crypto::{Certificate, CertificateBody, CryptoError, SigningKey};

    use super::*;
    use crate::lookup::LookupTable;

    struct Recording {
        calls: AtomicUsize,
        seen_at: Mutex<Option<DateTime<Utc>>>,
        seen_type: Mutex<Option<EventType>>,
        result: CryptoResult<Vec<u8>>,
    }

    impl Recording {
        fn returning(result: CryptoResult<Vec<u8>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                seen_at: Mutex::new(None),
                seen_type: Mutex::new(None),
                result,
            })
        }
    }

    impl SignatureVerifier for Recording {
        fn verify(
            &self,
            _jws: &str,
            event_type: &EventType,
            at: DateTime<Utc>,
        ) -> CryptoResult<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_at.lock().unwrap() = Some(at);
            *self.seen_type.lock().unwrap() = Some(event_type.clone());
            self.result.clone()
        }
    }

    fn unsigned() -> Event {
        Event::create(EventType::register_vendor(), &json!({"identifier": "v"}), None).unwrap()
    }

    fn signed(key: &SigningKey) -> Event {
        let now = Utc::now();
        let body = CertificateBody::new(
            "CN=Vendor",
            key.verifying_key(),
            now - Duration::days(1),
            now + Duration::days(1),
        );
        let cert = Certificate::self_signed(body, key).unwrap();
        let mut event = Event::create_at(
            EventType::register_vendor(),
            &json!({"identifier": "v"}),
            None,
            Utc.with_ymd_and_hms(2023, 2, 3, 4, 5, 6).unwrap(),
        )
        .unwrap();
        event.sign_with_key(key, vec![cert]).unwrap();
        event
    }

    #[test]
    fn unsigned_event_is_accepted_without_calling_verifier() {
        let verifier = Recording::returning(Err(CryptoError::InvalidSignature));
        let validator = SignatureValidator::new(verifier.clone());

        let table = LookupTable::new();
        validator.handle(&unsigned(), &table).unwrap();
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsigned_event_rejected_when_required() {
        let validator = SignatureValidator::new(Recording::returning(Ok(vec![])))
            .require_signatures(true);
        assert!(matches!(
            validator.validate(&unsigned()),
            Err(HandlerError::Unsigned)
        ));
    }

    #[test]
    fn verifier_sees_issued_at() {
        let key = SigningKey::generate();
        let event = signed(&key);
        let verifier = Recording::returning(Ok(b"{}".to_vec()));
        SignatureValidator::new(verifier.clone())
            .validate(&event)
            .unwrap();
        assert_eq!(*verifier.seen_at.lock().unwrap(), event.issued_at());
        assert_eq!(
            *verifier.seen_type.lock().unwrap(),
            Some(EventType::register_vendor())
        );
    }

    #[test]
    fn verification_failure_is_signature_error() {
        let key = SigningKey::generate();
        let validator =
            SignatureValidator::new(Recording::returning(Err(CryptoError::MissingCertificate)));
        assert!(matches!(
            validator.validate(&signed(&key)),
            Err(HandlerError::Signature(CryptoError::MissingCertificate))
        ));
    }

    #[test]
    fn key_verifier_checks_signer() {
        let key = SigningKey::generate();
        let event = signed(&key);

        let right = SignatureValidator::new(Arc::new(KeyVerifier::new(key.verifying_key())));
        right.validate(&event).unwrap();

        let other = SigningKey::generate();
        let wrong = SignatureValidator::new(Arc::new(KeyVerifier::new(other.verifying_key())));
        assert!(matches!(
            wrong.validate(&event),
            Err(HandlerError::Signature(CryptoError::InvalidSignature))
        ));
    }
}

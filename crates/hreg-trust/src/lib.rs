//! Trust store for the healthcare registry.
//!
//! The store learns vendor certificates from registration events and backs
//! signature verification for every event the engine processes.
//!
//! # Key Types
//!
//! - [`TrustStore`]: trusted certificates and chain building
//! - [`TrustHandler`]: promotes certificates carried by registration events
//! - [`TrustJwsVerifier`]: engine signature verifier backed by the store
//! - [`RegisterVendor`], [`VendorClaim`], [`RegisterEndpoint`]: payloads

pub mod error;
pub mod payload;
pub mod store;
pub mod verifier;

use std::sync::Arc;

use hreg_events::{EventSystem, SignatureValidator};

pub use error::{TrustError, TrustResult};
pub use payload::{check_vendor, RegisterEndpoint, RegisterVendor, VendorClaim};
pub use store::{Promotion, TrustHandler, TrustStore, MAX_CHAIN_DEPTH};
pub use verifier::TrustJwsVerifier;

/// Wire `store` into `system`: signature validation on every supported type,
/// followed by certificate promotion on registration types.
pub fn install(system: &mut EventSystem, store: &Arc<TrustStore>) {
    let require_signatures = system.config().require_signatures;
    let verifier = Arc::new(TrustJwsVerifier::new(Arc::clone(store)));
    Arc::new(SignatureValidator::new(verifier).require_signatures(require_signatures))
        .register(system);
    store.register_event_handlers(system);
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use hreg_crypto::{Certificate, CertificateBody, SigningKey};
    use hreg_events::{
        EngineConfig, Event, EventError, EventLookup, HandlerError, ProcessOutcome,
        SignatureVerifier,
    };
    use hreg_types::EventType;

    use super::*;

    struct Vendor {
        id: String,
        key: SigningKey,
        cert: Certificate,
    }

    impl Vendor {
        fn new(id: &str) -> Self {
            let key = SigningKey::generate();
            let now = Utc::now();
            let body = CertificateBody::new(
                format!("CN={id}"),
                key.verifying_key(),
                now - Duration::days(1),
                now + Duration::days(365),
            )
            .with_ca(true)
            .with_domain("healthcare")
            .with_vendor_id(id);
            let cert = Certificate::self_signed(body, &key).unwrap();
            Self {
                id: id.to_string(),
                key,
                cert,
            }
        }

        fn registration(&self) -> Event {
            let payload = RegisterVendor {
                identifier: self.id.clone(),
                name: format!("Vendor {}", self.id),
                certificates: vec![self.cert.clone()],
            };
            let mut event = Event::create(EventType::register_vendor(), &payload, None).unwrap();
            event.sign_with_key(&self.key, vec![self.cert.clone()]).unwrap();
            event
        }

        /// A claim signed by a fresh leaf issued under the vendor CA.
        fn claim(&self, organization: &str) -> Event {
            let leaf_key = SigningKey::generate();
            let now = Utc::now();
            let body = CertificateBody::new(
                format!("CN={} signer", self.id),
                leaf_key.verifying_key(),
                now - Duration::days(1),
                now + Duration::days(30),
            )
            .with_domain("healthcare")
            .with_vendor_id(self.id.clone());
            let leaf = Certificate::issue(body, &self.cert, &self.key).unwrap();
            let payload = VendorClaim {
                identifier: self.id.clone(),
                organization_id: organization.to_string(),
                certificates: vec![],
            };
            let mut event = Event::create(EventType::vendor_claim(), &payload, None).unwrap();
            event
                .sign_with_key(&leaf_key, vec![leaf, self.cert.clone()])
                .unwrap();
            event
        }
    }

    fn system(require_signatures: bool) -> (tempfile::TempDir, EventSystem, Arc<TrustStore>) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::with_data_dir(dir.path());
        config.require_signatures = require_signatures;
        let mut system = EventSystem::new(config);
        let store = Arc::new(TrustStore::with_domain("healthcare"));
        install(&mut system, &store);
        (dir, system, store)
    }

    #[test]
    fn two_self_signed_registrations_add_two_roots() {
        let (_dir, mut system, store) = system(true);
        let a = Vendor::new("urn:vendor:a");
        let b = Vendor::new("urn:vendor:b");

        assert_eq!(
            system.process_event(a.registration()).unwrap(),
            ProcessOutcome::Committed
        );
        assert_eq!(
            system.process_event(b.registration()).unwrap(),
            ProcessOutcome::Committed
        );

        assert_eq!(
            store.root_subjects(),
            vec!["CN=urn:vendor:a".to_string(), "CN=urn:vendor:b".to_string()]
        );
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn claim_before_registration_is_retried() {
        let (_dir, mut system, _store) = system(true);
        let vendor = Vendor::new("urn:vendor:a");
        let claim = vendor.claim("urn:org:1");

        let err = system.process_event(claim.clone()).unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            EventError::Handler {
                source: HandlerError::Signature(_),
                ..
            }
        ));

        system.process_event(vendor.registration()).unwrap();
        assert!(system.lookup().get(&claim.reference()).is_some());
        assert_eq!(system.deferred_count(), 0);

        let decoded = VendorClaim::from_event(&claim).unwrap();
        assert_eq!(decoded.organization_id, "urn:org:1");
    }

    #[test]
    fn required_signatures_reject_unsigned_registration() {
        let (_dir, mut system, store) = system(true);
        let payload = RegisterVendor {
            identifier: "urn:vendor:x".into(),
            name: "Unsigned".into(),
            certificates: vec![],
        };
        let event = Event::create(EventType::register_vendor(), &payload, None).unwrap();
        assert!(matches!(
            system.process_event(event),
            Err(EventError::Handler {
                source: HandlerError::Unsigned,
                ..
            })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn legacy_mode_promotes_certificates_from_unsigned_registration() {
        let (_dir, mut system, store) = system(false);
        let vendor = Vendor::new("urn:vendor:legacy");
        let payload = RegisterVendor {
            identifier: vendor.id.clone(),
            name: "Legacy".into(),
            certificates: vec![vendor.cert.clone()],
        };
        let event = Event::create(EventType::register_vendor(), &payload, None).unwrap();
        system.process_event(event).unwrap();
        assert!(store.is_trusted(&vendor.cert));
    }

    #[test]
    fn signature_by_unknown_self_signed_key_is_not_enough() {
        let (_dir, mut system, store) = system(true);
        let vendor = Vendor::new("urn:vendor:a");
        // Signed by the vendor key, but the payload does not declare the cert.
        let payload = RegisterVendor {
            identifier: vendor.id.clone(),
            name: "No certs".into(),
            certificates: vec![],
        };
        let mut event = Event::create(EventType::register_vendor(), &payload, None).unwrap();
        event
            .sign_with_key(&vendor.key, vec![vendor.cert.clone()])
            .unwrap();

        assert!(system.process_event(event).is_err());
        assert!(store.is_empty());
    }

    /// A claim from an unregistered vendor that lists and signs with its own
    /// self-signed CA.
    fn self_signed_claim(vendor: &Vendor) -> Event {
        let payload = VendorClaim {
            identifier: vendor.id.clone(),
            organization_id: "urn:org:victim".into(),
            certificates: vec![vendor.cert.clone()],
        };
        let mut event = Event::create(EventType::vendor_claim(), &payload, None).unwrap();
        event
            .sign_with_key(&vendor.key, vec![vendor.cert.clone()])
            .unwrap();
        event
    }

    #[test]
    fn self_signed_claim_cannot_introduce_a_root() {
        let (_dir, mut system, store) = system(true);
        let intruder = Vendor::new("urn:vendor:intruder");

        let err = system.process_event(self_signed_claim(&intruder)).unwrap_err();
        assert!(matches!(
            err,
            EventError::Handler {
                source: HandlerError::Signature(_),
                ..
            }
        ));
        assert!(store.is_empty());
        assert!(store.root_subjects().is_empty());
    }

    #[test]
    fn unsigned_claim_cannot_introduce_a_root() {
        let (_dir, mut system, store) = system(false);
        let intruder = Vendor::new("urn:vendor:intruder");
        let payload = VendorClaim {
            identifier: intruder.id.clone(),
            organization_id: "urn:org:victim".into(),
            certificates: vec![intruder.cert.clone()],
        };
        let event = Event::create(EventType::vendor_claim(), &payload, None).unwrap();

        let err = system.process_event(event).unwrap_err();
        assert!(matches!(
            err,
            EventError::Handler {
                source: HandlerError::Rejected(_),
                ..
            }
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn registered_vendor_may_repeat_its_root_in_a_claim() {
        let (_dir, mut system, store) = system(true);
        let vendor = Vendor::new("urn:vendor:a");
        system.process_event(vendor.registration()).unwrap();

        let claim = self_signed_claim(&vendor);
        assert_eq!(system.process_event(claim).unwrap(), ProcessOutcome::Committed);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn trust_verifier_limits_self_signing_to_registrations() {
        let store = Arc::new(TrustStore::new());
        let verifier = TrustJwsVerifier::new(Arc::clone(&store));
        let vendor = Vendor::new("urn:vendor:a");

        let registration = vendor.registration();
        verifier
            .verify(
                registration.signature().unwrap(),
                registration.event_type(),
                Utc::now(),
            )
            .unwrap();

        let claim = self_signed_claim(&vendor);
        assert!(verifier
            .verify(claim.signature().unwrap(), claim.event_type(), Utc::now())
            .is_err());
    }

    #[test]
    fn verifier_returns_signed_payload() {
        let store = Arc::new(TrustStore::new());
        let vendor = Vendor::new("urn:vendor:a");
        store.add_certificate(vendor.cert.clone()).unwrap();
        let verifier = TrustJwsVerifier::new(Arc::clone(&store));

        let claim = vendor.claim("urn:org:1");
        let payload = verifier
            .verify(claim.signature().unwrap(), claim.event_type(), Utc::now())
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["organizationId"], "urn:org:1");
    }
}

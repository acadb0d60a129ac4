//! Trusted certificate set and chain building.
//!
//! The store starts empty. Certificates enter it only through
//! [`TrustStore::add_certificate`], which accepts self-signed certificates as
//! roots and others once they chain to something already trusted. Vendor
//! registration events feed it through [`TrustHandler`].

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use hreg_crypto::{Certificate, CryptoError, CryptoResult};
use hreg_events::{Event, EventHandler, EventLookup, EventSystem, HandlerError, HandlerResult};
use hreg_types::EventType;

use crate::error::TrustResult;
use crate::payload::{RegisterVendor, VendorClaim};

/// Longest chain, leaf included, the store will build.
pub const MAX_CHAIN_DEPTH: usize = 8;

/// How a certificate entered the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Promotion {
    /// Self-signed; now a trust root.
    Root,
    /// Chained to an already trusted certificate.
    Issued,
    /// Already trusted; nothing changed.
    AlreadyTrusted,
}

#[derive(Debug, Default)]
struct TrustState {
    /// Trusted certificates keyed by fingerprint.
    trusted: HashMap<String, Certificate>,
}

/// Set of trusted certificates shared by the signature verifier and the
/// registration handlers.
#[derive(Debug, Default)]
pub struct TrustStore {
    state: RwLock<TrustState>,
    domain: Option<String>,
}

impl TrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that expects every certificate in a verified chain to carry
    /// `domain` as its domain tag.
    pub fn with_domain(domain: impl Into<String>) -> Self {
        Self {
            state: RwLock::default(),
            domain: Some(domain.into()),
        }
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn len(&self) -> usize {
        self.read().trusted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().trusted.is_empty()
    }

    pub fn is_trusted(&self, cert: &Certificate) -> bool {
        cert.fingerprint()
            .map(|fp| self.read().trusted.contains_key(&fp))
            .unwrap_or(false)
    }

    /// Subjects of trusted self-signed certificates, sorted and deduplicated.
    pub fn root_subjects(&self) -> Vec<String> {
        let mut subjects: Vec<String> = self
            .read()
            .trusted
            .values()
            .filter(|c| c.is_self_signed())
            .map(|c| c.subject().to_string())
            .collect();
        subjects.sort();
        subjects.dedup();
        subjects
    }

    /// Add `cert` as of now.
    pub fn add_certificate(&self, cert: Certificate) -> TrustResult<Promotion> {
        self.add_certificate_at(cert, Utc::now())
    }

    /// Add `cert` if it is self-signed or chains to a trusted certificate
    /// at `at`.
    pub fn add_certificate_at(&self, cert: Certificate, at: DateTime<Utc>) -> TrustResult<Promotion> {
        let fingerprint = cert.fingerprint()?;
        if self.read().trusted.contains_key(&fingerprint) {
            return Ok(Promotion::AlreadyTrusted);
        }
        if !cert.is_valid_at(at) {
            return Err(CryptoError::CertificateNotValidAt {
                subject: cert.subject().to_string(),
                at,
            }
            .into());
        }

        let promotion = if cert.is_self_signed() {
            Promotion::Root
        } else {
            self.verify(&cert, at)?;
            Promotion::Issued
        };

        info!(
            subject = cert.subject(),
            issuer = cert.issuer(),
            %fingerprint,
            ?promotion,
            "certificate trusted"
        );
        self.write().trusted.insert(fingerprint, cert);
        Ok(promotion)
    }

    /// Build a chain from `cert` to a trusted certificate, valid at `at`.
    pub fn verify(&self, cert: &Certificate, at: DateTime<Utc>) -> CryptoResult<Vec<Certificate>> {
        self.verify_chain(std::slice::from_ref(cert), at)
    }

    /// Build a chain from the leaf `chain[0]` to a trusted certificate,
    /// using trusted certificates and the rest of `chain` as intermediates.
    ///
    /// Returns the path, leaf first, ending at the first trusted
    /// certificate.
    pub fn verify_chain(&self, chain: &[Certificate], at: DateTime<Utc>) -> CryptoResult<Vec<Certificate>> {
        let leaf = chain.first().ok_or(CryptoError::MissingCertificate)?;
        let path = {
            let state = self.read();
            let mut path = vec![leaf.clone()];
            loop {
                let current = &path[path.len() - 1];
                if !current.is_valid_at(at) {
                    return Err(CryptoError::CertificateNotValidAt {
                        subject: current.subject().to_string(),
                        at,
                    });
                }
                if state.trusted.contains_key(&current.fingerprint()?) {
                    break;
                }
                if path.len() >= MAX_CHAIN_DEPTH {
                    return Err(CryptoError::ChainTooLong {
                        max: MAX_CHAIN_DEPTH,
                    });
                }
                let issuer = state
                    .trusted
                    .values()
                    .chain(chain.iter().skip(1))
                    .filter(|c| *c != current && c.subject() == current.issuer())
                    .find(|c| c.body.is_ca && current.verify_signed_by(c).is_ok())
                    .cloned()
                    .ok_or_else(|| CryptoError::UntrustedChain {
                        subject: current.subject().to_string(),
                    })?;
                path.push(issuer);
            }
            path
        };

        self.check_domain(&path);
        debug!(leaf = leaf.subject(), depth = path.len(), "certificate chain verified");
        Ok(path)
    }

    /// Warn about certificates whose domain tag differs from the store's
    /// expected domain, or from the leaf's when none is configured.
    /// Returns the number of offending certificates.
    pub fn check_domain(&self, path: &[Certificate]) -> usize {
        let expected = self
            .domain
            .as_deref()
            .or_else(|| path.first().and_then(Certificate::domain));
        let Some(expected) = expected else {
            warn!(
                leaf = path.first().map(Certificate::subject),
                "certificate chain carries no domain tag"
            );
            return path.len();
        };

        let mut mismatches = 0;
        for cert in path {
            if cert.domain() != Some(expected) {
                warn!(
                    subject = cert.subject(),
                    expected,
                    found = ?cert.domain(),
                    "certificate domain tag mismatch"
                );
                mismatches += 1;
            }
        }
        mismatches
    }

    /// Bind the registration handler to vendor registration and claim events.
    pub fn register_event_handlers(self: &Arc<Self>, system: &mut EventSystem) {
        let handler: Arc<dyn EventHandler> = Arc::new(TrustHandler::new(Arc::clone(self)));
        for event_type in [EventType::register_vendor(), EventType::vendor_claim()] {
            system.register_event_handler(event_type, Arc::clone(&handler));
        }
    }

    // A panic cannot leave the map half-updated, so a poisoned lock is
    // still safe to use.
    fn read(&self) -> RwLockReadGuard<'_, TrustState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TrustState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Promotes certificates carried by vendor registration and claim events.
///
/// A certificate that neither is self-signed nor chains to the store fails
/// the event; it is retried once the issuer has been registered. Only a
/// registration may introduce a new self-signed root.
pub struct TrustHandler {
    store: Arc<TrustStore>,
}

impl TrustHandler {
    pub fn new(store: Arc<TrustStore>) -> Self {
        Self { store }
    }
}

impl EventHandler for TrustHandler {
    fn handle(&self, event: &Event, _lookup: &dyn EventLookup) -> HandlerResult {
        let (certificates, may_add_roots) = match event.event_type().as_str() {
            EventType::REGISTER_VENDOR => (RegisterVendor::from_event(event)?.certificates, true),
            EventType::VENDOR_CLAIM => (VendorClaim::from_event(event)?.certificates, false),
            _ => return Ok(()),
        };

        let at = event.issued_at().unwrap_or_else(Utc::now);
        for cert in certificates {
            let subject = cert.subject().to_string();
            if !may_add_roots && cert.is_self_signed() && !self.store.is_trusted(&cert) {
                return Err(HandlerError::Rejected(format!(
                    "certificate {subject:?}: self-signed root outside a vendor registration"
                )));
            }
            self.store
                .add_certificate_at(cert, at)
                .map_err(|e| HandlerError::Rejected(format!("certificate {subject:?}: {e}")))?;
        }
        Ok(())
    }
}

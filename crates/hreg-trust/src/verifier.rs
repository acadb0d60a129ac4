use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use hreg_crypto::{Certificate, CompactJws, CryptoError, CryptoResult};
use hreg_events::SignatureVerifier;
use hreg_types::EventType;

use crate::store::TrustStore;

/// Verifies compact JWS envelopes against the trust store.
///
/// The signer chain travels in the JWS header. The leaf must chain to a
/// trusted certificate at the signing instant, with one exception: on a
/// vendor registration, a self-signed leaf that the signed payload itself
/// lists under `certificates` is accepted, so a vendor can sign its own
/// registration. Every other event type needs a trusted chain.
pub struct TrustJwsVerifier {
    store: Arc<TrustStore>,
}

#[derive(Deserialize)]
struct DeclaredCertificates {
    #[serde(default)]
    certificates: Vec<Certificate>,
}

impl TrustJwsVerifier {
    pub fn new(store: Arc<TrustStore>) -> Self {
        Self { store }
    }

    fn is_self_registration(leaf: &Certificate, payload: &[u8], at: DateTime<Utc>) -> bool {
        if !leaf.is_self_signed() || !leaf.is_valid_at(at) {
            return false;
        }
        serde_json::from_slice::<DeclaredCertificates>(payload)
            .map(|declared| declared.certificates.contains(leaf))
            .unwrap_or(false)
    }
}

impl SignatureVerifier for TrustJwsVerifier {
    fn verify(
        &self,
        jws: &str,
        event_type: &EventType,
        at: DateTime<Utc>,
    ) -> CryptoResult<Vec<u8>> {
        let envelope = CompactJws::parse(jws)?;
        envelope.verify_with_leaf()?;

        match self.store.verify_chain(&envelope.header.chain, at) {
            Ok(_) => {}
            Err(CryptoError::UntrustedChain { subject })
                if event_type.as_str() == EventType::REGISTER_VENDOR
                    && envelope
                    .header
                    .leaf()
                    .is_some_and(|leaf| Self::is_self_registration(leaf, &envelope.payload, at)) =>
            {
                debug!(%subject, %event_type, "accepting self-signed registration");
            }
            Err(e) => return Err(e),
        }
        Ok(envelope.payload)
    }
}

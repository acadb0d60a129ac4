//! Minimal certificate model used for event signing.
//!
//! A [`Certificate`] binds an Ed25519 public key to a subject name. The
//! issuer signs the canonical JSON of the [`CertificateBody`]; a certificate
//! whose issuer equals its subject and whose signature verifies under its own
//! key is self-signed and may act as a trust root.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::canonical::canonical_bytes;
use crate::error::{CryptoError, CryptoResult};
use crate::hasher::ContentHasher;
use crate::signer::{Signature, SigningKey, VerifyingKey};

/// The signed portion of a certificate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateBody {
    pub serial: u64,
    pub subject: String,
    pub issuer: String,
    pub public_key: VerifyingKey,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    #[serde(default)]
    pub is_ca: bool,
    /// Advisory label naming the operational domain, e.g. `healthcare`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Vendor identifier the certificate was issued to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,
}

impl CertificateBody {
    /// A body whose issuer is its own subject.
    pub fn new(
        subject: impl Into<String>,
        public_key: VerifyingKey,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> Self {
        let subject = subject.into();
        Self {
            serial: rand::random(),
            issuer: subject.clone(),
            subject,
            public_key,
            not_before,
            not_after,
            is_ca: false,
            domain: None,
            vendor_id: None,
        }
    }

    pub fn with_ca(mut self, is_ca: bool) -> Self {
        self.is_ca = is_ca;
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_vendor_id(mut self, vendor_id: impl Into<String>) -> Self {
        self.vendor_id = Some(vendor_id.into());
        self
    }

    /// The bytes covered by the issuer's signature.
    pub fn to_be_signed(&self) -> CryptoResult<Vec<u8>> {
        let value =
            serde_json::to_value(self).map_err(|e| CryptoError::Serialization(e.to_string()))?;
        Ok(canonical_bytes(&value))
    }
}

/// A signed certificate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    #[serde(flatten)]
    pub body: CertificateBody,
    pub signature: Signature,
}

impl Certificate {
    /// Sign `body` with its own key. The key must match `body.public_key`.
    pub fn self_signed(mut body: CertificateBody, key: &SigningKey) -> CryptoResult<Self> {
        if key.verifying_key() != body.public_key {
            return Err(CryptoError::InvalidKey);
        }
        body.issuer = body.subject.clone();
        let signature = key.sign(&body.to_be_signed()?);
        Ok(Self { body, signature })
    }

    /// Issue `body` under `issuer`, signing with the issuer's key.
    pub fn issue(
        mut body: CertificateBody,
        issuer: &Certificate,
        issuer_key: &SigningKey,
    ) -> CryptoResult<Self> {
        if !issuer.body.is_ca {
            return Err(CryptoError::NotCertificateAuthority {
                subject: issuer.subject().to_string(),
            });
        }
        if issuer_key.verifying_key() != issuer.body.public_key {
            return Err(CryptoError::InvalidKey);
        }
        body.issuer = issuer.body.subject.clone();
        let signature = issuer_key.sign(&body.to_be_signed()?);
        Ok(Self { body, signature })
    }

    pub fn subject(&self) -> &str {
        &self.body.subject
    }

    pub fn issuer(&self) -> &str {
        &self.body.issuer
    }

    pub fn public_key(&self) -> &VerifyingKey {
        &self.body.public_key
    }

    pub fn domain(&self) -> Option<&str> {
        self.body.domain.as_deref()
    }

    pub fn vendor_id(&self) -> Option<&str> {
        self.body.vendor_id.as_deref()
    }

    /// Returns `true` if `at` lies inside the validity window.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.body.not_before <= at && at <= self.body.not_after
    }

    /// Returns `true` if the certificate names itself as issuer and its
    /// signature verifies under its own key.
    pub fn is_self_signed(&self) -> bool {
        self.body.issuer == self.body.subject && self.verify_signed_by(self).is_ok()
    }

    /// Check that `issuer` names and signed this certificate.
    pub fn verify_signed_by(&self, issuer: &Certificate) -> CryptoResult<()> {
        if self.body.issuer != issuer.body.subject {
            return Err(CryptoError::IssuerMismatch {
                subject: self.body.subject.clone(),
                issuer: issuer.body.subject.clone(),
            });
        }
        issuer
            .body
            .public_key
            .verify(&self.body.to_be_signed()?, &self.signature)
    }

    /// Stable hex fingerprint over the full certificate.
    pub fn fingerprint(&self) -> CryptoResult<String> {
        let value =
            serde_json::to_value(self).map_err(|e| CryptoError::Serialization(e.to_string()))?;
        Ok(ContentHasher::CERTIFICATE.hash_canonical(&value).to_hex())
    }
}

use hreg_types::EventRef;
use serde_json::Value;

use crate::canonical::canonical_bytes;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation, so an event reference and a certificate fingerprint over the
/// same bytes never collide.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for event references.
    pub const EVENT: Self = Self {
        domain: "hreg-event-v1",
    };
    /// Hasher for certificate fingerprints.
    pub const CERTIFICATE: Self = Self {
        domain: "hreg-certificate-v1",
    };

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> EventRef {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        EventRef::from_hash(*hasher.finalize().as_bytes())
    }

    /// Hash the canonical JSON form of a value.
    ///
    /// Key order and whitespace of the source never affect the result.
    pub fn hash_canonical(&self, value: &Value) -> EventRef {
        self.hash(&canonical_bytes(value))
    }
}

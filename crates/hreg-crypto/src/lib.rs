//! Cryptographic primitives for the healthcare registry.
//!
//! Provides RFC 8785 style canonical JSON, domain-separated BLAKE3 hashing
//! for event references, Ed25519 signing/verification, a minimal certificate
//! model, and compact JWS envelopes that carry the signer's certificate chain.
//!
//! Primitives come from `blake3` and `ed25519-dalek`; this crate only frames them.

pub mod canonical;
pub mod certificate;
pub mod error;
pub mod hasher;
pub mod jws;
pub mod signer;

pub use canonical::{canonical_bytes, canonicalize_json};
pub use certificate::{Certificate, CertificateBody};
pub use error::{CryptoError, CryptoResult};
pub use hasher::ContentHasher;
pub use jws::{CompactJws, JwsHeader};
pub use signer::{Signature, SigningKey, VerifyingKey};

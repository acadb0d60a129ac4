//! Compact JWS envelopes (`header.payload.signature`, base64url, no padding).
//!
//! The protected header names the algorithm (`EdDSA`) and carries the signer
//! certificate chain, leaf first. Verification checks the signature against
//! the leaf key; deciding whether the leaf is trusted is the caller's job.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::certificate::Certificate;
use crate::error::{CryptoError, CryptoResult};
use crate::signer::{Signature, SigningKey, VerifyingKey};

/// The only supported algorithm.
pub const ALGORITHM: &str = "EdDSA";

/// Protected JWS header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwsHeader {
    pub alg: String,
    /// Signer certificate chain, leaf first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chain: Vec<Certificate>,
}

impl JwsHeader {
    /// The signing certificate, if the header carries one.
    pub fn leaf(&self) -> Option<&Certificate> {
        self.chain.first()
    }
}

/// A decoded, not yet verified, compact JWS.
#[derive(Clone, Debug)]
pub struct CompactJws {
    pub header: JwsHeader,
    pub payload: Vec<u8>,
    signing_input: String,
    signature: Signature,
}

/// Sign `payload`, embedding `chain` in the protected header.
pub fn sign(payload: &[u8], key: &SigningKey, chain: Vec<Certificate>) -> CryptoResult<String> {
    let header = JwsHeader {
        alg: ALGORITHM.to_string(),
        chain,
    };
    let header_json =
        serde_json::to_vec(&header).map_err(|e| CryptoError::Serialization(e.to_string()))?;
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header_json),
        URL_SAFE_NO_PAD.encode(payload)
    );
    let signature = key.sign(signing_input.as_bytes());
    Ok(format!(
        "{signing_input}.{}",
        URL_SAFE_NO_PAD.encode(signature.to_bytes())
    ))
}

/// Decode the payload segment without verifying anything.
///
/// Only use on envelopes that have already passed [`CompactJws::verify_with`].
pub fn payload_of(compact: &str) -> CryptoResult<Vec<u8>> {
    let (_, payload, _) = split(compact)?;
    decode_segment(payload, "payload")
}

impl CompactJws {
    /// Decode the three segments and the header.
    pub fn parse(compact: &str) -> CryptoResult<Self> {
        let (header_b64, payload_b64, sig_b64) = split(compact)?;

        let header_bytes = decode_segment(header_b64, "header")?;
        let header: JwsHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| CryptoError::MalformedJws(format!("header: {e}")))?;
        if header.alg != ALGORITHM {
            return Err(CryptoError::UnsupportedAlgorithm(header.alg));
        }

        let payload = decode_segment(payload_b64, "payload")?;
        let signature = Signature::from_slice(&decode_segment(sig_b64, "signature")?)?;

        Ok(Self {
            header,
            payload,
            signing_input: format!("{header_b64}.{payload_b64}"),
            signature,
        })
    }

    /// Verify the envelope signature under `key`.
    pub fn verify_with(&self, key: &VerifyingKey) -> CryptoResult<()> {
        key.verify(self.signing_input.as_bytes(), &self.signature)
    }

    /// Verify under the leaf certificate's key and return the payload.
    pub fn verify_with_leaf(&self) -> CryptoResult<&[u8]> {
        let leaf = self.header.leaf().ok_or(CryptoError::MissingCertificate)?;
        self.verify_with(leaf.public_key())?;
        Ok(&self.payload)
    }
}

fn split(compact: &str) -> CryptoResult<(&str, &str, &str)> {
    let mut parts = compact.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s), None) => Ok((h, p, s)),
        _ => Err(CryptoError::MalformedJws(
            "expected three dot-separated segments".into(),
        )),
    }
}

fn decode_segment(segment: &str, name: &str) -> CryptoResult<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| CryptoError::MalformedJws(format!("{name}: {e}")))
}

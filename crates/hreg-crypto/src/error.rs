use chrono::{DateTime, Utc};

/// Errors from hashing, signing, certificate, and JWS operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid key")]
    InvalidKey,

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("malformed JWS: {0}")]
    MalformedJws(String),

    #[error("unsupported JWS algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("JWS carries no signer certificate")]
    MissingCertificate,

    #[error("certificate {subject:?} is not valid at {at}")]
    CertificateNotValidAt { subject: String, at: DateTime<Utc> },

    #[error("certificate {subject:?} was not issued by {issuer:?}")]
    IssuerMismatch { subject: String, issuer: String },

    #[error("certificate {subject:?} is not a CA and cannot issue")]
    NotCertificateAuthority { subject: String },

    #[error("certificate {subject:?} does not chain to a trusted root")]
    UntrustedChain { subject: String },

    #[error("certificate chain longer than {max} links")]
    ChainTooLong { max: usize },
}

/// Result alias for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

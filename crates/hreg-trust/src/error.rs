use hreg_crypto::CryptoError;

/// Errors raised by the trust store and registry payload checks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrustError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("vendor id mismatch: payload declares {declared:?}, certificate {subject:?} names {certificate:?}")]
    VendorMismatch {
        declared: String,
        subject: String,
        certificate: String,
    },
}

pub type TrustResult<T> = Result<T, TrustError>;

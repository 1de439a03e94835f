use crypto_utils::CryptoError;
use thiserror::Error;

/// Bitcoin-family codec, script and transaction errors.
#[derive(Debug, Error)]
pub enum BtcError {
    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("unknown address type: {0}")]
    UnknownAddressType(String),

    #[error("address collision: {0}")]
    AddressCollision(String),

    #[error("invalid witness version: {0}")]
    InvalidWitnessVersion(u8),

    #[error("invalid witness program length: {0}")]
    InvalidWitnessProgramLength(usize),

    #[error("invalid address format: {0}")]
    InvalidFormat(String),

    #[error("unsupported script: {0}")]
    UnsupportedScript(String),

    #[error("invalid script: {0}")]
    InvalidScript(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("structural check failed: {0}")]
    StructuralInvalid(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("signing error: {0}")]
    SigningError(String),
}

impl From<CryptoError> for BtcError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidPublicKey(msg) => BtcError::InvalidPublicKey(msg),
            other => BtcError::SigningError(other.to_string()),
        }
    }
}

use chain_btc::error::BtcError;
use thiserror::Error;

/// Zcash transaction format errors.
#[derive(Debug, Error)]
pub enum ZecError {
    #[error("decode error: {0}")]
    Decode(String),

    #[error("unsupported transaction version: {0}")]
    UnsupportedVersion(u32),

    #[error("structural check failed: {0}")]
    StructuralInvalid(String),

    #[error("signing error: {0}")]
    SigningError(String),

    #[error("transparent error: {0}")]
    Transparent(BtcError),
}

impl From<BtcError> for ZecError {
    fn from(e: BtcError) -> Self {
        match e {
            BtcError::Decode(msg) => ZecError::Decode(msg),
            BtcError::StructuralInvalid(msg) => ZecError::StructuralInvalid(msg),
            BtcError::SigningError(msg) => ZecError::SigningError(msg),
            other => ZecError::Transparent(other),
        }
    }
}

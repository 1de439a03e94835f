use chain_btc::error::BtcError;
use chain_zec::error::ZecError;
use crypto_utils::error::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Chain error: {0}")]
    Chain(BtcError),

    #[error("Zcash error: {0}")]
    Zcash(ZecError),

    #[error("Crypto error: {0}")]
    Crypto(CryptoError),

    #[error("Amount is dust")]
    DustAmount,

    #[error("Insufficient funds: needed {needed}, available {available}")]
    InsufficientFunds { needed: i64, available: i64 },

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Transaction already confirmed: {0}")]
    AlreadyConfirmed(String),

    #[error("Transaction is dead: {0}")]
    TransactionDead(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Currency not tracked: {0}")]
    NotTracked(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Escrow error: {0}")]
    Escrow(String),

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Key derivation failed: {0}")]
    DerivationFailed(String),
}

impl WalletError {
    /// True for context-free transaction rule violations from either chain
    /// crate.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            WalletError::Chain(BtcError::StructuralInvalid(_))
                | WalletError::Zcash(ZecError::StructuralInvalid(_))
                | WalletError::Zcash(ZecError::Transparent(BtcError::StructuralInvalid(_)))
        )
    }
}

impl From<BtcError> for WalletError {
    fn from(e: BtcError) -> Self {
        WalletError::Chain(e)
    }
}

impl From<ZecError> for WalletError {
    fn from(e: ZecError) -> Self {
        WalletError::Zcash(e)
    }
}

impl From<CryptoError> for WalletError {
    fn from(e: CryptoError) -> Self {
        WalletError::Crypto(e)
    }
}

impl From<bip32::Error> for WalletError {
    fn from(e: bip32::Error) -> Self {
        WalletError::DerivationFailed(e.to_string())
    }
}

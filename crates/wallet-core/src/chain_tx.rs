//! Per-chain transaction format selection.
//!
//! Bitcoin and Litecoin use the legacy wire format and signature hash; Zcash
//! uses Sapling v4 with the BLAKE2b personalized signature hash. Everything
//! above this module works on the transparent [`Transaction`] model and only
//! crosses into the chain-specific form to serialize, hash and sign.

use chain_btc::sighash::{legacy_signature_hash, SigHashType};
use chain_btc::transaction::{Transaction, TxOut};
use chain_btc::validation::check_transaction_sanity;
use chain_zec::sighash::signature_hash as sapling_signature_hash;
use chain_zec::transaction::ZecTransaction;
use chain_zec::validation::check_transaction_sanity as check_sapling_sanity;

use crate::error::WalletError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxFormat {
    Legacy,
    Sapling { branch_id: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainTx {
    Legacy(Transaction),
    Sapling(ZecTransaction),
}

impl TxFormat {
    /// Version for freshly built transactions. Sapling rewrites it to 4 when
    /// wrapping.
    pub fn default_version(&self) -> i32 {
        match self {
            TxFormat::Legacy => 1,
            TxFormat::Sapling { .. } => chain_zec::network::SAPLING_TX_VERSION as i32,
        }
    }

    pub fn decode(&self, raw: &[u8]) -> Result<ChainTx, WalletError> {
        match self {
            TxFormat::Legacy => Ok(ChainTx::Legacy(Transaction::deserialize(raw)?)),
            TxFormat::Sapling { .. } => Ok(ChainTx::Sapling(ZecTransaction::deserialize(raw)?)),
        }
    }

    /// Wrap a transparent transaction in this format. Zcash transactions are
    /// built without an expiry.
    pub fn wrap(&self, tx: Transaction) -> ChainTx {
        match self {
            TxFormat::Legacy => ChainTx::Legacy(tx),
            TxFormat::Sapling { .. } => ChainTx::Sapling(ZecTransaction::from_transparent(tx, 0)),
        }
    }

    /// Signature hash of one input. `amount` is the value of the spent
    /// output; the legacy algorithm does not commit to it.
    pub fn signature_hash(
        &self,
        tx: &ChainTx,
        input_index: usize,
        prev_script: &[u8],
        hash_type: SigHashType,
        amount: i64,
    ) -> Result<[u8; 32], WalletError> {
        match (self, tx) {
            (TxFormat::Legacy, ChainTx::Legacy(t)) => {
                Ok(legacy_signature_hash(t, input_index, prev_script, hash_type)?)
            }
            (TxFormat::Sapling { branch_id }, ChainTx::Sapling(z)) => {
                let amount = u64::try_from(amount).map_err(|_| {
                    WalletError::Zcash(chain_zec::error::ZecError::SigningError(format!(
                        "negative input amount {amount}"
                    )))
                })?;
                Ok(sapling_signature_hash(
                    z,
                    input_index,
                    prev_script,
                    hash_type,
                    amount,
                    *branch_id,
                )?)
            }
            _ => Err(WalletError::Chain(chain_btc::error::BtcError::SigningError(
                "transaction does not match the chain format".into(),
            ))),
        }
    }
}

impl ChainTx {
    pub fn transparent(&self) -> &Transaction {
        match self {
            ChainTx::Legacy(t) => t,
            ChainTx::Sapling(z) => &z.transparent,
        }
    }

    pub fn transparent_mut(&mut self) -> &mut Transaction {
        match self {
            ChainTx::Legacy(t) => t,
            ChainTx::Sapling(z) => &mut z.transparent,
        }
    }

    pub fn inputs_len(&self) -> usize {
        self.transparent().inputs.len()
    }

    pub fn outputs(&self) -> &[TxOut] {
        &self.transparent().outputs
    }

    /// Txid in internal byte order. Sapling txids hash the full v4 encoding.
    pub fn txid(&self) -> [u8; 32] {
        match self {
            ChainTx::Legacy(t) => t.txid(),
            ChainTx::Sapling(z) => z.txid(),
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        match self {
            ChainTx::Legacy(t) => t.serialize(),
            ChainTx::Sapling(z) => z.serialize(),
        }
    }

    /// Context-free structural rules for the transaction's format.
    pub fn check_sanity(&self) -> Result<(), WalletError> {
        match self {
            ChainTx::Legacy(t) => Ok(check_transaction_sanity(t)?),
            ChainTx::Sapling(z) => Ok(check_sapling_sanity(z)?),
        }
    }

    pub fn nullifiers(&self) -> &[[u8; 32]] {
        match self {
            ChainTx::Legacy(_) => &[],
            ChainTx::Sapling(z) => &z.nullifiers,
        }
    }
}

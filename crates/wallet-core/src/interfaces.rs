//! Seams to the collaborators the wallet engine does not own: key storage,
//! the chain backend, exchange rates.

use std::collections::HashMap;

use async_trait::async_trait;
use chain_btc::address::Address;
use chain_btc::network::NetworkParams;
use chain_btc::script::p2pkh_script;
use crypto_utils::ecdsa::PrivateKey;
use crypto_utils::hash::hash160;
use tokio::sync::mpsc;

use crate::error::WalletError;
use crate::types::KeyPurpose;

// ─── Keys ───────────────────────────────────────────────────────────

/// A wallet key. Watch keys carry no private half.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub purpose: KeyPurpose,
    /// Child index on the purpose branch; `None` for imported keys.
    pub index: Option<u32>,
    pub public_key: [u8; 33],
    pub private_key: Option<PrivateKey>,
}

impl Key {
    pub fn pubkey_hash(&self) -> [u8; 20] {
        hash160(&self.public_key)
    }

    /// P2PKH address of the key.
    pub fn address(&self, params: &NetworkParams) -> Address {
        Address::p2pkh(self.pubkey_hash(), params)
    }

    pub fn script_pubkey(&self) -> Vec<u8> {
        p2pkh_script(&self.pubkey_hash())
    }

    pub fn signing_key(&self) -> Result<&PrivateKey, WalletError> {
        self.private_key
            .as_ref()
            .ok_or_else(|| WalletError::KeyNotFound(hex::encode(self.public_key)))
    }
}

pub trait KeyManager: Send + Sync {
    /// First unused key on the branch.
    fn current_key(&self, purpose: KeyPurpose) -> Result<Key, WalletError>;

    /// The unused key after the current one.
    fn next_unused_key(&self, purpose: KeyPurpose) -> Result<Key, WalletError>;

    /// Look up a key by script address: a 20-byte pubkey hash, or a raw
    /// public key.
    fn key_for_script(&self, script_address: &[u8]) -> Result<Key, WalletError>;

    fn mark_used(&self, script_address: &[u8]) -> Result<(), WalletError>;

    fn all_keys(&self) -> Vec<Key>;
}

// ─── Chain backend ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub height: u32,
    pub hash: [u8; 32],
    pub prev_hash: [u8; 32],
}

/// A raw transaction as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTransaction {
    pub raw: Vec<u8>,
    /// 0 while in the mempool.
    pub height: i32,
    pub timestamp: u64,
}

/// Notification streams. Closing both ends the ingestion task.
pub struct ChainEvents {
    pub blocks: mpsc::Receiver<BlockInfo>,
    pub transactions: mpsc::Receiver<ChainTransaction>,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn best_block(&self) -> Result<BlockInfo, WalletError>;

    async fn transactions_for(
        &self,
        addresses: &[Address],
    ) -> Result<Vec<ChainTransaction>, WalletError>;

    async fn raw_transaction(&self, txid: &[u8; 32]) -> Result<ChainTransaction, WalletError>;

    /// Submit raw bytes; returns the txid the backend reports.
    async fn broadcast(&self, raw: &[u8]) -> Result<[u8; 32], WalletError>;

    /// Fee rate per kilobyte for confirmation within `blocks`.
    async fn estimate_fee(&self, blocks: u32) -> Result<u64, WalletError>;

    /// Ask for notifications about transactions touching `address`.
    async fn listen(&self, address: &Address) -> Result<(), WalletError>;

    async fn subscribe(&self) -> Result<ChainEvents, WalletError>;
}

// ─── Exchange rates ─────────────────────────────────────────────────

pub trait ExchangeRates: Send + Sync {
    fn latest_rate(&self, currency_code: &str) -> Result<f64, WalletError>;

    fn all_rates(&self) -> Result<HashMap<String, f64>, WalletError>;
}

use chain_btc::network::{
    NetworkParams, BITCOIN_MAINNET, BITCOIN_REGTEST, BITCOIN_TESTNET, LITECOIN_MAINNET,
    LITECOIN_TESTNET,
};
use chain_btc::transaction::{txid_to_hex, OutPoint};
use chain_zec::network::{ZCASH_MAINNET, ZCASH_TESTNET};
use serde::{Deserialize, Serialize};

use crate::chain_tx::TxFormat;

/// Unconfirmed transactions older than this are reported dead.
pub const UNCONFIRMED_TIMEOUT_SECS: u64 = 6 * 60 * 60;

/// Confirmations at which a transaction stops being pending.
pub const CONFIRMED_THRESHOLD: u32 = 24;

/// Supported UTXO chains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Chain {
    Bitcoin,
    BitcoinTestnet,
    BitcoinRegtest,
    Litecoin,
    LitecoinTestnet,
    Zcash,
    ZcashTestnet,
}

impl Chain {
    /// Address and script parameters for this chain
    pub fn params(&self) -> &'static NetworkParams {
        match self {
            Chain::Bitcoin => &BITCOIN_MAINNET,
            Chain::BitcoinTestnet => &BITCOIN_TESTNET,
            Chain::BitcoinRegtest => &BITCOIN_REGTEST,
            Chain::Litecoin => &LITECOIN_MAINNET,
            Chain::LitecoinTestnet => &LITECOIN_TESTNET,
            Chain::Zcash => &ZCASH_MAINNET,
            Chain::ZcashTestnet => &ZCASH_TESTNET,
        }
    }

    /// BIP-44 coin type for this chain
    pub fn coin_type(&self) -> u32 {
        match self {
            Chain::Bitcoin => 0,
            Chain::Litecoin => 2,
            Chain::Zcash => 133,
            Chain::BitcoinTestnet
            | Chain::BitcoinRegtest
            | Chain::LitecoinTestnet
            | Chain::ZcashTestnet => 1,
        }
    }

    pub fn is_zcash(&self) -> bool {
        matches!(self, Chain::Zcash | Chain::ZcashTestnet)
    }

    /// Wire format for this chain. `branch_id` only matters for Zcash.
    pub fn tx_format(&self, branch_id: u32) -> TxFormat {
        if self.is_zcash() {
            TxFormat::Sapling { branch_id }
        } else {
            TxFormat::Legacy
        }
    }

    /// Display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Chain::Bitcoin => "Bitcoin",
            Chain::BitcoinTestnet => "Bitcoin Testnet",
            Chain::BitcoinRegtest => "Bitcoin Regtest",
            Chain::Litecoin => "Litecoin",
            Chain::LitecoinTestnet => "Litecoin Testnet",
            Chain::Zcash => "Zcash",
            Chain::ZcashTestnet => "Zcash Testnet",
        }
    }

    /// Native token symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Chain::Bitcoin => "BTC",
            Chain::BitcoinTestnet | Chain::BitcoinRegtest => "TBTC",
            Chain::Litecoin => "LTC",
            Chain::LitecoinTestnet => "TLTC",
            Chain::Zcash => "ZEC",
            Chain::ZcashTestnet => "TZEC",
        }
    }

    pub fn is_testnet(&self) -> bool {
        !matches!(self, Chain::Bitcoin | Chain::Litecoin | Chain::Zcash)
    }
}

/// BIP-44 change level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyPurpose {
    External,
    Internal,
}

impl KeyPurpose {
    pub fn branch(&self) -> u32 {
        match self {
            KeyPurpose::External => 0,
            KeyPurpose::Internal => 1,
        }
    }
}

// ─── Ledger records ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub value: i64,
    pub script_pubkey: Vec<u8>,
    /// 0 while unconfirmed.
    pub at_height: i32,
    pub watch_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stxo {
    pub utxo: Utxo,
    pub spend_height: i32,
    pub spend_txid: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Txn {
    pub txid: [u8; 32],
    pub raw: Vec<u8>,
    /// Net value to the wallet; negative for spends.
    pub value: i64,
    /// 0 while unconfirmed, negative once dead.
    pub height: i32,
    /// Unix seconds when first seen.
    pub timestamp: u64,
    pub watch_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Unconfirmed,
    Pending,
    Confirmed,
    Dead,
}

impl Txn {
    pub fn txid_hex(&self) -> String {
        txid_to_hex(&self.txid)
    }

    /// Blocks since inclusion, counting the including block.
    pub fn confirmations(&self, tip_height: u32) -> u32 {
        if self.height <= 0 {
            return 0;
        }
        (tip_height as i64 - self.height as i64 + 1).max(0) as u32
    }

    pub fn status(&self, tip_height: u32, now: u64) -> TxStatus {
        if self.height < 0 {
            return TxStatus::Dead;
        }
        if self.height == 0 {
            return if now.saturating_sub(self.timestamp) <= UNCONFIRMED_TIMEOUT_SECS {
                TxStatus::Unconfirmed
            } else {
                TxStatus::Dead
            };
        }
        match self.confirmations(tip_height) {
            0 => TxStatus::Unconfirmed,
            c if c < CONFIRMED_THRESHOLD => TxStatus::Pending,
            _ => TxStatus::Confirmed,
        }
    }
}

/// A stored transaction with its status derived against the current tip
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxnDetail {
    pub txn: Txn,
    pub status: TxStatus,
    pub confirmations: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Balance {
    pub confirmed: i64,
    pub unconfirmed: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTip {
    pub height: u32,
    pub hash: [u8; 32],
}

// ─── Listener payloads ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionInput {
    pub outpoint: OutPoint,
    /// Known only when the input spends one of our outputs.
    pub value: i64,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionOutput {
    pub index: u32,
    pub value: i64,
    pub address: Option<String>,
}

/// Delivered to listeners when a relevant transaction is first seen or its
/// height changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionCallback {
    pub txid: [u8; 32],
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub height: i32,
    pub value: i64,
    pub watch_only: bool,
    pub timestamp: u64,
}

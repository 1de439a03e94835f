use std::collections::{BTreeMap, BTreeSet};

use chain_btc::transaction::{txid_to_hex, OutPoint};

use crate::error::WalletError;
use crate::types::{Stxo, Txn, Utxo};

/// Persistence contract for ledger state. Tables are keyed by outpoint
/// (UTXO, STXO) or txid (transactions).
pub trait Datastore: Send {
    // utxos
    fn put_utxo(&mut self, utxo: Utxo) -> Result<(), WalletError>;
    fn utxos(&self) -> Result<Vec<Utxo>, WalletError>;
    fn delete_utxo(&mut self, outpoint: &OutPoint) -> Result<(), WalletError>;
    fn set_utxo_watch_only(&mut self, outpoint: &OutPoint, watch_only: bool)
        -> Result<(), WalletError>;

    // stxos
    fn put_stxo(&mut self, stxo: Stxo) -> Result<(), WalletError>;
    fn stxos(&self) -> Result<Vec<Stxo>, WalletError>;
    fn delete_stxo(&mut self, outpoint: &OutPoint) -> Result<(), WalletError>;

    // transactions
    fn put_txn(&mut self, txn: Txn) -> Result<(), WalletError>;
    fn txn(&self, txid: &[u8; 32]) -> Result<Option<Txn>, WalletError>;
    fn txns(&self) -> Result<Vec<Txn>, WalletError>;
    fn update_txn_height(&mut self, txid: &[u8; 32], height: i32) -> Result<(), WalletError>;
    fn delete_txn(&mut self, txid: &[u8; 32]) -> Result<(), WalletError>;

    // watched scripts
    fn put_watched_script(&mut self, script: Vec<u8>) -> Result<(), WalletError>;
    fn watched_scripts(&self) -> Result<Vec<Vec<u8>>, WalletError>;
    fn delete_watched_script(&mut self, script: &[u8]) -> Result<(), WalletError>;
}

/// In-memory datastore.
#[derive(Debug, Default)]
pub struct MemoryDatastore {
    utxos: BTreeMap<OutPoint, Utxo>,
    stxos: BTreeMap<OutPoint, Stxo>,
    txns: BTreeMap<[u8; 32], Txn>,
    watched: BTreeSet<Vec<u8>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Datastore for MemoryDatastore {
    fn put_utxo(&mut self, utxo: Utxo) -> Result<(), WalletError> {
        self.utxos.insert(utxo.outpoint, utxo);
        Ok(())
    }

    fn utxos(&self) -> Result<Vec<Utxo>, WalletError> {
        Ok(self.utxos.values().cloned().collect())
    }

    fn delete_utxo(&mut self, outpoint: &OutPoint) -> Result<(), WalletError> {
        self.utxos.remove(outpoint);
        Ok(())
    }

    fn set_utxo_watch_only(
        &mut self,
        outpoint: &OutPoint,
        watch_only: bool,
    ) -> Result<(), WalletError> {
        let utxo = self
            .utxos
            .get_mut(outpoint)
            .ok_or_else(|| WalletError::NotFound(format!("utxo {outpoint}")))?;
        utxo.watch_only = watch_only;
        Ok(())
    }

    fn put_stxo(&mut self, stxo: Stxo) -> Result<(), WalletError> {
        self.stxos.insert(stxo.utxo.outpoint, stxo);
        Ok(())
    }

    fn stxos(&self) -> Result<Vec<Stxo>, WalletError> {
        Ok(self.stxos.values().cloned().collect())
    }

    fn delete_stxo(&mut self, outpoint: &OutPoint) -> Result<(), WalletError> {
        self.stxos.remove(outpoint);
        Ok(())
    }

    fn put_txn(&mut self, txn: Txn) -> Result<(), WalletError> {
        self.txns.insert(txn.txid, txn);
        Ok(())
    }

    fn txn(&self, txid: &[u8; 32]) -> Result<Option<Txn>, WalletError> {
        Ok(self.txns.get(txid).cloned())
    }

    /// Oldest first.
    fn txns(&self) -> Result<Vec<Txn>, WalletError> {
        let mut all: Vec<Txn> = self.txns.values().cloned().collect();
        all.sort_by_key(|t| t.timestamp);
        Ok(all)
    }

    fn update_txn_height(&mut self, txid: &[u8; 32], height: i32) -> Result<(), WalletError> {
        let txn = self
            .txns
            .get_mut(txid)
            .ok_or_else(|| WalletError::NotFound(format!("transaction {}", txid_to_hex(txid))))?;
        txn.height = height;
        Ok(())
    }

    fn delete_txn(&mut self, txid: &[u8; 32]) -> Result<(), WalletError> {
        self.txns.remove(txid);
        Ok(())
    }

    fn put_watched_script(&mut self, script: Vec<u8>) -> Result<(), WalletError> {
        self.watched.insert(script);
        Ok(())
    }

    fn watched_scripts(&self) -> Result<Vec<Vec<u8>>, WalletError> {
        Ok(self.watched.iter().cloned().collect())
    }

    fn delete_watched_script(&mut self, script: &[u8]) -> Result<(), WalletError> {
        self.watched.remove(script);
        Ok(())
    }
}

//! Unspent/spent output ledger.
//!
//! Ingestion turns raw chain transactions into UTXO, STXO and transaction
//! records for the outputs the key manager (or the watch list) recognises.
//! Conflicting spends are resolved first-seen while unconfirmed and in favour
//! of the confirmed transaction otherwise; losers are marked dead together
//! with everything that descends from them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chain_btc::address::Address;
use chain_btc::network::NetworkParams;
use chain_btc::transaction::{txid_to_hex, OutPoint};
use tracing::{debug, info, warn};

use crate::chain_tx::{ChainTx, TxFormat};
use crate::datastore::Datastore;
use crate::error::WalletError;
use crate::interfaces::KeyManager;
use crate::types::{
    Balance, Stxo, TransactionCallback, TransactionInput, TransactionOutput, Txn, Utxo,
};

pub type TransactionListener = Box<dyn Fn(&TransactionCallback) + Send + Sync>;

pub struct Ledger {
    params: &'static NetworkParams,
    format: TxFormat,
    store: Box<dyn Datastore>,
    keys: Arc<dyn KeyManager>,
    listeners: Vec<TransactionListener>,
}

impl Ledger {
    pub fn new(
        params: &'static NetworkParams,
        format: TxFormat,
        store: Box<dyn Datastore>,
        keys: Arc<dyn KeyManager>,
    ) -> Self {
        Self {
            params,
            format,
            store,
            keys,
            listeners: Vec::new(),
        }
    }

    pub fn format(&self) -> TxFormat {
        self.format
    }

    pub fn add_listener(&mut self, listener: TransactionListener) {
        self.listeners.push(listener);
    }

    // ─── Ingestion ──────────────────────────────────────────────────

    /// Record `tx` if it touches the wallet. Returns the number of owned
    /// inputs and outputs it touched; 0 for irrelevant or rejected
    /// double spends, 1 for already-known transactions.
    pub fn ingest(
        &mut self,
        tx: &ChainTx,
        raw: &[u8],
        height: i32,
        timestamp: u64,
    ) -> Result<u32, WalletError> {
        tx.check_sanity()?;

        let height = height.max(0);
        let txid = tx.txid();
        let existing = self.store.txn(&txid)?;
        if let Some(known) = &existing {
            if known.height > 0 || (known.height == 0 && height == 0) {
                debug!(txid = %txid_to_hex(&txid), "transaction already known");
                return Ok(1);
            }
        }

        let conflicts = self.check_double_spends(tx);
        if !conflicts.is_empty() {
            if height == 0 {
                warn!(
                    txid = %txid_to_hex(&txid),
                    conflicts = conflicts.len(),
                    "ignoring unconfirmed double spend"
                );
                return Ok(0);
            }
            for conflict in &conflicts {
                warn!(
                    txid = %txid_to_hex(conflict),
                    by = %txid_to_hex(&txid),
                    "confirmed double spend, marking conflict dead"
                );
                self.mark_dead(conflict)?;
            }
        }

        let transparent = tx.transparent();
        let watched: HashSet<Vec<u8>> = self.store.watched_scripts()?.into_iter().collect();
        let spent: HashMap<OutPoint, Stxo> = self
            .store
            .stxos()?
            .into_iter()
            .map(|s| (s.utxo.outpoint, s))
            .collect();

        let mut hits = 0u32;
        let mut value = 0i64;
        let mut matches_watch = false;

        let mut outputs = Vec::with_capacity(transparent.outputs.len());
        for (i, out) in transparent.outputs.iter().enumerate() {
            let address = Address::from_script(&out.script_pubkey, self.params).ok();
            let owned = address
                .as_ref()
                .is_some_and(|a| self.keys.key_for_script(&a.script_address()).is_ok());
            let watch = !owned && watched.contains(&out.script_pubkey);

            if owned || watch {
                let utxo = Utxo {
                    outpoint: OutPoint::new(txid, i as u32),
                    value: out.value,
                    script_pubkey: out.script_pubkey.clone(),
                    at_height: height,
                    watch_only: watch,
                };
                // a re-ingest must not resurrect an output that is already spent
                match spent.get(&utxo.outpoint) {
                    Some(stxo) => self.store.put_stxo(Stxo {
                        utxo,
                        ..stxo.clone()
                    })?,
                    None => self.store.put_utxo(utxo)?,
                }
                if owned {
                    hits += 1;
                    value += out.value;
                    if let Some(a) = &address {
                        self.keys.mark_used(&a.script_address())?;
                    }
                } else {
                    matches_watch = true;
                }
            }

            outputs.push(TransactionOutput {
                index: i as u32,
                value: out.value,
                address: address.and_then(|a| a.encode().ok()),
            });
        }

        let utxos: HashMap<OutPoint, Utxo> = self
            .store
            .utxos()?
            .into_iter()
            .map(|u| (u.outpoint, u))
            .collect();

        let mut inputs = Vec::with_capacity(transparent.inputs.len());
        for input in &transparent.inputs {
            let prev = input.previous_output;
            let mut summary = TransactionInput {
                outpoint: prev,
                value: 0,
                address: None,
            };
            if let Some(utxo) = utxos.get(&prev) {
                summary.value = utxo.value;
                summary.address = self.encode_script(&utxo.script_pubkey);
                if utxo.watch_only {
                    matches_watch = true;
                } else {
                    hits += 1;
                    value -= utxo.value;
                }
                self.store.put_stxo(Stxo {
                    utxo: utxo.clone(),
                    spend_height: height,
                    spend_txid: txid,
                })?;
                self.store.delete_utxo(&prev)?;
            } else if let Some(stxo) = spent.get(&prev) {
                if stxo.spend_txid == txid {
                    summary.value = stxo.utxo.value;
                    summary.address = self.encode_script(&stxo.utxo.script_pubkey);
                    if height > 0 {
                        self.store.put_stxo(Stxo {
                            spend_height: height,
                            ..stxo.clone()
                        })?;
                    }
                }
            }
            inputs.push(summary);
        }

        if hits == 0 && !matches_watch {
            return Ok(0);
        }

        let watch_only = hits == 0;
        let (notify, value, timestamp) = match existing {
            None => {
                self.store.put_txn(Txn {
                    txid,
                    raw: raw.to_vec(),
                    value,
                    height,
                    timestamp,
                    watch_only,
                })?;
                debug!(txid = %txid_to_hex(&txid), height, value, "new wallet transaction");
                (true, value, timestamp)
            }
            Some(known) => {
                self.store.update_txn_height(&txid, height)?;
                debug!(txid = %txid_to_hex(&txid), from = known.height, to = height, "transaction height updated");
                (known.height != height, known.value, known.timestamp)
            }
        };

        if notify {
            let callback = TransactionCallback {
                txid,
                inputs,
                outputs,
                height,
                value,
                watch_only,
                timestamp,
            };
            for listener in &self.listeners {
                listener(&callback);
            }
        }

        Ok(hits)
    }

    /// Stored live transactions spending any outpoint `tx` spends.
    pub fn check_double_spends(&self, tx: &ChainTx) -> Vec<[u8; 32]> {
        let txid = tx.txid();
        let incoming: HashSet<OutPoint> = tx
            .transparent()
            .inputs
            .iter()
            .map(|i| i.previous_output)
            .filter(|op| !op.is_null())
            .collect();
        if incoming.is_empty() {
            return Vec::new();
        }

        let stored = match self.store.txns() {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "cannot read transactions for double spend check");
                return Vec::new();
            }
        };

        let mut conflicts = Vec::new();
        for txn in stored {
            if txn.txid == txid || txn.height < 0 {
                continue;
            }
            let decoded = match self.format.decode(&txn.raw) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!(txid = %txn.txid_hex(), error = %e, "stored transaction does not decode");
                    continue;
                }
            };
            if decoded
                .transparent()
                .inputs
                .iter()
                .any(|i| incoming.contains(&i.previous_output))
            {
                conflicts.push(txn.txid);
            }
        }
        conflicts
    }

    /// Mark `txid` dead and undo its effects, cascading to every
    /// transaction that spent its outputs.
    pub fn mark_dead(&mut self, txid: &[u8; 32]) -> Result<(), WalletError> {
        let mut stack = vec![*txid];
        let mut visited = HashSet::new();

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }

            for stxo in self.store.stxos()? {
                if stxo.spend_txid == current {
                    self.store.delete_stxo(&stxo.utxo.outpoint)?;
                    self.store.put_utxo(stxo.utxo)?;
                } else if stxo.utxo.outpoint.txid == current {
                    self.store.delete_stxo(&stxo.utxo.outpoint)?;
                    stack.push(stxo.spend_txid);
                }
            }

            for utxo in self.store.utxos()? {
                if utxo.outpoint.txid == current {
                    self.store.delete_utxo(&utxo.outpoint)?;
                }
            }

            if self.store.txn(&current)?.is_some() {
                self.store.update_txn_height(&current, -1)?;
                info!(txid = %txid_to_hex(&current), "transaction marked dead");
            }
        }
        Ok(())
    }

    /// Mark every transaction above `last_good_height` dead, newest first.
    pub fn process_reorg(&mut self, last_good_height: u32) -> Result<(), WalletError> {
        let mut orphaned: Vec<Txn> = self
            .store
            .txns()?
            .into_iter()
            .filter(|t| t.height > last_good_height as i32)
            .collect();
        orphaned.sort_by(|a, b| {
            b.height
                .cmp(&a.height)
                .then_with(|| b.timestamp.cmp(&a.timestamp))
        });
        for txn in orphaned {
            self.mark_dead(&txn.txid)?;
        }
        Ok(())
    }

    /// Drop every UTXO, STXO and transaction record. Watched scripts stay.
    pub fn reset(&mut self) -> Result<(), WalletError> {
        for utxo in self.store.utxos()? {
            self.store.delete_utxo(&utxo.outpoint)?;
        }
        for stxo in self.store.stxos()? {
            self.store.delete_stxo(&stxo.utxo.outpoint)?;
        }
        for txn in self.store.txns()? {
            self.store.delete_txn(&txn.txid)?;
        }
        Ok(())
    }

    // ─── Views ──────────────────────────────────────────────────────

    /// Confirmed and unconfirmed spendable value. Unconfirmed change of a
    /// spend funded by confirmed coins counts as confirmed.
    pub fn balance(&self) -> Result<Balance, WalletError> {
        let stxos = self.store.stxos()?;
        let mut spent_by: HashMap<[u8; 32], Vec<&Stxo>> = HashMap::new();
        for stxo in stxos.iter().filter(|s| !s.utxo.watch_only) {
            spent_by.entry(stxo.spend_txid).or_default().push(stxo);
        }

        let mut balance = Balance::default();
        for utxo in self.store.utxos()?.iter().filter(|u| !u.watch_only) {
            if utxo.at_height > 0 || funded_by_confirmed(&utxo.outpoint.txid, &spent_by) {
                balance.confirmed += utxo.value;
            } else {
                balance.unconfirmed += utxo.value;
            }
        }
        Ok(balance)
    }

    pub fn utxos(&self) -> Result<Vec<Utxo>, WalletError> {
        self.store.utxos()
    }

    pub fn stxos(&self) -> Result<Vec<Stxo>, WalletError> {
        self.store.stxos()
    }

    pub fn transactions(&self) -> Result<Vec<Txn>, WalletError> {
        self.store.txns()
    }

    pub fn transaction(&self, txid: &[u8; 32]) -> Result<Txn, WalletError> {
        self.store
            .txn(txid)?
            .ok_or_else(|| WalletError::NotFound(format!("transaction {}", txid_to_hex(txid))))
    }

    /// Confirmations against `tip_height` and the recorded height.
    pub fn confirmations(&self, txid: &[u8; 32], tip_height: u32) -> Result<(u32, i32), WalletError> {
        let txn = self.transaction(txid)?;
        Ok((txn.confirmations(tip_height), txn.height))
    }

    // ─── Watch list ─────────────────────────────────────────────────

    pub fn add_watched_script(&mut self, script: Vec<u8>) -> Result<(), WalletError> {
        self.store.put_watched_script(script)
    }

    pub fn watched_scripts(&self) -> Result<Vec<Vec<u8>>, WalletError> {
        self.store.watched_scripts()
    }

    fn encode_script(&self, script: &[u8]) -> Option<String> {
        Address::from_script(script, self.params)
            .ok()
            .and_then(|a| a.encode().ok())
    }
}

/// Walk back through unconfirmed spends of our own coins looking for a
/// confirmed one. Cycles count as unconfirmed.
fn funded_by_confirmed(txid: &[u8; 32], spent_by: &HashMap<[u8; 32], Vec<&Stxo>>) -> bool {
    let mut stack = vec![*txid];
    let mut visited = HashSet::new();
    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        for stxo in spent_by.get(&current).into_iter().flatten() {
            if stxo.utxo.at_height > 0 {
                return true;
            }
            stack.push(stxo.utxo.outpoint.txid);
        }
    }
    false
}

//! Background ingestion task.
//!
//! One task per wallet keeps the ledger in step with the chain backend: an
//! initial sync over every tracked address, then block and transaction
//! notifications until shutdown or until the backend closes its channels.
//! Network calls are made without holding the ledger lock.

use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use chain_btc::address::Address;
use chain_btc::network::NetworkParams;
use chain_btc::transaction::txid_to_hex;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::chain_tx::{ChainTx, TxFormat};
use crate::error::WalletError;
use crate::interfaces::{BlockInfo, ChainClient, ChainEvents, ChainTransaction, KeyManager};
use crate::ledger::Ledger;
use crate::shutdown::ShutdownSignal;
use crate::types::{Chain, ChainTip};

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// State shared between the facade and the ingestion task.
pub struct WalletState {
    pub chain: Chain,
    pub format: TxFormat,
    pub ledger: Mutex<Ledger>,
    pub keys: Arc<dyn KeyManager>,
    pub client: Arc<dyn ChainClient>,
    tip: RwLock<ChainTip>,
    subscribed: RwLock<HashSet<Address>>,
}

impl WalletState {
    pub fn new(
        chain: Chain,
        format: TxFormat,
        ledger: Ledger,
        keys: Arc<dyn KeyManager>,
        client: Arc<dyn ChainClient>,
    ) -> Self {
        Self {
            chain,
            format,
            ledger: Mutex::new(ledger),
            keys,
            client,
            tip: RwLock::new(ChainTip::default()),
            subscribed: RwLock::new(HashSet::new()),
        }
    }

    pub fn params(&self) -> &'static NetworkParams {
        self.chain.params()
    }

    pub fn tip(&self) -> ChainTip {
        *read(&self.tip)
    }

    fn set_tip(&self, tip: ChainTip) {
        *write(&self.tip) = tip;
    }

    pub fn is_subscribed(&self, address: &Address) -> bool {
        read(&self.subscribed).contains(address)
    }

    // ─── Addresses ──────────────────────────────────────────────────

    /// P2PKH addresses of every key plus the addresses of watched scripts.
    pub async fn tracked_addresses(&self) -> Result<Vec<Address>, WalletError> {
        let params = self.params();
        let mut seen = HashSet::new();
        let mut addresses = Vec::new();
        for key in self.keys.all_keys() {
            let address = key.address(params);
            if seen.insert(address.clone()) {
                addresses.push(address);
            }
        }
        let watched = self.ledger.lock().await.watched_scripts()?;
        for script in watched {
            match Address::from_script(&script, params) {
                Ok(address) => {
                    if seen.insert(address.clone()) {
                        addresses.push(address);
                    }
                }
                Err(e) => debug!(error = %e, "watched script has no address"),
            }
        }
        Ok(addresses)
    }

    /// Ask the backend for notifications on addresses not yet subscribed.
    pub async fn subscribe_addresses(&self, addresses: &[Address]) {
        let fresh: Vec<Address> = {
            let subscribed = read(&self.subscribed);
            addresses
                .iter()
                .filter(|a| !subscribed.contains(*a))
                .cloned()
                .collect()
        };
        for address in fresh {
            match self.client.listen(&address).await {
                Ok(()) => {
                    write(&self.subscribed).insert(address);
                }
                Err(e) => error!(%address, error = %e, "failed to subscribe address"),
            }
        }
    }

    // ─── Sync ───────────────────────────────────────────────────────

    /// Fetch history for every tracked address and ingest it, repeating
    /// while ingestion brings new keys into the lookahead window. With
    /// `reset` the ledger is cleared before the first batch is ingested.
    pub async fn sync(&self, reset: bool) -> Result<(), WalletError> {
        let best = self.client.best_block().await?;
        self.set_tip(ChainTip {
            height: best.height,
            hash: best.hash,
        });
        info!(height = best.height, "chain tip");

        let mut reset = reset;
        let mut queried: HashSet<Address> = HashSet::new();
        loop {
            let addresses: Vec<Address> = self
                .tracked_addresses()
                .await?
                .into_iter()
                .filter(|a| !queried.contains(a))
                .collect();
            if addresses.is_empty() {
                break;
            }
            self.subscribe_addresses(&addresses).await;
            queried.extend(addresses.iter().cloned());

            let mut history = self.client.transactions_for(&addresses).await?;
            sort_for_ingestion(&mut history);
            debug!(addresses = addresses.len(), transactions = history.len(), "fetched history");

            let mut ledger = self.ledger.lock().await;
            if std::mem::take(&mut reset) {
                ledger.reset()?;
            }
            for chain_tx in &history {
                if let Err(e) = self.ingest_raw(&mut ledger, chain_tx) {
                    warn!(error = %e, "skipping transaction during sync");
                }
            }
        }
        Ok(())
    }

    pub(crate) fn ingest_raw(
        &self,
        ledger: &mut Ledger,
        chain_tx: &ChainTransaction,
    ) -> Result<u32, WalletError> {
        let tx = self.format.decode(&chain_tx.raw)?;
        let timestamp = match chain_tx.timestamp {
            0 => unix_now(),
            t => t,
        };
        ledger.ingest(&tx, &chain_tx.raw, chain_tx.height, timestamp)
    }

    /// Submit `tx` and record it as unconfirmed.
    pub async fn broadcast(&self, tx: &ChainTx) -> Result<[u8; 32], WalletError> {
        let raw = tx.serialize();
        let txid = tx.txid();
        let reported = self.client.broadcast(&raw).await?;
        if reported != txid {
            warn!(
                txid = %txid_to_hex(&txid),
                reported = %txid_to_hex(&reported),
                "backend reported a different txid"
            );
        }
        info!(txid = %txid_to_hex(&txid), "broadcast transaction");

        self.ledger.lock().await.ingest(tx, &raw, 0, unix_now())?;
        Ok(txid)
    }

    // ─── Notifications ──────────────────────────────────────────────

    pub async fn handle_block(&self, block: BlockInfo) {
        let previous = self.tip();
        self.set_tip(ChainTip {
            height: block.height,
            hash: block.hash,
        });
        info!(height = block.height, hash = %txid_to_hex(&block.hash), "new block");

        let reorg = previous.hash != [0u8; 32]
            && block.prev_hash != previous.hash
            && block.hash != previous.hash;
        if reorg {
            warn!(
                height = block.height,
                previous = previous.height,
                "chain reorganization detected"
            );
            if let Err(e) = self
                .ledger
                .lock()
                .await
                .process_reorg(block.height.saturating_sub(1))
            {
                error!(error = %e, "reorg processing failed");
            }
            if let Err(e) = self.sync(false).await {
                error!(error = %e, "resync after reorg failed");
            }
            return;
        }

        self.refresh_unconfirmed().await;
    }

    /// Re-ingest unconfirmed transactions the backend now reports in a
    /// block, and rebroadcast the rest.
    async fn refresh_unconfirmed(&self) {
        let pending: Vec<([u8; 32], Vec<u8>)> = match self.ledger.lock().await.transactions() {
            Ok(txns) => txns
                .into_iter()
                .filter(|t| t.height == 0)
                .map(|t| (t.txid, t.raw))
                .collect(),
            Err(e) => {
                error!(error = %e, "cannot read unconfirmed transactions");
                return;
            }
        };

        for (txid, raw) in pending {
            match self.client.raw_transaction(&txid).await {
                Ok(found) if found.height > 0 => {
                    let mut ledger = self.ledger.lock().await;
                    if let Err(e) = self.ingest_raw(&mut ledger, &found) {
                        warn!(txid = %txid_to_hex(&txid), error = %e, "failed to record confirmation");
                    }
                }
                Ok(_) | Err(_) => {
                    if let Err(e) = self.client.broadcast(&raw).await {
                        warn!(txid = %txid_to_hex(&txid), error = %e, "rebroadcast failed");
                    } else {
                        debug!(txid = %txid_to_hex(&txid), "rebroadcast unconfirmed transaction");
                    }
                }
            }
        }
    }

    pub async fn handle_transaction(&self, chain_tx: ChainTransaction) {
        let result = {
            let mut ledger = self.ledger.lock().await;
            self.ingest_raw(&mut ledger, &chain_tx)
        };
        match result {
            Ok(hits) => debug!(hits, height = chain_tx.height, "transaction notification"),
            Err(e) => {
                warn!(error = %e, "skipping notified transaction");
                return;
            }
        }
        // ingestion may have extended the key window
        match self.tracked_addresses().await {
            Ok(addresses) => self.subscribe_addresses(&addresses).await,
            Err(e) => error!(error = %e, "cannot list tracked addresses"),
        }
    }
}

/// Confirmed transactions by height, unconfirmed last.
fn sort_for_ingestion(history: &mut [ChainTransaction]) {
    history.sort_by_key(|t| if t.height > 0 { t.height } else { i32::MAX });
}

/// Initial sync, then notifications until shutdown or until both event
/// channels close.
pub async fn run(state: Arc<WalletState>, mut events: ChainEvents, mut shutdown: ShutdownSignal) {
    if let Err(e) = state.sync(false).await {
        error!(error = %e, "initial sync failed");
    }

    let mut blocks_open = true;
    let mut transactions_open = true;
    while blocks_open || transactions_open {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("wallet service stopping");
                break;
            }
            block = events.blocks.recv(), if blocks_open => match block {
                Some(block) => state.handle_block(block).await,
                None => blocks_open = false,
            },
            chain_tx = events.transactions.recv(), if transactions_open => match chain_tx {
                Some(chain_tx) => state.handle_transaction(chain_tx).await,
                None => transactions_open = false,
            },
        }
    }
    debug!("wallet service finished");
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

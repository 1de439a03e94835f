//! Scripted chain backend for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chain_btc::address::Address;
use chain_btc::transaction::Transaction;
use tokio::sync::mpsc;

use crate::error::WalletError;
use crate::interfaces::{BlockInfo, ChainClient, ChainEvents, ChainTransaction};

pub(crate) struct MockClient {
    best: Mutex<BlockInfo>,
    history: Mutex<Vec<ChainTransaction>>,
    raw: Mutex<HashMap<[u8; 32], ChainTransaction>>,
    broadcasts: Mutex<Vec<Vec<u8>>>,
    listened: Mutex<Vec<Address>>,
    senders: Mutex<Option<(mpsc::Sender<BlockInfo>, mpsc::Sender<ChainTransaction>)>>,
    fail_broadcast: AtomicBool,
}

impl MockClient {
    pub fn new(best: BlockInfo) -> Self {
        Self {
            best: Mutex::new(best),
            history: Mutex::new(Vec::new()),
            raw: Mutex::new(HashMap::new()),
            broadcasts: Mutex::new(Vec::new()),
            listened: Mutex::new(Vec::new()),
            senders: Mutex::new(None),
            fail_broadcast: AtomicBool::new(false),
        }
    }

    pub fn add_history(&self, chain_tx: ChainTransaction) {
        self.history.lock().unwrap().push(chain_tx);
    }

    pub fn clear_history(&self) {
        self.history.lock().unwrap().clear();
    }

    pub fn set_raw(&self, txid: [u8; 32], chain_tx: ChainTransaction) {
        self.raw.lock().unwrap().insert(txid, chain_tx);
    }

    pub fn broadcasts(&self) -> Vec<Vec<u8>> {
        self.broadcasts.lock().unwrap().clone()
    }

    pub fn listened(&self) -> Vec<Address> {
        self.listened.lock().unwrap().clone()
    }

    pub fn fail_broadcasts(&self) {
        self.fail_broadcast.store(true, Ordering::SeqCst);
    }

    pub async fn push_block(&self, block: BlockInfo) {
        let sender = self.senders.lock().unwrap().as_ref().map(|(b, _)| b.clone());
        sender.unwrap().send(block).await.unwrap();
    }

    pub async fn push_transaction(&self, chain_tx: ChainTransaction) {
        let sender = self.senders.lock().unwrap().as_ref().map(|(_, t)| t.clone());
        sender.unwrap().send(chain_tx).await.unwrap();
    }

    pub fn close_events(&self) {
        self.senders.lock().unwrap().take();
    }
}

#[async_trait]
impl ChainClient for MockClient {
    async fn best_block(&self) -> Result<BlockInfo, WalletError> {
        Ok(*self.best.lock().unwrap())
    }

    /// History entries with an output paying any of `addresses`.
    async fn transactions_for(
        &self,
        addresses: &[Address],
    ) -> Result<Vec<ChainTransaction>, WalletError> {
        let scripts: HashSet<Vec<u8>> = addresses.iter().map(|a| a.to_script()).collect();
        let history = self.history.lock().unwrap().clone();
        Ok(history
            .into_iter()
            .filter(|t| {
                Transaction::deserialize(&t.raw)
                    .map(|tx| tx.outputs.iter().any(|o| scripts.contains(&o.script_pubkey)))
                    .unwrap_or(false)
            })
            .collect())
    }

    async fn raw_transaction(&self, txid: &[u8; 32]) -> Result<ChainTransaction, WalletError> {
        self.raw
            .lock()
            .unwrap()
            .get(txid)
            .cloned()
            .ok_or_else(|| WalletError::NotFound("raw transaction".into()))
    }

    async fn broadcast(&self, raw: &[u8]) -> Result<[u8; 32], WalletError> {
        if self.fail_broadcast.load(Ordering::SeqCst) {
            return Err(WalletError::Network("rejected".into()));
        }
        self.broadcasts.lock().unwrap().push(raw.to_vec());
        Ok(Transaction::deserialize(raw).map(|tx| tx.txid()).unwrap_or([0; 32]))
    }

    async fn estimate_fee(&self, _blocks: u32) -> Result<u64, WalletError> {
        Ok(10_000)
    }

    async fn listen(&self, address: &Address) -> Result<(), WalletError> {
        self.listened.lock().unwrap().push(address.clone());
        Ok(())
    }

    async fn subscribe(&self) -> Result<ChainEvents, WalletError> {
        let (block_tx, blocks) = mpsc::channel(16);
        let (tx_tx, transactions) = mpsc::channel(16);
        *self.senders.lock().unwrap() = Some((block_tx, tx_tx));
        Ok(ChainEvents {
            blocks,
            transactions,
        })
    }
}

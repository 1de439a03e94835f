//! The wallet facade.
//!
//! [`Wallet`] owns the shared [`WalletState`], the fee provider and the
//! lifecycle of the background ingestion task. Every operation a caller
//! needs goes through here: addresses, balances and history, spending and
//! fee bumping, escrow, watch-only tracking.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chain_btc::address::Address;
use chain_btc::network::NetworkParams;
use chain_btc::transaction::{txid_to_hex, TxOut};
use chain_btc::txrules::{is_dust_amount, InputKind, DEFAULT_RELAY_FEE_PER_KB, P2PKH_PK_SCRIPT_SIZE};
use crypto_utils::ecdsa::PrivateKey;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::builder::{
    build_sweep_all, build_transaction, check_dust, estimate_fee, estimation_script,
    sweep_transaction, SweepInput, UnsignedTransaction,
};
use crate::chain_tx::ChainTx;
use crate::coinselect::{gather_coins, Coin};
use crate::config::WalletConfig;
use crate::datastore::Datastore;
use crate::error::WalletError;
use crate::escrow::{self, EscrowInput, EscrowOutput, EscrowSignature};
use crate::fees::{FeeLevel, FeeProvider};
use crate::interfaces::{ChainClient, ExchangeRates, KeyManager};
use crate::keys::HdKeyManager;
use crate::ledger::{Ledger, TransactionListener};
use crate::service::{self, unix_now, WalletState};
use crate::shutdown::ShutdownController;
use crate::types::{Balance, Chain, ChainTip, KeyPurpose, TxnDetail};

pub struct Wallet {
    state: Arc<WalletState>,
    fees: FeeProvider,
    shutdown: ShutdownController,
    task: StdMutex<Option<JoinHandle<()>>>,
    /// Held from coin selection until the spend is ingested, so concurrent
    /// spends never pick the same outpoints.
    spending: Mutex<()>,
}

impl Wallet {
    pub fn new(
        config: &WalletConfig,
        keys: Arc<dyn KeyManager>,
        client: Arc<dyn ChainClient>,
        store: Box<dyn Datastore>,
        rates: Option<Arc<dyn ExchangeRates>>,
    ) -> Self {
        let chain = config.chain;
        let format = chain.tx_format(config.zcash_branch_id);
        let ledger = Ledger::new(chain.params(), format, store, keys.clone());
        Self {
            state: Arc::new(WalletState::new(chain, format, ledger, keys, client)),
            fees: FeeProvider::new(config.fees.clone(), rates),
            shutdown: ShutdownController::new(),
            task: StdMutex::new(None),
            spending: Mutex::new(()),
        }
    }

    /// Wallet over an [`HdKeyManager`] derived from a BIP-39 mnemonic.
    pub fn from_mnemonic(
        config: &WalletConfig,
        phrase: &str,
        passphrase: &str,
        client: Arc<dyn ChainClient>,
        store: Box<dyn Datastore>,
        rates: Option<Arc<dyn ExchangeRates>>,
    ) -> Result<Self, WalletError> {
        let keys =
            HdKeyManager::from_mnemonic(phrase, passphrase, config.chain, config.lookahead_window)?;
        Ok(Self::new(config, Arc::new(keys), client, store, rates))
    }

    pub fn chain(&self) -> Chain {
        self.state.chain
    }

    fn params(&self) -> &'static NetworkParams {
        self.state.params()
    }

    // ─── Lifecycle ──────────────────────────────────────────────────

    /// Subscribe to chain events and spawn the ingestion task.
    pub async fn start(&self) -> Result<(), WalletError> {
        if self.task_slot().is_some() {
            warn!("wallet already started");
            return Ok(());
        }
        let events = self.state.client.subscribe().await?;
        let handle = tokio::spawn(service::run(
            self.state.clone(),
            events,
            self.shutdown.subscribe(),
        ));
        *self.task_slot() = Some(handle);
        info!(chain = self.chain().display_name(), "wallet started");
        Ok(())
    }

    /// Clear the ledger and rebuild it from the backend's history.
    pub async fn resync(&self) -> Result<(), WalletError> {
        info!("resyncing wallet");
        self.state.sync(true).await
    }

    /// Stop the ingestion task and wait for it to finish.
    pub async fn close(&self) {
        self.shutdown.shutdown();
        let handle = self.task_slot().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "wallet task ended abnormally");
            }
        }
        info!("wallet closed");
    }

    fn task_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ─── Addresses ──────────────────────────────────────────────────

    pub fn current_address(&self, purpose: KeyPurpose) -> Result<Address, WalletError> {
        Ok(self.state.keys.current_key(purpose)?.address(self.params()))
    }

    /// Hand out the current address and mark it used, so the next call
    /// returns a fresh one.
    pub async fn new_address(&self, purpose: KeyPurpose) -> Result<Address, WalletError> {
        let key = self.state.keys.current_key(purpose)?;
        self.state.keys.mark_used(&key.pubkey_hash())?;
        let addresses = self.state.tracked_addresses().await?;
        self.state.subscribe_addresses(&addresses).await;
        Ok(key.address(self.params()))
    }

    pub fn decode_address(&self, address: &str) -> Result<Address, WalletError> {
        Ok(Address::decode(address, self.params())?)
    }

    pub fn address_to_script(&self, address: &Address) -> Vec<u8> {
        address.to_script()
    }

    pub fn script_to_address(&self, script: &[u8]) -> Result<Address, WalletError> {
        Ok(Address::from_script(script, self.params())?)
    }

    pub fn has_key(&self, address: &Address) -> bool {
        self.state.keys.key_for_script(&address.script_address()).is_ok()
    }

    // ─── Ledger views ───────────────────────────────────────────────

    pub async fn balance(&self) -> Result<Balance, WalletError> {
        self.state.ledger.lock().await.balance()
    }

    /// Every stored transaction with its status at the current tip.
    pub async fn transactions(&self) -> Result<Vec<TxnDetail>, WalletError> {
        let tip = self.chain_tip().height;
        let now = unix_now();
        let txns = self.state.ledger.lock().await.transactions()?;
        Ok(txns
            .into_iter()
            .map(|txn| TxnDetail {
                status: txn.status(tip, now),
                confirmations: txn.confirmations(tip),
                txn,
            })
            .collect())
    }

    pub async fn transaction(&self, txid: &[u8; 32]) -> Result<TxnDetail, WalletError> {
        let tip = self.chain_tip().height;
        let txn = self.state.ledger.lock().await.transaction(txid)?;
        Ok(TxnDetail {
            status: txn.status(tip, unix_now()),
            confirmations: txn.confirmations(tip),
            txn,
        })
    }

    /// Confirmations and the recorded height of `txid`.
    pub async fn confirmations(&self, txid: &[u8; 32]) -> Result<(u32, i32), WalletError> {
        let tip = self.chain_tip().height;
        self.state.ledger.lock().await.confirmations(txid, tip)
    }

    pub fn chain_tip(&self) -> ChainTip {
        self.state.tip()
    }

    // ─── Fees ───────────────────────────────────────────────────────

    pub fn fee_per_byte(&self, level: FeeLevel) -> u64 {
        self.fees.fee_per_byte(level)
    }

    /// Whether a P2PKH output of `amount` would be dust.
    pub fn is_dust(&self, amount: i64) -> bool {
        is_dust_amount(amount, P2PKH_PK_SCRIPT_SIZE, DEFAULT_RELAY_FEE_PER_KB)
    }

    /// Flat fee for a transaction spending `input_count` P2PKH inputs to
    /// `outputs`.
    pub fn estimate_fee(
        &self,
        input_count: usize,
        outputs: &[EscrowOutput],
        fee_per_byte: u64,
    ) -> u64 {
        let outputs: Vec<TxOut> = outputs
            .iter()
            .map(|o| TxOut::new(o.value, o.address.to_script()))
            .collect();
        estimate_fee(input_count, &outputs, fee_per_byte, InputKind::P2pkh)
    }

    /// Fee a spend of `amount` at `level` would pay with the current coins.
    pub async fn estimate_spend_fee(&self, amount: i64, level: FeeLevel) -> Result<u64, WalletError> {
        let script = estimation_script(self.params());
        let unsigned = self.build_unsigned(amount, &script, level).await?;
        Ok(unsigned.fee().max(0) as u64)
    }

    // ─── Spending ───────────────────────────────────────────────────

    /// Pay `amount` to `address` and broadcast. With `spend_all` every coin
    /// is swept to `address` and `amount` is ignored.
    pub async fn spend(
        &self,
        amount: i64,
        address: &Address,
        level: FeeLevel,
        spend_all: bool,
    ) -> Result<[u8; 32], WalletError> {
        let _spending = self.spending.lock().await;
        let script = address.to_script();
        let unsigned = if spend_all {
            let coins = self.spendable_coins().await?;
            build_sweep_all(
                &coins,
                &script,
                self.fee_per_byte(level),
                self.state.format.default_version(),
            )?
        } else {
            self.build_unsigned(amount, &script, level).await?
        };
        debug!(
            inputs = unsigned.coins.len(),
            fee = unsigned.fee(),
            change = ?unsigned.change_index,
            "built spend"
        );

        let format = self.state.format;
        let mut tx = format.wrap(unsigned.tx);
        crate::signer::sign_p2pkh_inputs(
            format,
            &mut tx,
            &unsigned.coins,
            self.state.keys.as_ref(),
            self.params(),
        )?;
        self.broadcast(&tx).await
    }

    /// Child-pays-for-parent: sweep our unconfirmed output of `txid` back to
    /// ourselves at the fee-bump rate.
    pub async fn bump_fee(&self, txid: &[u8; 32]) -> Result<[u8; 32], WalletError> {
        let _spending = self.spending.lock().await;
        let (txn, utxos) = {
            let ledger = self.state.ledger.lock().await;
            (ledger.transaction(txid)?, ledger.utxos()?)
        };
        if txn.height > 0 {
            return Err(WalletError::AlreadyConfirmed(txid_to_hex(txid)));
        }
        if txn.height < 0 {
            return Err(WalletError::TransactionDead(txid_to_hex(txid)));
        }

        let utxo = utxos
            .into_iter()
            .find(|u| u.outpoint.txid == *txid && u.at_height == 0 && !u.watch_only)
            .ok_or_else(|| {
                WalletError::NotFound(format!("unconfirmed output of {}", txid_to_hex(txid)))
            })?;
        let address = Address::from_script(&utxo.script_pubkey, self.params())?;
        let key = self.state.keys.key_for_script(&address.script_address())?;
        let input = SweepInput {
            outpoint: utxo.outpoint,
            value: utxo.value,
            linked_address: address,
        };
        info!(txid = %txid_to_hex(txid), "bumping fee");
        self.sweep_address(&[input], None, key.signing_key()?, None, FeeLevel::FeeBump)
            .await
    }

    /// Sweep `inputs`, all controlled by `key`, to `destination` or to our
    /// current internal address.
    pub async fn sweep_address(
        &self,
        inputs: &[SweepInput],
        destination: Option<&Address>,
        key: &PrivateKey,
        redeem_script: Option<&[u8]>,
        level: FeeLevel,
    ) -> Result<[u8; 32], WalletError> {
        let destination_script = match destination {
            Some(address) => address.to_script(),
            None => self.state.keys.current_key(KeyPurpose::Internal)?.script_pubkey(),
        };
        let tx = sweep_transaction(
            self.state.format,
            inputs,
            &destination_script,
            key,
            redeem_script,
            self.fee_per_byte(level),
        )?;
        self.broadcast(&tx).await
    }

    /// Submit `tx` and record it as unconfirmed.
    pub async fn broadcast(&self, tx: &ChainTx) -> Result<[u8; 32], WalletError> {
        self.state.broadcast(tx).await
    }

    async fn spendable_coins(&self) -> Result<Vec<Coin>, WalletError> {
        let utxos = self.state.ledger.lock().await.utxos()?;
        Ok(gather_coins(
            &utxos,
            self.chain_tip().height,
            self.state.keys.as_ref(),
        ))
    }

    async fn build_unsigned(
        &self,
        amount: i64,
        script: &[u8],
        level: FeeLevel,
    ) -> Result<UnsignedTransaction, WalletError> {
        check_dust(amount, script)?;
        let coins = self.spendable_coins().await?;
        let change = self.state.keys.current_key(KeyPurpose::Internal)?.script_pubkey();
        build_transaction(
            &coins,
            vec![TxOut::new(amount, script.to_vec())],
            self.fee_per_byte(level) * 1000,
            &change,
            self.state.format.default_version(),
        )
    }

    // ─── Escrow ─────────────────────────────────────────────────────

    pub fn generate_multisig_script(
        &self,
        pubkeys: &[Vec<u8>],
        threshold: usize,
        timeout: Duration,
        timeout_key: Option<&[u8]>,
    ) -> Result<(Address, Vec<u8>), WalletError> {
        escrow::generate_script(pubkeys, threshold, timeout, timeout_key, self.params())
    }

    pub fn create_multisig_signature(
        &self,
        inputs: &[EscrowInput],
        outputs: &[EscrowOutput],
        key: &PrivateKey,
        redeem_script: &[u8],
        fee_per_byte: u64,
    ) -> Result<Vec<EscrowSignature>, WalletError> {
        escrow::create_partial_signatures(
            self.state.format,
            inputs,
            outputs,
            key,
            redeem_script,
            fee_per_byte,
        )
    }

    /// Combine both parties' signatures into the signed escrow spend,
    /// broadcasting it when `broadcast` is set. Returns the serialized
    /// transaction.
    #[allow(clippy::too_many_arguments)]
    pub async fn multisign(
        &self,
        inputs: &[EscrowInput],
        outputs: &[EscrowOutput],
        sigs_a: &[EscrowSignature],
        sigs_b: &[EscrowSignature],
        redeem_script: &[u8],
        fee_per_byte: u64,
        broadcast: bool,
    ) -> Result<Vec<u8>, WalletError> {
        let tx = escrow::combine(
            self.state.format,
            inputs,
            outputs,
            sigs_a,
            sigs_b,
            redeem_script,
            fee_per_byte,
        )?;
        if broadcast {
            self.broadcast(&tx).await?;
        }
        Ok(tx.serialize())
    }

    // ─── Watching ───────────────────────────────────────────────────

    pub async fn add_watched_address(&self, address: &Address) -> Result<(), WalletError> {
        self.add_watched_script(address.to_script()).await
    }

    pub async fn add_watched_addresses(&self, addresses: &[Address]) -> Result<(), WalletError> {
        for address in addresses {
            self.add_watched_address(address).await?;
        }
        Ok(())
    }

    /// Track outputs paying `script` as watch-only.
    pub async fn add_watched_script(&self, script: Vec<u8>) -> Result<(), WalletError> {
        let address = Address::from_script(&script, self.params()).ok();
        self.state.ledger.lock().await.add_watched_script(script)?;
        if let Some(address) = address {
            self.state.subscribe_addresses(&[address]).await;
        }
        Ok(())
    }

    pub async fn add_transaction_listener(&self, listener: TransactionListener) {
        self.state.ledger.lock().await.add_listener(listener);
    }
}

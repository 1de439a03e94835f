//! Cross-crate integration tests exercising the full pipeline:
//! keys -> sync -> spend -> sign -> broadcast, plus escrow and conflict
//! resolution through a running wallet.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chain_btc::address::Address;
use chain_btc::transaction::{OutPoint, Transaction, TxIn, TxOut};
use crypto_utils::ecdsa::PrivateKey;
use tokio::sync::mpsc;
use wallet_core::chain_tx::TxFormat;
use wallet_core::config::WalletConfig;
use wallet_core::datastore::MemoryDatastore;
use wallet_core::escrow::{EscrowInput, EscrowOutput};
use wallet_core::interfaces::{BlockInfo, ChainClient, ChainEvents, ChainTransaction, KeyManager};
use wallet_core::keys::HdKeyManager;
use wallet_core::signer::verify_input;
use wallet_core::types::TxStatus;
use wallet_core::{Chain, FeeLevel, KeyPurpose, Wallet, WalletError};

const XPRV: &str = "xprv9s21ZrQH143K25QhxbucbDDuQ4naNntJRi4KUfWT7xo4EKsHt2QJDu7KXp1A3u7Bi1j8ph3EGsZ9Xvz9dGuVrtHHs7pXeTzjuxBrCmmhgC6";
const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

// ─── Scripted backend ───────────────────────────────────────────────

#[derive(Default)]
struct ScriptedClient {
    history: Mutex<Vec<ChainTransaction>>,
    broadcasts: Mutex<Vec<Vec<u8>>>,
    events: Mutex<Option<(mpsc::Sender<BlockInfo>, mpsc::Sender<ChainTransaction>)>>,
}

impl ScriptedClient {
    fn record(&self, raw: Vec<u8>, height: i32) {
        self.history.lock().unwrap().push(ChainTransaction {
            raw,
            height,
            timestamp: now(),
        });
    }

    async fn notify(&self, raw: Vec<u8>, height: i32) {
        let sender = self.events.lock().unwrap().as_ref().unwrap().1.clone();
        sender
            .send(ChainTransaction {
                raw,
                height,
                timestamp: now(),
            })
            .await
            .unwrap();
    }
}

#[async_trait]
impl ChainClient for ScriptedClient {
    async fn best_block(&self) -> Result<BlockInfo, WalletError> {
        Ok(BlockInfo {
            height: 1_000,
            hash: [7; 32],
            prev_hash: [6; 32],
        })
    }

    async fn transactions_for(
        &self,
        _addresses: &[Address],
    ) -> Result<Vec<ChainTransaction>, WalletError> {
        Ok(self.history.lock().unwrap().clone())
    }

    async fn raw_transaction(&self, _txid: &[u8; 32]) -> Result<ChainTransaction, WalletError> {
        Err(WalletError::NotFound("raw transaction".into()))
    }

    async fn broadcast(&self, raw: &[u8]) -> Result<[u8; 32], WalletError> {
        self.broadcasts.lock().unwrap().push(raw.to_vec());
        Ok([0; 32])
    }

    async fn estimate_fee(&self, _blocks: u32) -> Result<u64, WalletError> {
        Ok(10_000)
    }

    async fn listen(&self, _address: &Address) -> Result<(), WalletError> {
        Ok(())
    }

    async fn subscribe(&self) -> Result<ChainEvents, WalletError> {
        let (blocks_tx, blocks) = mpsc::channel(8);
        let (txs_tx, transactions) = mpsc::channel(8);
        *self.events.lock().unwrap() = Some((blocks_tx, txs_tx));
        Ok(ChainEvents {
            blocks,
            transactions,
        })
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn transfer(prevouts: &[OutPoint], outputs: Vec<TxOut>) -> Transaction {
    let mut tx = Transaction::new(1);
    for prevout in prevouts {
        tx.inputs.push(TxIn {
            previous_output: *prevout,
            script_sig: vec![],
            sequence: u32::MAX,
        });
    }
    tx.outputs = outputs;
    tx
}

fn foreign_script() -> Vec<u8> {
    Address::decode("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH", Chain::Bitcoin.params())
        .unwrap()
        .to_script()
}

fn xprv_wallet() -> (Wallet, Arc<ScriptedClient>, Arc<HdKeyManager>) {
    let client = Arc::new(ScriptedClient::default());
    let keys = Arc::new(HdKeyManager::from_xprv(XPRV, Chain::Bitcoin, 20).unwrap());
    let wallet = Wallet::new(
        &WalletConfig::default(),
        keys.clone(),
        client.clone(),
        Box::new(MemoryDatastore::new()),
        None,
    );
    (wallet, client, keys)
}

async fn wait_for<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached");
}

// ─── Bitcoin spend ──────────────────────────────────────────────────

#[tokio::test]
async fn bitcoin_spend_end_to_end() {
    let (wallet, client, keys) = xprv_wallet();
    let receive = wallet.current_address(KeyPurpose::External).unwrap();
    assert_eq!(receive.to_string(), "17rxURoF96VhmkcEGCj5LNQkmN9HVhWb7F");

    let funding = transfer(
        &[OutPoint::new([0xEE; 32], 3)],
        vec![TxOut::new(1_500_000, receive.to_script())],
    );
    client.record(funding.serialize(), 994);
    wallet.start().await.unwrap();
    let w = &wallet;
    wait_for(move || async move { w.balance().await.unwrap().confirmed == 1_500_000 }).await;

    // a spend of 1 satoshi is dust
    let dest = Address::decode("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH", Chain::Bitcoin.params()).unwrap();
    assert!(matches!(
        wallet.spend(1, &dest, FeeLevel::Normal, false).await,
        Err(WalletError::DustAmount)
    ));

    let txid = wallet
        .spend(1_000_000, &dest, FeeLevel::Normal, false)
        .await
        .unwrap();
    let raw = client.broadcasts.lock().unwrap()[0].clone();
    let spend = Transaction::deserialize(&raw).unwrap();
    assert_eq!(spend.txid(), txid);
    assert_eq!(spend.inputs.len(), 1);
    assert_eq!(spend.outputs.len(), 2);

    let fee = 1_500_000 - spend.total_output_value();
    assert_eq!(fee, 2_290);
    let change = spend
        .outputs
        .iter()
        .find(|o| o.script_pubkey != dest.to_script())
        .unwrap();
    assert_eq!(change.value, 497_710);
    let change_key = keys.key_for_script(&change.script_pubkey[3..23]).unwrap();
    assert_eq!(change_key.purpose, KeyPurpose::Internal);

    // <sig> <pubkey> with a signature that verifies against the key
    let script_sig = &spend.inputs[0].script_sig;
    let sig_len = script_sig[0] as usize;
    let signature = &script_sig[1..1 + sig_len];
    let pubkey = &script_sig[2 + sig_len..];
    let signer = keys.key_for_script(pubkey).unwrap();
    assert_eq!(signer.address(Chain::Bitcoin.params()), receive);
    assert!(verify_input(
        TxFormat::Legacy,
        &TxFormat::Legacy.decode(&raw).unwrap(),
        0,
        &receive.to_script(),
        1_500_000,
        pubkey,
        signature,
    )
    .unwrap());

    let detail = wallet.transaction(&txid).await.unwrap();
    assert_eq!(detail.status, TxStatus::Unconfirmed);
    wallet.close().await;
}

// ─── Conflict resolution through notifications ──────────────────────

#[tokio::test]
async fn double_spends_resolve_through_notifications() {
    let (wallet, client, keys) = xprv_wallet();
    let receive = wallet.current_address(KeyPurpose::External).unwrap();
    let funding = transfer(
        &[OutPoint::new([0xEE; 32], 0)],
        vec![TxOut::new(500_000, receive.to_script())],
    );
    client.record(funding.serialize(), 990);
    wallet.start().await.unwrap();
    let w = &wallet;
    wait_for(move || async move { w.balance().await.unwrap().confirmed == 500_000 }).await;

    let coin = OutPoint::new(funding.txid(), 0);
    let change_script = keys.current_key(KeyPurpose::Internal).unwrap().script_pubkey();
    let first = transfer(
        &[coin],
        vec![
            TxOut::new(100_000, foreign_script()),
            TxOut::new(399_000, change_script),
        ],
    );
    let second = transfer(&[coin], vec![TxOut::new(499_000, foreign_script())]);
    let marker = transfer(
        &[OutPoint::new([0xDD; 32], 0)],
        vec![TxOut::new(7_000, receive.to_script())],
    );

    // unconfirmed against unconfirmed: first seen wins
    client.notify(first.serialize(), 0).await;
    client.notify(second.serialize(), 0).await;
    client.notify(marker.serialize(), 0).await;
    let marker_id = marker.txid();
    wait_for(move || async move { w.transaction(&marker_id).await.is_ok() }).await;
    assert!(wallet.transaction(&second.txid()).await.is_err());
    assert_eq!(
        wallet.transaction(&first.txid()).await.unwrap().status,
        TxStatus::Unconfirmed
    );

    // a confirmed conflict evicts the unconfirmed spend
    client.notify(second.serialize(), 1_001).await;
    let first_id = first.txid();
    wait_for(move || async move {
        w.transaction(&first_id)
            .await
            .is_ok_and(|d| d.status == TxStatus::Dead)
    })
    .await;
    let second_detail = wallet.transaction(&second.txid()).await.unwrap();
    assert_eq!(second_detail.txn.height, 1_001);
    let balance = wallet.balance().await.unwrap();
    assert_eq!(balance.confirmed, 0);
    assert_eq!(balance.unconfirmed, 7_000);

    wallet.close().await;
}

// ─── Escrow ─────────────────────────────────────────────────────────

#[tokio::test]
async fn zcash_escrow_combines_in_either_order() {
    let config = WalletConfig::for_chain(Chain::Zcash);
    let wallet = Wallet::from_mnemonic(
        &config,
        TEST_MNEMONIC,
        "",
        Arc::new(ScriptedClient::default()),
        Box::new(MemoryDatastore::new()),
        None,
    )
    .unwrap();

    let buyer = PrivateKey::from_bytes(&[0x11; 32]).unwrap();
    let vendor = PrivateKey::from_bytes(&[0x22; 32]).unwrap();
    let moderator = PrivateKey::from_bytes(&[0x33; 32]).unwrap();
    let pubkeys: Vec<Vec<u8>> = [&buyer, &vendor, &moderator]
        .iter()
        .map(|k| k.public_key().unwrap().to_vec())
        .collect();
    let (address, redeem) = wallet
        .generate_multisig_script(&pubkeys, 2, Duration::from_secs(3 * 3600), Some(pubkeys[1].as_slice()))
        .unwrap();
    assert!(address.to_string().starts_with("t3"));

    let inputs = [EscrowInput {
        outpoint: OutPoint::new([0x44; 32], 0),
        value: 1_000_000,
    }];
    let outputs = [EscrowOutput {
        address: wallet.current_address(KeyPurpose::External).unwrap(),
        value: 1_000_000,
    }];
    let buyer_sigs = wallet
        .create_multisig_signature(&inputs, &outputs, &buyer, &redeem, 5)
        .unwrap();
    let moderator_sigs = wallet
        .create_multisig_signature(&inputs, &outputs, &moderator, &redeem, 5)
        .unwrap();

    let one = wallet
        .multisign(&inputs, &outputs, &buyer_sigs, &moderator_sigs, &redeem, 5, false)
        .await
        .unwrap();
    let other = wallet
        .multisign(&inputs, &outputs, &moderator_sigs, &buyer_sigs, &redeem, 5, false)
        .await
        .unwrap();
    assert_eq!(one, other);
    // Sapling v4 with the overwintered flag
    assert_eq!(&one[..4], &[0x04, 0x00, 0x00, 0x80]);
}

// ─── Keys and config ────────────────────────────────────────────────

#[test]
fn mnemonic_wallet_uses_bip44_paths() {
    let wallet = Wallet::from_mnemonic(
        &WalletConfig::default(),
        TEST_MNEMONIC,
        "",
        Arc::new(ScriptedClient::default()),
        Box::new(MemoryDatastore::new()),
        None,
    )
    .unwrap();
    assert_eq!(
        wallet.current_address(KeyPurpose::External).unwrap().to_string(),
        "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA"
    );
}

#[test]
fn toml_config_selects_chain() {
    let config = WalletConfig::from_toml_str(
        r#"
        chain = "litecoin"
        lookahead_window = 3

        [fees]
        normal_fee = 25
        "#,
    )
    .unwrap();
    let wallet = Wallet::from_mnemonic(
        &config,
        TEST_MNEMONIC,
        "",
        Arc::new(ScriptedClient::default()),
        Box::new(MemoryDatastore::new()),
        None,
    )
    .unwrap();
    assert_eq!(wallet.chain(), Chain::Litecoin);
    assert!(wallet
        .current_address(KeyPurpose::External)
        .unwrap()
        .to_string()
        .starts_with('L'));
    assert_eq!(wallet.fee_per_byte(FeeLevel::Normal), 25);
}

//! Input signing for wallet-built transactions.

use std::collections::HashMap;

use chain_btc::address::Address;
use chain_btc::network::NetworkParams;
use chain_btc::script::p2pkh_signature_script;
use chain_btc::sighash::SigHashType;
use chain_btc::transaction::{txid_to_hex, OutPoint};
use crypto_utils::ecdsa::{verify_digest, PrivateKey};

use crate::chain_tx::{ChainTx, TxFormat};
use crate::coinselect::Coin;
use crate::error::WalletError;
use crate::interfaces::KeyManager;

/// SIGHASH_ALL signature of one input: DER followed by the hash type byte.
pub fn sign_input(
    format: TxFormat,
    tx: &ChainTx,
    input_index: usize,
    prev_script: &[u8],
    value: i64,
    key: &PrivateKey,
) -> Result<Vec<u8>, WalletError> {
    let digest = format.signature_hash(tx, input_index, prev_script, SigHashType::ALL, value)?;
    let mut signature = key.sign_digest(&digest)?;
    signature.push(SigHashType::ALL.to_byte());
    Ok(signature)
}

/// Check a signature produced by [`sign_input`] against `public_key`.
pub fn verify_input(
    format: TxFormat,
    tx: &ChainTx,
    input_index: usize,
    prev_script: &[u8],
    value: i64,
    public_key: &[u8],
    signature: &[u8],
) -> Result<bool, WalletError> {
    let Some((&hash_type, der)) = signature.split_last() else {
        return Ok(false);
    };
    let digest = format.signature_hash(
        tx,
        input_index,
        prev_script,
        SigHashType(hash_type as u32),
        value,
    )?;
    Ok(verify_digest(public_key, &digest, der)?)
}

/// Sign every input as P2PKH `<sig> <pubkey>`. `coins` supplies the
/// previous script and value of each spent outpoint.
pub fn sign_p2pkh_inputs(
    format: TxFormat,
    tx: &mut ChainTx,
    coins: &[Coin],
    keys: &dyn KeyManager,
    params: &NetworkParams,
) -> Result<(), WalletError> {
    let by_outpoint: HashMap<OutPoint, &Coin> = coins.iter().map(|c| (c.outpoint, c)).collect();

    for i in 0..tx.inputs_len() {
        let outpoint = tx.transparent().inputs[i].previous_output;
        let coin = by_outpoint.get(&outpoint).ok_or_else(|| {
            WalletError::NotFound(format!("previous output {outpoint}"))
        })?;
        let address = Address::from_script(&coin.script_pubkey, params)?;
        let key = keys.key_for_script(&address.script_address())?;
        let signature = sign_input(
            format,
            tx,
            i,
            &coin.script_pubkey,
            coin.value,
            key.signing_key()?,
        )?;
        tx.transparent_mut().inputs[i].script_sig =
            p2pkh_signature_script(&signature, &key.public_key);
    }
    tracing::debug!(txid = %txid_to_hex(&tx.txid()), inputs = tx.inputs_len(), "signed transaction");
    Ok(())
}

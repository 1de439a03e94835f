//! Transaction assembly: coin selection under a fee target, change, and the
//! sweep variants.
//!
//! Fees are computed from worst-case signed sizes, so a transaction built
//! here never underpays once its inputs are signed.

use std::collections::HashMap;

use chain_btc::address::Address;
use chain_btc::network::NetworkParams;
use chain_btc::script::{
    lock_sequence_from_redeem_script, multisig_signature_script, p2pkh_script,
    p2pkh_signature_script, timeout_signature_script, witness_program_script, OP_IF,
};
use chain_btc::transaction::{OutPoint, Transaction, TxIn, TxOut};
use chain_btc::txrules::{
    estimate_serialize_size, fee_for_serialize_size, is_dust_amount, InputKind,
    DEFAULT_RELAY_FEE_PER_KB,
};
use crypto_utils::ecdsa::PrivateKey;

use crate::chain_tx::{ChainTx, TxFormat};
use crate::coinselect::{select_coins, Coin};
use crate::error::WalletError;
use crate::signer::sign_input;

/// Inputs opt in to replace-by-fee.
const RBF_SEQUENCE: u32 = 0;

/// A BIP-69 sorted transaction whose inputs are not yet signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub tx: Transaction,
    /// Position of the change output after sorting.
    pub change_index: Option<usize>,
    pub total_input: i64,
    /// The coins spent, in selection order.
    pub coins: Vec<Coin>,
}

impl UnsignedTransaction {
    pub fn fee(&self) -> i64 {
        self.total_input - self.tx.total_output_value()
    }
}

/// Reject `amount` if paying it to `script` would create a dust output.
pub fn check_dust(amount: i64, script: &[u8]) -> Result<(), WalletError> {
    if is_dust_amount(amount, script.len(), DEFAULT_RELAY_FEE_PER_KB) {
        return Err(WalletError::DustAmount);
    }
    Ok(())
}

/// Select coins covering `outputs` plus the fee at `fee_per_kb`, adding a
/// change output to `change_script` unless the change is zero or dust.
pub fn build_transaction(
    coins: &[Coin],
    outputs: Vec<TxOut>,
    fee_per_kb: u64,
    change_script: &[u8],
    version: i32,
) -> Result<UnsignedTransaction, WalletError> {
    let target: i64 = outputs.iter().map(|o| o.value).sum();
    let initial_size = estimate_serialize_size(1, &outputs, true, InputKind::P2pkh);
    let mut target_fee = fee_for_serialize_size(fee_per_kb, initial_size) as i64;

    loop {
        let selected = select_coins(coins, target + target_fee)?;
        let total_input: i64 = selected.iter().map(|c| c.value).sum();

        let max_signed_size =
            estimate_serialize_size(selected.len(), &outputs, true, InputKind::P2pkh);
        let max_required_fee = fee_for_serialize_size(fee_per_kb, max_signed_size) as i64;
        if total_input - target < max_required_fee {
            target_fee = max_required_fee;
            continue;
        }

        let mut tx = Transaction::new(version);
        tx.inputs = selected.iter().map(|c| unsigned_input(c.outpoint)).collect();
        tx.outputs = outputs;

        let change = total_input - target - max_required_fee;
        let mut change_output = None;
        if change != 0 && !is_dust_amount(change, change_script.len(), DEFAULT_RELAY_FEE_PER_KB) {
            let output = TxOut::new(change, change_script.to_vec());
            tx.outputs.push(output.clone());
            change_output = Some(output);
        }

        tx.sort_bip69();
        let change_index =
            change_output.and_then(|c| tx.outputs.iter().position(|o| *o == c));

        return Ok(UnsignedTransaction {
            tx,
            change_index,
            total_input,
            coins: selected,
        });
    }
}

/// Spend every coin to `destination_script` with no change.
pub fn build_sweep_all(
    coins: &[Coin],
    destination_script: &[u8],
    fee_per_byte: u64,
    version: i32,
) -> Result<UnsignedTransaction, WalletError> {
    if coins.is_empty() {
        return Err(WalletError::InsufficientFunds {
            needed: 1,
            available: 0,
        });
    }
    let total_input: i64 = coins.iter().map(|c| c.value).sum();
    let fee = estimate_fee(
        coins.len(),
        &[TxOut::new(0, destination_script.to_vec())],
        fee_per_byte,
        InputKind::P2pkh,
    ) as i64;
    let value = total_input - fee;
    check_dust(value, destination_script)?;

    let mut tx = Transaction::new(version);
    tx.inputs = coins.iter().map(|c| unsigned_input(c.outpoint)).collect();
    tx.outputs.push(TxOut::new(value, destination_script.to_vec()));
    tx.sort_bip69();

    Ok(UnsignedTransaction {
        tx,
        change_index: None,
        total_input,
        coins: coins.to_vec(),
    })
}

/// Flat per-byte estimate for `input_count` inputs of `kind` paying
/// `outputs`, without change.
pub fn estimate_fee(
    input_count: usize,
    outputs: &[TxOut],
    fee_per_byte: u64,
    kind: InputKind,
) -> u64 {
    estimate_serialize_size(input_count, outputs, false, kind) as u64 * fee_per_byte
}

/// Placeholder destination used when estimating fees for a spend.
pub fn estimation_script(params: &NetworkParams) -> Vec<u8> {
    match params.bech32_hrp {
        Some(_) => witness_program_script(0, &[0u8; 32]),
        None => p2pkh_script(&[0u8; 20]),
    }
}

fn unsigned_input(outpoint: OutPoint) -> TxIn {
    TxIn {
        previous_output: outpoint,
        script_sig: Vec::new(),
        sequence: RBF_SEQUENCE,
    }
}

// ─── Sweeps ─────────────────────────────────────────────────────────

/// An output to sweep, identified by outpoint and the address it pays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepInput {
    pub outpoint: OutPoint,
    pub value: i64,
    pub linked_address: Address,
}

/// Spend `inputs`, all controlled by `key`, to a single output.
///
/// Without a redeem script the inputs are P2PKH. With one they are P2SH:
/// a timeout script (starting with OP_IF) is spent through its ELSE branch,
/// anything else as a 1-signature multisig.
pub fn sweep_transaction(
    format: TxFormat,
    inputs: &[SweepInput],
    destination_script: &[u8],
    key: &PrivateKey,
    redeem_script: Option<&[u8]>,
    fee_per_byte: u64,
) -> Result<ChainTx, WalletError> {
    if inputs.is_empty() {
        return Err(WalletError::InsufficientFunds {
            needed: 1,
            available: 0,
        });
    }

    let kind = match redeem_script {
        None => InputKind::P2pkh,
        Some(rs) if lock_sequence_from_redeem_script(rs).is_ok() => InputKind::P2shTimelock1Sig,
        Some(_) => InputKind::P2sh1of2Multisig,
    };
    let timeout_lock = match redeem_script {
        Some(rs) if rs.first() == Some(&OP_IF) => Some(lock_sequence_from_redeem_script(rs)?),
        _ => None,
    };

    let total: i64 = inputs.iter().map(|i| i.value).sum();
    let output = TxOut::new(0, destination_script.to_vec());
    let fee = estimate_fee(inputs.len(), std::slice::from_ref(&output), fee_per_byte, kind) as i64;

    let mut tx = Transaction::new(if timeout_lock.is_some() { 2 } else { 1 });
    tx.inputs = inputs
        .iter()
        .map(|i| TxIn {
            previous_output: i.outpoint,
            script_sig: Vec::new(),
            sequence: timeout_lock.unwrap_or(RBF_SEQUENCE),
        })
        .collect();
    tx.outputs.push(TxOut {
        value: (total - fee).max(0),
        ..output
    });
    tx.sort_bip69();

    let values: HashMap<OutPoint, &SweepInput> = inputs.iter().map(|i| (i.outpoint, i)).collect();
    let public_key = key.public_key()?;
    let mut chain_tx = format.wrap(tx);

    for i in 0..chain_tx.inputs_len() {
        let outpoint = chain_tx.transparent().inputs[i].previous_output;
        let input = values
            .get(&outpoint)
            .ok_or_else(|| WalletError::NotFound(format!("sweep input {outpoint}")))?;
        let prev_script = match redeem_script {
            Some(rs) => rs.to_vec(),
            None => input.linked_address.to_script(),
        };
        let signature = sign_input(format, &chain_tx, i, &prev_script, input.value, key)?;
        chain_tx.transparent_mut().inputs[i].script_sig = match (redeem_script, timeout_lock) {
            (None, _) => p2pkh_signature_script(&signature, &public_key),
            (Some(rs), Some(_)) => timeout_signature_script(&signature, rs),
            (Some(rs), None) => multisig_signature_script(&[&signature], rs, false),
        };
    }
    Ok(chain_tx)
}

//! ZIP-243 signature hash for transparent inputs of Sapling v4 transactions.

use chain_btc::encoding::write_var_bytes;
use chain_btc::sighash::SigHashType;
use crypto_utils::hash::blake2b_256;

use crate::error::ZecError;
use crate::transaction::ZecTransaction;

const PREVOUTS_PERSONALIZATION: &[u8; 16] = b"ZcashPrevoutHash";
const SEQUENCE_PERSONALIZATION: &[u8; 16] = b"ZcashSequencHash";
const OUTPUTS_PERSONALIZATION: &[u8; 16] = b"ZcashOutputsHash";
const SIGHASH_PERSONALIZATION_PREFIX: &[u8; 12] = b"ZcashSigHash";

/// Signature hash of transparent input `input_index`.
///
/// `amount` is the value of the output being spent and `prev_script` the
/// script being satisfied (scriptPubKey, or the redeem script for P2SH).
pub fn signature_hash(
    tx: &ZecTransaction,
    input_index: usize,
    prev_script: &[u8],
    hash_type: SigHashType,
    amount: u64,
    branch_id: u32,
) -> Result<[u8; 32], ZecError> {
    let transparent = &tx.transparent;
    let input = transparent.inputs.get(input_index).ok_or_else(|| {
        ZecError::SigningError(format!(
            "input index {input_index} out of range for {} inputs",
            transparent.inputs.len()
        ))
    })?;
    if !tx.is_transparent_only() {
        return Err(ZecError::SigningError(
            "signing transactions with shielded parts is not supported".into(),
        ));
    }

    let mut preimage = Vec::with_capacity(256);
    preimage.extend_from_slice(&tx.header().to_le_bytes());
    preimage.extend_from_slice(&tx.version_group_id.to_le_bytes());
    preimage.extend_from_slice(&hash_prevouts(tx, hash_type));
    preimage.extend_from_slice(&hash_sequence(tx, hash_type));
    preimage.extend_from_slice(&hash_outputs(tx, input_index, hash_type));
    preimage.extend_from_slice(&[0u8; 32]); // hashJoinSplits
    preimage.extend_from_slice(&[0u8; 32]); // hashShieldedSpends
    preimage.extend_from_slice(&[0u8; 32]); // hashShieldedOutputs
    preimage.extend_from_slice(&transparent.lock_time.to_le_bytes());
    preimage.extend_from_slice(&tx.expiry_height.to_le_bytes());
    preimage.extend_from_slice(&tx.value_balance.to_le_bytes());
    preimage.extend_from_slice(&hash_type.0.to_le_bytes());

    preimage.extend_from_slice(&input.previous_output.txid);
    preimage.extend_from_slice(&input.previous_output.vout.to_le_bytes());
    write_var_bytes(&mut preimage, prev_script);
    preimage.extend_from_slice(&amount.to_le_bytes());
    preimage.extend_from_slice(&input.sequence.to_le_bytes());

    Ok(blake2b_256(&sighash_personalization(branch_id), &preimage))
}

/// "ZcashSigHash" followed by the little-endian branch id.
pub fn sighash_personalization(branch_id: u32) -> [u8; 16] {
    let mut persona = [0u8; 16];
    persona[..12].copy_from_slice(SIGHASH_PERSONALIZATION_PREFIX);
    persona[12..].copy_from_slice(&branch_id.to_le_bytes());
    persona
}

fn hash_prevouts(tx: &ZecTransaction, hash_type: SigHashType) -> [u8; 32] {
    if hash_type.anyone_can_pay() {
        return [0u8; 32];
    }
    let mut data = Vec::with_capacity(tx.transparent.inputs.len() * 36);
    for input in &tx.transparent.inputs {
        data.extend_from_slice(&input.previous_output.txid);
        data.extend_from_slice(&input.previous_output.vout.to_le_bytes());
    }
    blake2b_256(PREVOUTS_PERSONALIZATION, &data)
}

fn hash_sequence(tx: &ZecTransaction, hash_type: SigHashType) -> [u8; 32] {
    if hash_type.anyone_can_pay() || hash_type.is_single() || hash_type.is_none() {
        return [0u8; 32];
    }
    let mut data = Vec::with_capacity(tx.transparent.inputs.len() * 4);
    for input in &tx.transparent.inputs {
        data.extend_from_slice(&input.sequence.to_le_bytes());
    }
    blake2b_256(SEQUENCE_PERSONALIZATION, &data)
}

fn hash_outputs(tx: &ZecTransaction, input_index: usize, hash_type: SigHashType) -> [u8; 32] {
    let outputs = &tx.transparent.outputs;
    let selected = if !hash_type.is_single() && !hash_type.is_none() {
        outputs.as_slice()
    } else if hash_type.is_single() && input_index < outputs.len() {
        &outputs[input_index..=input_index]
    } else {
        return [0u8; 32];
    };
    let mut data = Vec::new();
    for output in selected {
        data.extend_from_slice(&output.value.to_le_bytes());
        write_var_bytes(&mut data, &output.script_pubkey);
    }
    blake2b_256(OUTPUTS_PERSONALIZATION, &data)
}

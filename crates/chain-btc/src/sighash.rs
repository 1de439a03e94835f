use crypto_utils::hash::double_sha256;

use crate::error::BtcError;
use crate::transaction::{Transaction, TxOut};

pub const SIGHASH_ALL: u32 = 0x01;
pub const SIGHASH_NONE: u32 = 0x02;
pub const SIGHASH_SINGLE: u32 = 0x03;
pub const SIGHASH_ANYONECANPAY: u32 = 0x80;

/// Bits of the hash type that select the output mode.
pub const SIGHASH_MASK: u32 = 0x1f;

/// Signature hash type as committed in the signature's trailing byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigHashType(pub u32);

impl SigHashType {
    pub const ALL: SigHashType = SigHashType(SIGHASH_ALL);
    pub const NONE: SigHashType = SigHashType(SIGHASH_NONE);
    pub const SINGLE: SigHashType = SigHashType(SIGHASH_SINGLE);

    pub fn with_anyone_can_pay(self) -> Self {
        SigHashType(self.0 | SIGHASH_ANYONECANPAY)
    }

    pub fn base(self) -> u32 {
        self.0 & SIGHASH_MASK
    }

    pub fn anyone_can_pay(self) -> bool {
        self.0 & SIGHASH_ANYONECANPAY != 0
    }

    pub fn is_none(self) -> bool {
        self.base() == SIGHASH_NONE
    }

    pub fn is_single(self) -> bool {
        self.base() == SIGHASH_SINGLE
    }

    /// Byte appended to a DER signature.
    pub fn to_byte(self) -> u8 {
        self.0 as u8
    }
}

/// Original (pre-segwit) signature hash of input `input_index`.
///
/// `prev_script` is the script being satisfied: the previous output's
/// scriptPubKey, or the redeem script for P2SH spends.
pub fn legacy_signature_hash(
    tx: &Transaction,
    input_index: usize,
    prev_script: &[u8],
    hash_type: SigHashType,
) -> Result<[u8; 32], BtcError> {
    if input_index >= tx.inputs.len() {
        return Err(BtcError::SigningError(format!(
            "input index {input_index} out of range for {} inputs",
            tx.inputs.len()
        )));
    }
    if hash_type.is_single() && input_index >= tx.outputs.len() {
        return Err(BtcError::SigningError(format!(
            "SIGHASH_SINGLE input {input_index} has no matching output"
        )));
    }

    let mut copy = tx.clone();
    for (i, input) in copy.inputs.iter_mut().enumerate() {
        input.script_sig = if i == input_index {
            prev_script.to_vec()
        } else {
            Vec::new()
        };
    }

    if hash_type.is_none() {
        copy.outputs.clear();
        zero_other_sequences(&mut copy, input_index);
    } else if hash_type.is_single() {
        copy.outputs.truncate(input_index + 1);
        for output in copy.outputs.iter_mut().take(input_index) {
            *output = TxOut::new(-1, Vec::new());
        }
        zero_other_sequences(&mut copy, input_index);
    }

    if hash_type.anyone_can_pay() {
        let signed = copy.inputs.swap_remove(input_index);
        copy.inputs = vec![signed];
    }

    let mut preimage = copy.serialize();
    preimage.extend_from_slice(&hash_type.0.to_le_bytes());
    Ok(double_sha256(&preimage))
}

fn zero_other_sequences(tx: &mut Transaction, input_index: usize) {
    for (i, input) in tx.inputs.iter_mut().enumerate() {
        if i != input_index {
            input.sequence = 0;
        }
    }
}

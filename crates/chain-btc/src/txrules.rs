//! Worst-case size estimation, fee-for-size and dust rules.
//!
//! Sizes are for fully signed transactions so a fee computed before signing
//! still covers the final serialization.

use crate::encoding::compact_size_len;
use crate::transaction::TxOut;

/// Minimum relay fee, in base units per kilobyte.
pub const DEFAULT_RELAY_FEE_PER_KB: u64 = 1000;

/// 21 million coins in base units.
pub const MAX_MONEY: i64 = 21_000_000 * 100_000_000;

/// OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG
pub const P2PKH_PK_SCRIPT_SIZE: usize = 1 + 1 + 1 + 20 + 1 + 1;

/// value + script length + script
pub const P2PKH_OUTPUT_SIZE: usize = 8 + 1 + P2PKH_PK_SCRIPT_SIZE;

/// <push 73-byte sig> <push 33-byte compressed key>
pub const REDEEM_P2PKH_SIG_SCRIPT_SIZE: usize = 1 + 73 + 1 + 33;

/// 2 <33-byte key> x3 3 CHECKMULTISIG
const MULTISIG_2OF3_SCRIPT_SIZE: usize = 1 + 3 * (1 + 33) + 1 + 1;

/// 1 <33-byte key> x2 2 CHECKMULTISIG
const MULTISIG_1OF2_SCRIPT_SIZE: usize = 1 + 2 * (1 + 33) + 1 + 1;

/// IF <2-of-3> ELSE <2-byte lock> CSV DROP <33-byte key> CHECKSIG ENDIF
const TIMELOCK_SCRIPT_SIZE: usize =
    1 + MULTISIG_2OF3_SCRIPT_SIZE + 1 + (1 + 2) + 1 + 1 + (1 + 33) + 1 + 1;

/// Push opcode(s) needed for a redeem script of `len` bytes.
const fn push_size(len: usize) -> usize {
    if len <= 75 {
        1 + len
    } else if len <= 0xFF {
        2 + len
    } else {
        3 + len
    }
}

/// One pushed signature: push opcode + 72-byte DER + sighash byte.
const SIG_PUSH_SIZE: usize = 1 + 73;

/// OP_0 <sig> <sig> <2-of-3 redeem>
pub const REDEEM_2OF3_SIG_SCRIPT_SIZE: usize =
    1 + 2 * SIG_PUSH_SIZE + push_size(MULTISIG_2OF3_SCRIPT_SIZE);

/// OP_0 <sig> <1-of-2 redeem>
pub const REDEEM_1OF2_SIG_SCRIPT_SIZE: usize =
    1 + SIG_PUSH_SIZE + push_size(MULTISIG_1OF2_SCRIPT_SIZE);

/// <sig> OP_0 <timelock redeem>
pub const REDEEM_TIMELOCK_1SIG_SIG_SCRIPT_SIZE: usize =
    SIG_PUSH_SIZE + 1 + push_size(TIMELOCK_SCRIPT_SIZE);

/// OP_0 <sig> <sig> OP_1 <timelock redeem>
pub const REDEEM_TIMELOCK_2SIG_SIG_SCRIPT_SIZE: usize =
    1 + 2 * SIG_PUSH_SIZE + 1 + push_size(TIMELOCK_SCRIPT_SIZE);

/// Input script shape used for size estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    P2pkh,
    P2sh2of3Multisig,
    P2sh1of2Multisig,
    P2shTimelock1Sig,
    P2shTimelock2Sigs,
}

impl InputKind {
    pub fn signature_script_size(self) -> usize {
        match self {
            InputKind::P2pkh => REDEEM_P2PKH_SIG_SCRIPT_SIZE,
            InputKind::P2sh2of3Multisig => REDEEM_2OF3_SIG_SCRIPT_SIZE,
            InputKind::P2sh1of2Multisig => REDEEM_1OF2_SIG_SCRIPT_SIZE,
            InputKind::P2shTimelock1Sig => REDEEM_TIMELOCK_1SIG_SIG_SCRIPT_SIZE,
            InputKind::P2shTimelock2Sigs => REDEEM_TIMELOCK_2SIG_SIG_SCRIPT_SIZE,
        }
    }

    /// outpoint + script length + script + sequence
    pub fn input_size(self) -> usize {
        let script = self.signature_script_size();
        32 + 4 + compact_size_len(script as u64) + script + 4
    }
}

pub fn output_serialize_size(script_len: usize) -> usize {
    8 + compact_size_len(script_len as u64) + script_len
}

/// Worst-case serialized size of a transaction spending `input_count`
/// inputs of `kind` to `outputs`, plus a P2PKH change output if requested.
pub fn estimate_serialize_size(
    input_count: usize,
    outputs: &[TxOut],
    add_change_output: bool,
    kind: InputKind,
) -> usize {
    let mut output_count = outputs.len();
    let mut change_size = 0;
    if add_change_output {
        output_count += 1;
        change_size = P2PKH_OUTPUT_SIZE;
    }
    let outputs_size: usize = outputs.iter().map(|o| o.serialize_size()).sum();

    // 10 bytes cover version, lock time and a little slack.
    10 + compact_size_len(input_count as u64)
        + compact_size_len(output_count as u64)
        + input_count * kind.input_size()
        + outputs_size
        + change_size
}

/// Fee for `size` bytes at `fee_per_kb`. Never zero when the rate is
/// non-zero, and never above the money supply.
pub fn fee_for_serialize_size(fee_per_kb: u64, size: usize) -> u64 {
    let mut fee = fee_per_kb.saturating_mul(size as u64) / 1000;
    if fee == 0 && fee_per_kb > 0 {
        fee = fee_per_kb;
    }
    fee.min(MAX_MONEY as u64)
}

/// An output is dust when spending it would cost more than a third of its
/// value at the relay fee. The spending input is assumed to be a compressed
/// P2PKH redeem (148 bytes).
pub fn is_dust_amount(amount: i64, script_len: usize, relay_fee_per_kb: u64) -> bool {
    let total_size = output_serialize_size(script_len) + 148;
    let cost_per_kb = (amount as i128) * 1000 / (3 * total_size as i128);
    cost_per_kb < relay_fee_per_kb as i128
}

pub fn is_dust_output(output: &TxOut, relay_fee_per_kb: u64) -> bool {
    is_dust_amount(output.value, output.script_pubkey.len(), relay_fee_per_kb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p2pkh_sizes() {
        assert_eq!(P2PKH_PK_SCRIPT_SIZE, 25);
        assert_eq!(P2PKH_OUTPUT_SIZE, 34);
        assert_eq!(REDEEM_P2PKH_SIG_SCRIPT_SIZE, 108);
        assert_eq!(InputKind::P2pkh.input_size(), 149);
    }

    #[test]
    fn escrow_script_sizes() {
        assert_eq!(MULTISIG_2OF3_SCRIPT_SIZE, 105);
        assert_eq!(MULTISIG_1OF2_SCRIPT_SIZE, 71);
        assert_eq!(TIMELOCK_SCRIPT_SIZE, 148);
        assert_eq!(REDEEM_2OF3_SIG_SCRIPT_SIZE, 1 + 148 + 107);
        assert_eq!(InputKind::P2sh2of3Multisig.input_size(), 32 + 4 + 3 + 256 + 4);
        assert_eq!(REDEEM_1OF2_SIG_SCRIPT_SIZE, 1 + 74 + 72);
        assert_eq!(InputKind::P2sh1of2Multisig.input_size(), 32 + 4 + 1 + 147 + 4);
        assert!(InputKind::P2shTimelock2Sigs.input_size() > InputKind::P2shTimelock1Sig.input_size());
    }

    #[test]
    fn estimate_one_in_two_out() {
        let outputs = vec![TxOut::new(1, vec![0u8; 25])];
        // 10 + 1 + 1 + 149 + 34 + 34
        assert_eq!(
            estimate_serialize_size(1, &outputs, true, InputKind::P2pkh),
            229
        );
        assert_eq!(
            estimate_serialize_size(1, &outputs, false, InputKind::P2pkh),
            195
        );
    }

    #[test]
    fn fee_for_size_floor() {
        assert_eq!(fee_for_serialize_size(10_000, 229), 2290);
        assert_eq!(fee_for_serialize_size(1, 10), 1);
        assert_eq!(fee_for_serialize_size(0, 500), 0);
    }

    #[test]
    fn p2pkh_dust_threshold_is_546() {
        assert!(is_dust_amount(545, 25, DEFAULT_RELAY_FEE_PER_KB));
        assert!(!is_dust_amount(546, 25, DEFAULT_RELAY_FEE_PER_KB));
        assert!(is_dust_amount(1, 25, DEFAULT_RELAY_FEE_PER_KB));
        assert!(is_dust_amount(0, 25, DEFAULT_RELAY_FEE_PER_KB));
    }

    #[test]
    fn p2sh_dust_threshold() {
        // 8 + 1 + 23 + 148 = 180 -> 540
        assert!(is_dust_amount(539, 23, DEFAULT_RELAY_FEE_PER_KB));
        assert!(!is_dust_amount(540, 23, DEFAULT_RELAY_FEE_PER_KB));
    }

    #[test]
    fn dust_output_helper() {
        assert!(is_dust_output(&TxOut::new(100, vec![0; 25]), 1000));
        assert!(!is_dust_output(&TxOut::new(100_000, vec![0; 25]), 1000));
    }
}

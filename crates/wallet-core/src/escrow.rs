//! Multisig escrow: redeem script generation, partial signatures and their
//! combination into a spendable P2SH transaction.
//!
//! Both parties rebuild the same unsigned transaction from the same inputs,
//! outputs and fee rate, so signatures made independently line up by input
//! index after BIP-69 sorting.

use std::collections::HashMap;
use std::time::Duration;

use chain_btc::address::Address;
use chain_btc::network::NetworkParams;
use chain_btc::script::{
    lock_sequence_from_redeem_script, multisig_script, multisig_signature_script, parse_script,
    timeout_multisig_script, OP_ELSE,
};
use chain_btc::transaction::{OutPoint, Transaction, TxIn, TxOut};
use chain_btc::txrules::InputKind;
use crypto_utils::ecdsa::{compress_public_key, PrivateKey};
use serde::{Deserialize, Serialize};

use crate::builder::estimate_fee;
use crate::chain_tx::{ChainTx, TxFormat};
use crate::error::WalletError;
use crate::signer::{sign_input, verify_input};

/// Blocks per hour of escrow timeout.
const BLOCKS_PER_HOUR: u64 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscrowInput {
    pub outpoint: OutPoint,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowOutput {
    pub address: Address,
    pub value: i64,
}

/// One party's signature over one (sorted) input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowSignature {
    pub input_index: u32,
    pub signature: Vec<u8>,
}

/// Build a `threshold`-of-n redeem script over `pubkeys` and its P2SH
/// address. A non-zero `timeout` (whole hours) adds a CSV branch that lets
/// `timeout_key` spend alone after `hours × 6` blocks.
pub fn generate_script(
    pubkeys: &[Vec<u8>],
    threshold: usize,
    timeout: Duration,
    timeout_key: Option<&[u8]>,
    params: &NetworkParams,
) -> Result<(Address, Vec<u8>), WalletError> {
    let hours = timeout.as_secs() / 3600;
    if hours > 0 && timeout_key.is_none() {
        return Err(WalletError::Escrow(
            "timeout key required when using an escrow timeout".into(),
        ));
    }
    if threshold > pubkeys.len() {
        return Err(WalletError::Escrow(format!(
            "{threshold} signatures required but only {} public keys given",
            pubkeys.len()
        )));
    }

    let compressed = pubkeys
        .iter()
        .map(|k| compress_public_key(k).map(|c| c.to_vec()))
        .collect::<Result<Vec<_>, _>>()?;

    let redeem_script = match timeout_key {
        Some(key) if hours > 0 => {
            let sequence = u32::try_from(hours * BLOCKS_PER_HOUR).map_err(|_| {
                WalletError::Escrow(format!("timeout of {hours} hours is too long"))
            })?;
            timeout_multisig_script(threshold, &compressed, sequence, &compress_public_key(key)?)?
        }
        _ => multisig_script(threshold, &compressed)?,
    };
    Ok((Address::p2sh_from_script(&redeem_script, params), redeem_script))
}

/// Relative lock, in blocks, of a timeout escrow script.
pub fn lock_time_from_redeem_script(redeem_script: &[u8]) -> Result<u32, WalletError> {
    Ok(lock_sequence_from_redeem_script(redeem_script)?)
}

/// Sign every input of the escrow spend with `key`.
pub fn create_partial_signatures(
    format: TxFormat,
    inputs: &[EscrowInput],
    outputs: &[EscrowOutput],
    key: &PrivateKey,
    redeem_script: &[u8],
    fee_per_byte: u64,
) -> Result<Vec<EscrowSignature>, WalletError> {
    let (tx, values) = escrow_transaction(format, inputs, outputs, redeem_script, fee_per_byte)?;
    (0..tx.inputs_len())
        .map(|i| {
            let value = input_value(&tx, i, &values)?;
            Ok(EscrowSignature {
                input_index: i as u32,
                signature: sign_input(format, &tx, i, redeem_script, value, key)?,
            })
        })
        .collect()
}

/// Assemble the fully signed escrow spend from two parties' signatures.
/// Signatures are placed in redeem-script key order, so the result does not
/// depend on which party's set comes first.
pub fn combine(
    format: TxFormat,
    inputs: &[EscrowInput],
    outputs: &[EscrowOutput],
    sigs_a: &[EscrowSignature],
    sigs_b: &[EscrowSignature],
    redeem_script: &[u8],
    fee_per_byte: u64,
) -> Result<ChainTx, WalletError> {
    let (mut tx, values) = escrow_transaction(format, inputs, outputs, redeem_script, fee_per_byte)?;
    let keys = multisig_keys(redeem_script)?;
    let timelocked = lock_sequence_from_redeem_script(redeem_script).is_ok();

    let mut script_sigs = Vec::with_capacity(tx.inputs_len());
    for i in 0..tx.inputs_len() {
        let value = input_value(&tx, i, &values)?;
        let mut ordered: Vec<(usize, &[u8])> = Vec::with_capacity(2);
        for set in [sigs_a, sigs_b] {
            let sig = set
                .iter()
                .find(|s| s.input_index as usize == i)
                .ok_or_else(|| WalletError::Escrow(format!("missing signature for input {i}")))?;
            let position = keys
                .iter()
                .position(|k| {
                    verify_input(format, &tx, i, redeem_script, value, k, &sig.signature)
                        .unwrap_or(false)
                })
                .ok_or_else(|| {
                    WalletError::Escrow(format!("signature for input {i} matches no escrow key"))
                })?;
            ordered.push((position, &sig.signature));
        }
        ordered.sort_by_key(|(position, _)| *position);
        if ordered[0].0 == ordered[1].0 {
            return Err(WalletError::Escrow(format!(
                "both signatures for input {i} come from the same key"
            )));
        }
        let sigs: Vec<&[u8]> = ordered.iter().map(|(_, s)| *s).collect();
        script_sigs.push(multisig_signature_script(&sigs, redeem_script, timelocked));
    }

    for (input, script_sig) in tx.transparent_mut().inputs.iter_mut().zip(script_sigs) {
        input.script_sig = script_sig;
    }
    Ok(tx)
}

/// The deterministic unsigned spend both parties sign: caller order, fee
/// split evenly across outputs, then BIP-69.
fn escrow_transaction(
    format: TxFormat,
    inputs: &[EscrowInput],
    outputs: &[EscrowOutput],
    redeem_script: &[u8],
    fee_per_byte: u64,
) -> Result<(ChainTx, HashMap<OutPoint, i64>), WalletError> {
    let mut tx = Transaction::new(1);
    tx.inputs = inputs
        .iter()
        .map(|i| TxIn {
            previous_output: i.outpoint,
            script_sig: Vec::new(),
            sequence: u32::MAX,
        })
        .collect();
    tx.outputs = outputs
        .iter()
        .map(|o| TxOut::new(o.value, o.address.to_script()))
        .collect();

    let kind = if lock_sequence_from_redeem_script(redeem_script).is_ok() {
        InputKind::P2shTimelock2Sigs
    } else {
        InputKind::P2sh2of3Multisig
    };
    let fee = estimate_fee(inputs.len(), &tx.outputs, fee_per_byte, kind) as i64;
    if !tx.outputs.is_empty() {
        let share = fee / tx.outputs.len() as i64;
        for output in tx.outputs.iter_mut() {
            output.value -= share;
            if output.value < 0 {
                return Err(WalletError::Escrow(format!(
                    "output cannot cover its fee share of {share}"
                )));
            }
        }
    }
    tx.sort_bip69();

    let values = inputs.iter().map(|i| (i.outpoint, i.value)).collect();
    Ok((format.wrap(tx), values))
}

fn input_value(tx: &ChainTx, index: usize, values: &HashMap<OutPoint, i64>) -> Result<i64, WalletError> {
    let outpoint = tx.transparent().inputs[index].previous_output;
    values
        .get(&outpoint)
        .copied()
        .ok_or_else(|| WalletError::NotFound(format!("escrow input {outpoint}")))
}

/// Public keys of the multisig branch, in script order.
fn multisig_keys(redeem_script: &[u8]) -> Result<Vec<Vec<u8>>, WalletError> {
    Ok(parse_script(redeem_script)?
        .into_iter()
        .take_while(|op| op.opcode != OP_ELSE)
        .filter(|op| op.is_push() && matches!(op.data.len(), 33 | 65))
        .map(|op| op.data)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_btc::network::BITCOIN_MAINNET;
    use chain_btc::script::{classify, ScriptClass, OP_0, OP_1};
    use chain_btc::txrules::estimate_serialize_size;
    use chain_zec::network::{BRANCH_ID_BLOSSOM, ZCASH_MAINNET};

    fn party(b: u8) -> PrivateKey {
        PrivateKey::from_bytes(&[b; 32]).unwrap()
    }

    fn pubkeys() -> Vec<Vec<u8>> {
        [0x31, 0x32, 0x33]
            .iter()
            .map(|b| party(*b).public_key().unwrap().to_vec())
            .collect()
    }

    fn inputs() -> Vec<EscrowInput> {
        vec![
            EscrowInput {
                outpoint: OutPoint::new([9; 32], 1),
                value: 60_000,
            },
            EscrowInput {
                outpoint: OutPoint::new([4; 32], 0),
                value: 40_000,
            },
        ]
    }

    fn outputs(params: &NetworkParams) -> Vec<EscrowOutput> {
        vec![
            EscrowOutput {
                address: Address::p2pkh([0xAA; 20], params),
                value: 70_000,
            },
            EscrowOutput {
                address: Address::p2pkh([0xBB; 20], params),
                value: 30_000,
            },
        ]
    }

    #[test]
    fn generate_plain_multisig() {
        let (address, redeem) =
            generate_script(&pubkeys(), 2, Duration::ZERO, None, &BITCOIN_MAINNET).unwrap();
        assert!(matches!(classify(&address.to_script()), ScriptClass::ScriptHash(_)));
        assert_eq!(address, Address::p2sh_from_script(&redeem, &BITCOIN_MAINNET));
        assert_eq!(multisig_keys(&redeem).unwrap(), pubkeys());
        assert!(lock_time_from_redeem_script(&redeem).is_err());
    }

    #[test]
    fn generate_with_timeout() {
        let timeout_key = party(0x31).public_key().unwrap();
        let (_, redeem) = generate_script(
            &pubkeys(),
            2,
            Duration::from_secs(30 * 24 * 3600),
            Some(&timeout_key),
            &BITCOIN_MAINNET,
        )
        .unwrap();
        assert_eq!(lock_time_from_redeem_script(&redeem).unwrap(), 720 * 6);
        assert_eq!(multisig_keys(&redeem).unwrap().len(), 3);
    }

    #[test]
    fn sub_hour_timeout_is_plain_multisig() {
        let (_, redeem) = generate_script(
            &pubkeys(),
            2,
            Duration::from_secs(1800),
            None,
            &BITCOIN_MAINNET,
        )
        .unwrap();
        assert!(lock_time_from_redeem_script(&redeem).is_err());
    }

    #[test]
    fn generate_rejects_bad_parameters() {
        let keys = pubkeys();
        assert!(matches!(
            generate_script(&keys, 4, Duration::ZERO, None, &BITCOIN_MAINNET),
            Err(WalletError::Escrow(_))
        ));
        assert!(generate_script(&keys, 0, Duration::ZERO, None, &BITCOIN_MAINNET).is_err());
        let many: Vec<Vec<u8>> = (0..17).map(|_| keys[0].clone()).collect();
        assert!(generate_script(&many, 2, Duration::ZERO, None, &BITCOIN_MAINNET).is_err());
        assert!(matches!(
            generate_script(&keys, 2, Duration::from_secs(7200), None, &BITCOIN_MAINNET),
            Err(WalletError::Escrow(_))
        ));
    }

    #[test]
    fn zcash_escrow_address_uses_t3_prefix() {
        let (address, _) =
            generate_script(&pubkeys(), 2, Duration::ZERO, None, &ZCASH_MAINNET).unwrap();
        assert!(address.encode().unwrap().starts_with("t3"));
    }

    fn round(format: TxFormat, redeem: &[u8], params: &NetworkParams) -> (ChainTx, ChainTx) {
        let outs = outputs(params);
        let sigs_a = create_partial_signatures(format, &inputs(), &outs, &party(0x31), redeem, 10).unwrap();
        let sigs_b = create_partial_signatures(format, &inputs(), &outs, &party(0x33), redeem, 10).unwrap();
        assert_eq!(sigs_a.len(), 2);
        let ab = combine(format, &inputs(), &outs, &sigs_a, &sigs_b, redeem, 10).unwrap();
        let ba = combine(format, &inputs(), &outs, &sigs_b, &sigs_a, redeem, 10).unwrap();
        (ab, ba)
    }

    #[test]
    fn combine_is_symmetric() {
        let (_, redeem) =
            generate_script(&pubkeys(), 2, Duration::ZERO, None, &BITCOIN_MAINNET).unwrap();
        let (ab, ba) = round(TxFormat::Legacy, &redeem, &BITCOIN_MAINNET);
        assert_eq!(ab.serialize(), ba.serialize());

        let t = ab.transparent();
        assert_eq!(t.version, 1);
        assert_eq!(t.inputs[0].previous_output.txid, [4; 32]);
        let pushes = parse_script(&t.inputs[0].script_sig).unwrap();
        assert_eq!(pushes.len(), 4);
        assert_eq!(pushes[0].opcode, OP_0);
        assert_eq!(pushes[3].data, redeem);

        let tx_for_verify = ab.clone();
        let keys = pubkeys();
        assert!(verify_input(
            TxFormat::Legacy,
            &tx_for_verify,
            0,
            &redeem,
            40_000,
            &keys[0],
            &pushes[1].data
        )
        .unwrap());
        assert!(verify_input(
            TxFormat::Legacy,
            &tx_for_verify,
            0,
            &redeem,
            40_000,
            &keys[2],
            &pushes[2].data
        )
        .unwrap());
    }

    #[test]
    fn fee_is_split_across_outputs() {
        let (_, redeem) =
            generate_script(&pubkeys(), 2, Duration::ZERO, None, &BITCOIN_MAINNET).unwrap();
        let (ab, _) = round(TxFormat::Legacy, &redeem, &BITCOIN_MAINNET);
        let outs: Vec<TxOut> = outputs(&BITCOIN_MAINNET)
            .iter()
            .map(|o| TxOut::new(o.value, o.address.to_script()))
            .collect();
        let fee = estimate_serialize_size(2, &outs, false, InputKind::P2sh2of3Multisig) as i64 * 10;
        let values: Vec<i64> = ab.outputs().iter().map(|o| o.value).collect();
        assert_eq!(values, vec![30_000 - fee / 2, 70_000 - fee / 2]);
    }

    #[test]
    fn timelocked_combine_selects_multisig_branch() {
        let timeout_key = party(0x32).public_key().unwrap();
        let (_, redeem) = generate_script(
            &pubkeys(),
            2,
            Duration::from_secs(3600),
            Some(&timeout_key),
            &ZCASH_MAINNET,
        )
        .unwrap();
        let format = TxFormat::Sapling {
            branch_id: BRANCH_ID_BLOSSOM,
        };
        let (ab, ba) = round(format, &redeem, &ZCASH_MAINNET);
        assert_eq!(ab.txid(), ba.txid());
        let pushes = parse_script(&ab.transparent().inputs[1].script_sig).unwrap();
        assert_eq!(pushes.len(), 5);
        assert_eq!(pushes[3].opcode, OP_1);
        assert_eq!(pushes[4].data, redeem);
    }

    #[test]
    fn combine_rejects_missing_or_foreign_signatures() {
        let (_, redeem) =
            generate_script(&pubkeys(), 2, Duration::ZERO, None, &BITCOIN_MAINNET).unwrap();
        let outs = outputs(&BITCOIN_MAINNET);
        let ins = inputs();
        let sigs_a = create_partial_signatures(TxFormat::Legacy, &ins, &outs, &party(0x31), &redeem, 10).unwrap();
        let outsider =
            create_partial_signatures(TxFormat::Legacy, &ins, &outs, &party(0x77), &redeem, 10).unwrap();

        let err = combine(TxFormat::Legacy, &ins, &outs, &sigs_a, &outsider, &redeem, 10).unwrap_err();
        assert!(matches!(err, WalletError::Escrow(_)));
        let err = combine(TxFormat::Legacy, &ins, &outs, &sigs_a, &sigs_a[..1], &redeem, 10).unwrap_err();
        assert!(matches!(err, WalletError::Escrow(_)));
        let err = combine(TxFormat::Legacy, &ins, &outs, &sigs_a, &sigs_a, &redeem, 10).unwrap_err();
        assert!(matches!(err, WalletError::Escrow(_)));
    }

    #[test]
    fn outputs_too_small_for_fee_share() {
        let (_, redeem) =
            generate_script(&pubkeys(), 2, Duration::ZERO, None, &BITCOIN_MAINNET).unwrap();
        let outs = vec![EscrowOutput {
            address: Address::p2pkh([0xAA; 20], &BITCOIN_MAINNET),
            value: 100,
        }];
        assert!(matches!(
            create_partial_signatures(TxFormat::Legacy, &inputs(), &outs, &party(0x31), &redeem, 10),
            Err(WalletError::Escrow(_))
        ));
    }
}

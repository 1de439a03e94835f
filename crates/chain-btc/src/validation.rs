use std::collections::HashSet;

use crate::error::BtcError;
use crate::transaction::Transaction;
use crate::txrules::MAX_MONEY;

/// Context-free checks on the transparent part of a transaction.
///
/// `allow_empty_inputs` / `allow_empty_outputs` let a caller with shielded
/// data (which can fund or receive value) relax the non-empty rules.
pub fn check_transparent_parts(
    tx: &Transaction,
    allow_empty_inputs: bool,
    allow_empty_outputs: bool,
) -> Result<(), BtcError> {
    if tx.inputs.is_empty() && !allow_empty_inputs {
        return Err(BtcError::StructuralInvalid("transaction has no inputs".into()));
    }
    if tx.outputs.is_empty() && !allow_empty_outputs {
        return Err(BtcError::StructuralInvalid("transaction has no outputs".into()));
    }

    let mut total: i64 = 0;
    for (i, output) in tx.outputs.iter().enumerate() {
        if output.value < 0 {
            return Err(BtcError::StructuralInvalid(format!(
                "output {i} has negative value {}",
                output.value
            )));
        }
        if output.value > MAX_MONEY {
            return Err(BtcError::StructuralInvalid(format!(
                "output {i} value {} exceeds max money",
                output.value
            )));
        }
        total = total
            .checked_add(output.value)
            .filter(|t| *t <= MAX_MONEY)
            .ok_or_else(|| {
                BtcError::StructuralInvalid("total output value exceeds max money".into())
            })?;
    }

    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if !seen.insert(input.previous_output) {
            return Err(BtcError::StructuralInvalid(format!(
                "duplicate input {}",
                input.previous_output
            )));
        }
    }

    if tx.is_coinbase() {
        let len = tx.inputs[0].script_sig.len();
        if !(2..=100).contains(&len) {
            return Err(BtcError::StructuralInvalid(format!(
                "coinbase script length {len} outside 2..=100"
            )));
        }
    } else {
        for (i, input) in tx.inputs.iter().enumerate() {
            if input.previous_output.is_null() {
                return Err(BtcError::StructuralInvalid(format!(
                    "input {i} references a null outpoint"
                )));
            }
        }
    }

    Ok(())
}

/// Structural sanity for a legacy transaction.
pub fn check_transaction_sanity(tx: &Transaction) -> Result<(), BtcError> {
    if tx.version < 1 {
        return Err(BtcError::StructuralInvalid(format!(
            "version {} below minimum 1",
            tx.version
        )));
    }
    check_transparent_parts(tx, false, false)
}

use std::collections::HashSet;

use chain_btc::txrules::MAX_MONEY;
use chain_btc::validation::check_transparent_parts;

use crate::error::ZecError;
use crate::network::{MAX_EXPIRY_HEIGHT, SAPLING_VERSION_GROUP_ID};
use crate::transaction::ZecTransaction;

/// Context-free Overwinter/Sapling checks.
pub fn check_transaction_sanity(tx: &ZecTransaction) -> Result<(), ZecError> {
    if tx.version_group_id != SAPLING_VERSION_GROUP_ID {
        return Err(ZecError::StructuralInvalid(format!(
            "version group id {:#010x} does not match sapling",
            tx.version_group_id
        )));
    }
    if tx.expiry_height > MAX_EXPIRY_HEIGHT {
        return Err(ZecError::StructuralInvalid(format!(
            "expiry height {} exceeds {MAX_EXPIRY_HEIGHT}",
            tx.expiry_height
        )));
    }

    let shielded_funds = tx.spend_count > 0 || tx.joinsplit_count > 0;
    let shielded_receives = tx.output_count > 0 || tx.joinsplit_count > 0;
    check_transparent_parts(&tx.transparent, shielded_funds, shielded_receives)?;

    if tx.value_balance.unsigned_abs() > MAX_MONEY as u64 {
        return Err(ZecError::StructuralInvalid(format!(
            "value balance {} out of range",
            tx.value_balance
        )));
    }
    if tx.spend_count == 0 && tx.output_count == 0 && tx.value_balance != 0 {
        return Err(ZecError::StructuralInvalid(
            "non-zero value balance without shielded spends or outputs".into(),
        ));
    }

    if tx.transparent.is_coinbase() && !tx.is_transparent_only() {
        return Err(ZecError::StructuralInvalid(
            "coinbase has shielded components".into(),
        ));
    }

    let mut seen = HashSet::with_capacity(tx.nullifiers.len());
    for nf in &tx.nullifiers {
        if !seen.insert(*nf) {
            return Err(ZecError::StructuralInvalid(format!(
                "duplicate nullifier {}",
                hex::encode(nf)
            )));
        }
    }

    Ok(())
}

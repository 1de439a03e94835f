use std::cmp::Ordering;

use chain_btc::script::{classify, ScriptClass};
use chain_btc::transaction::OutPoint;

use crate::error::WalletError;
use crate::interfaces::KeyManager;
use crate::types::Utxo;

/// Most inputs a single selection may return.
pub const MAX_INPUTS: usize = 10_000;

/// A spendable output with its age at the current tip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coin {
    pub outpoint: OutPoint,
    pub value: i64,
    pub confirmations: i64,
    pub script_pubkey: Vec<u8>,
}

impl Coin {
    fn value_age(&self) -> i128 {
        self.value as i128 * self.confirmations as i128
    }
}

/// Owned, non-watch P2PKH UTXOs the key manager can sign for.
///
/// Outputs paying one of our keys as a bare pubkey or a witness program
/// stay in the ledger but are never selected: the signer only produces
/// `<sig> <pubkey>` script-sigs.
pub fn gather_coins(
    utxos: &[Utxo],
    tip_height: u32,
    keys: &dyn KeyManager,
) -> Vec<Coin> {
    utxos
        .iter()
        .filter(|u| !u.watch_only)
        .filter(|u| match classify(&u.script_pubkey) {
            ScriptClass::PubKeyHash(hash) => keys.key_for_script(&hash).is_ok(),
            _ => false,
        })
        .map(|u| Coin {
            outpoint: u.outpoint,
            value: u.value,
            confirmations: if u.at_height > 0 {
                tip_height as i64 - u.at_height as i64
            } else {
                0
            },
            script_pubkey: u.script_pubkey.clone(),
        })
        .collect()
}

/// Oldest, largest coins first; the shortest prefix covering `target` wins.
pub fn select_coins(coins: &[Coin], target: i64) -> Result<Vec<Coin>, WalletError> {
    let mut sorted: Vec<&Coin> = coins.iter().collect();
    sorted.sort_by(|a, b| compare_coins(a, b));
    sorted.truncate(MAX_INPUTS);

    let mut total = 0i64;
    for (i, coin) in sorted.iter().enumerate() {
        total += coin.value;
        if total >= target {
            return Ok(sorted[..=i].iter().map(|c| (*c).clone()).collect());
        }
    }
    Err(WalletError::InsufficientFunds {
        needed: target,
        available: total,
    })
}

fn compare_coins(a: &Coin, b: &Coin) -> Ordering {
    b.value_age()
        .cmp(&a.value_age())
        .then_with(|| b.value.cmp(&a.value))
        .then_with(|| a.outpoint.cmp(&b.outpoint))
}

//! Reference BIP-32/BIP-44 key manager.
//!
//! Keys live at `m/44'/coin'/0'/{0,1}/i`. Each branch keeps at least
//! `lookahead` unused keys derived ahead of the last used one so incoming
//! payments to not-yet-handed-out addresses are still recognised.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use bip32::{ChildNumber, XPrv};
use bip39::{Language, Mnemonic};
use crypto_utils::ecdsa::PrivateKey;
use crypto_utils::hash::hash160;
use rand::RngCore;
use tracing::debug;
use zeroize::Zeroize;

use crate::error::WalletError;
use crate::interfaces::{Key, KeyManager};
use crate::types::{Chain, KeyPurpose};

pub const DEFAULT_LOOKAHEAD_WINDOW: u32 = 20;

const BIP44_PURPOSE: u32 = 44;

// ─── Mnemonics ──────────────────────────────────────────────────────

/// Generate a new 24-word BIP-39 mnemonic (256 bits of entropy)
pub fn generate_mnemonic() -> Result<String, WalletError> {
    let mut entropy = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut entropy);
    let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy)
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()));
    entropy.zeroize();
    Ok(mnemonic?.to_string())
}

pub fn validate_mnemonic(phrase: &str) -> bool {
    Mnemonic::parse_in_normalized(Language::English, phrase).is_ok()
}

/// Derive the 64-byte seed from a mnemonic and optional passphrase.
/// Caller must zeroize the returned seed when done.
pub fn mnemonic_to_seed(phrase: &str, passphrase: &str) -> Result<Vec<u8>, WalletError> {
    let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase)
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;
    Ok(mnemonic.to_seed(passphrase).to_vec())
}

// ─── Key manager ────────────────────────────────────────────────────

struct StoredKey {
    key: Key,
    used: bool,
}

#[derive(Default)]
struct KeyState {
    keys: Vec<StoredKey>,
    by_hash: HashMap<[u8; 20], usize>,
}

impl KeyState {
    fn insert(&mut self, key: Key) {
        let hash = key.pubkey_hash();
        if self.by_hash.contains_key(&hash) {
            return;
        }
        self.by_hash.insert(hash, self.keys.len());
        self.keys.push(StoredKey { key, used: false });
    }

    fn branch(&self, purpose: KeyPurpose) -> impl Iterator<Item = &StoredKey> {
        self.keys
            .iter()
            .filter(move |k| k.key.purpose == purpose && k.key.index.is_some())
    }

    fn unused(&self, purpose: KeyPurpose) -> Vec<&Key> {
        let mut unused: Vec<&Key> = self
            .branch(purpose)
            .filter(|k| !k.used)
            .map(|k| &k.key)
            .collect();
        unused.sort_by_key(|k| k.index);
        unused
    }

    fn next_index(&self, purpose: KeyPurpose) -> u32 {
        self.branch(purpose)
            .filter_map(|k| k.key.index)
            .max()
            .map_or(0, |i| i + 1)
    }
}

pub struct HdKeyManager {
    external: XPrv,
    internal: XPrv,
    lookahead: u32,
    state: Mutex<KeyState>,
}

impl HdKeyManager {
    /// Build from the BIP-32 master key `master`.
    pub fn new(master: &XPrv, chain: Chain, lookahead: u32) -> Result<Self, WalletError> {
        let account = master
            .derive_child(ChildNumber::new(BIP44_PURPOSE, true)?)?
            .derive_child(ChildNumber::new(chain.coin_type(), true)?)?
            .derive_child(ChildNumber::new(0, true)?)?;
        let manager = Self {
            external: account.derive_child(ChildNumber::new(KeyPurpose::External.branch(), false)?)?,
            internal: account.derive_child(ChildNumber::new(KeyPurpose::Internal.branch(), false)?)?,
            lookahead,
            state: Mutex::new(KeyState::default()),
        };
        {
            let mut state = manager.lock();
            manager.extend_lookahead(&mut state)?;
        }
        Ok(manager)
    }

    pub fn from_seed(seed: &[u8], chain: Chain, lookahead: u32) -> Result<Self, WalletError> {
        let master = XPrv::new(seed)?;
        Self::new(&master, chain, lookahead)
    }

    /// Build from a serialized extended private key (`xprv...`).
    pub fn from_xprv(xprv: &str, chain: Chain, lookahead: u32) -> Result<Self, WalletError> {
        let master = XPrv::from_str(xprv)?;
        Self::new(&master, chain, lookahead)
    }

    pub fn from_mnemonic(
        phrase: &str,
        passphrase: &str,
        chain: Chain,
        lookahead: u32,
    ) -> Result<Self, WalletError> {
        let mut seed = mnemonic_to_seed(phrase, passphrase)?;
        let manager = Self::from_seed(&seed, chain, lookahead);
        seed.zeroize();
        manager
    }

    /// Track a loose private key. Imported keys are never handed out as
    /// receive addresses.
    pub fn import_key(&self, private_key: PrivateKey) -> Result<Key, WalletError> {
        let key = Key {
            purpose: KeyPurpose::External,
            index: None,
            public_key: private_key.public_key()?,
            private_key: Some(private_key),
        };
        self.lock().insert(key.clone());
        Ok(key)
    }

    /// Derive the child key at `index` on the purpose branch.
    pub fn derive_key(&self, purpose: KeyPurpose, index: u32) -> Result<Key, WalletError> {
        let branch = match purpose {
            KeyPurpose::External => &self.external,
            KeyPurpose::Internal => &self.internal,
        };
        let child = branch.derive_child(ChildNumber::new(index, false)?)?;
        let mut secret: [u8; 32] = child.to_bytes().into();
        let private_key = PrivateKey::from_bytes(&secret);
        secret.zeroize();
        Ok(Key {
            purpose,
            index: Some(index),
            public_key: child.public_key().to_bytes(),
            private_key: Some(private_key?),
        })
    }

    fn lock(&self) -> MutexGuard<'_, KeyState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn extend_lookahead(&self, state: &mut KeyState) -> Result<(), WalletError> {
        for purpose in [KeyPurpose::External, KeyPurpose::Internal] {
            let mut unused = state.unused(purpose).len() as u32;
            while unused < self.lookahead {
                let index = state.next_index(purpose);
                state.insert(self.derive_key(purpose, index)?);
                unused += 1;
            }
        }
        Ok(())
    }

    fn unused_key(&self, purpose: KeyPurpose, position: usize) -> Result<Key, WalletError> {
        let mut state = self.lock();
        self.extend_lookahead(&mut state)?;
        // a window smaller than `position + 1` still has to hand out a key
        while state.unused(purpose).len() <= position {
            let index = state.next_index(purpose);
            state.insert(self.derive_key(purpose, index)?);
        }
        state
            .unused(purpose)
            .get(position)
            .map(|key| (*key).clone())
            .ok_or_else(|| WalletError::DerivationFailed("no unused key".into()))
    }
}

/// Keys are indexed by pubkey hash; raw public keys are hashed first.
fn lookup_hash(script_address: &[u8]) -> Result<[u8; 20], WalletError> {
    match script_address.len() {
        20 => {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(script_address);
            Ok(hash)
        }
        33 | 65 => Ok(hash160(script_address)),
        _ => Err(WalletError::KeyNotFound(hex::encode(script_address))),
    }
}

impl KeyManager for HdKeyManager {
    fn current_key(&self, purpose: KeyPurpose) -> Result<Key, WalletError> {
        self.unused_key(purpose, 0)
    }

    fn next_unused_key(&self, purpose: KeyPurpose) -> Result<Key, WalletError> {
        self.unused_key(purpose, 1)
    }

    fn key_for_script(&self, script_address: &[u8]) -> Result<Key, WalletError> {
        let hash = lookup_hash(script_address)?;
        let state = self.lock();
        state
            .by_hash
            .get(&hash)
            .map(|&i| state.keys[i].key.clone())
            .ok_or_else(|| WalletError::KeyNotFound(hex::encode(script_address)))
    }

    fn mark_used(&self, script_address: &[u8]) -> Result<(), WalletError> {
        let hash = lookup_hash(script_address)?;
        let mut state = self.lock();
        let i = *state
            .by_hash
            .get(&hash)
            .ok_or_else(|| WalletError::KeyNotFound(hex::encode(script_address)))?;
        if !state.keys[i].used {
            state.keys[i].used = true;
            debug!(key = %hex::encode(hash), "key marked used");
        }
        self.extend_lookahead(&mut state)
    }

    fn all_keys(&self) -> Vec<Key> {
        self.lock().keys.iter().map(|k| k.key.clone()).collect()
    }
}

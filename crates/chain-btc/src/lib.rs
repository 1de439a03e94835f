//! Bitcoin-family chain support for the wallet engine.
//!
//! Address encoding for Bitcoin and Litecoin (base58check and bech32
//! segwit), standard script templates, the legacy transaction wire format and
//! signature hash, structural transaction checks, and the size/fee/dust rules
//! used by the transaction builder. Zcash reuses the address codec and
//! transparent model from here.

pub mod address;
pub mod encoding;
pub mod error;
pub mod network;
pub mod script;
pub mod sighash;
pub mod transaction;
pub mod txrules;
pub mod validation;

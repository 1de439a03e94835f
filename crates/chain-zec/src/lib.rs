//! Zcash chain support for the wallet engine.
//!
//! Transparent (t-address) network parameters, the Sapling v4 transaction
//! format (ZIP-202/ZIP-225 layout with empty or skipped shielded sections),
//! the ZIP-243 signature hash, and Overwinter structural rules. Addresses and
//! the transparent transaction model come from `chain-btc`.

pub mod error;
pub mod network;
pub mod sighash;
pub mod transaction;
pub mod validation;

//! # crypto-utils
//!
//! Hash functions, secp256k1 ECDSA and zeroizing key storage shared by the
//! chain crates and the wallet engine.

pub mod ecdsa;
pub mod error;
pub mod hash;
pub mod zeroizing;

pub use error::CryptoError;

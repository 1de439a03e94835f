//! UTXO wallet engine for Bitcoin, Litecoin and Zcash (transparent).
//!
//! The engine tracks spendable outputs for an HD key set, builds and signs
//! spends with age-weighted coin selection and BIP-69 ordering, resolves
//! double spends and reorganizations, and produces 2-of-n escrow spends
//! with an optional timeout branch. Chain access, key storage and exchange
//! rates are supplied through the traits in [`interfaces`].
//!
//! ```no_run
//! # async fn demo(
//! #     client: std::sync::Arc<dyn wallet_core::interfaces::ChainClient>,
//! # ) -> Result<(), wallet_core::error::WalletError> {
//! use wallet_core::{config::WalletConfig, datastore::MemoryDatastore, Wallet};
//!
//! let config = WalletConfig::default();
//! let phrase = wallet_core::keys::generate_mnemonic()?;
//! let wallet = Wallet::from_mnemonic(
//!     &config,
//!     &phrase,
//!     "",
//!     client,
//!     Box::new(MemoryDatastore::new()),
//!     None,
//! )?;
//! wallet.start().await?;
//! println!("{:?}", wallet.balance().await?);
//! wallet.close().await;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod chain_tx;
pub mod coinselect;
pub mod config;
pub mod datastore;
pub mod error;
pub mod escrow;
pub mod fees;
pub mod interfaces;
pub mod keys;
pub mod ledger;
pub mod logging;
pub mod service;
pub mod shutdown;
pub mod signer;
pub mod types;
pub mod wallet;

#[cfg(test)]
mod mock;

pub use error::WalletError;
pub use fees::FeeLevel;
pub use types::{Chain, KeyPurpose};
pub use wallet::Wallet;

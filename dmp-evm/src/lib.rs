#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EVM wallet provider for the dmp marketplace.
//!
//! [`EvmWallet`] signs with a local private key and submits
//! `payForProduct(orderId, seller)` to the payment router named in the
//! backend's payment order, then waits for the receipt.
//!
//! # Modules
//!
//! - [`contract`] - Solidity interface of the payment router
//! - [`wallet`] - The [`dmp::wallet::WalletProvider`] implementation
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod contract;
pub mod wallet;

pub use wallet::{EvmWallet, EvmWalletError};

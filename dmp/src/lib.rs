#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types and client flows for the dmp digital goods marketplace.
//!
//! The marketplace backend owns all business state (accounts, carts, orders,
//! listings). This crate models what a client sees of that state and drives
//! the two flows that involve more than a single request:
//!
//! - the [`keeper::SessionKeeper`], which periodically trades the stored
//!   refresh token for a fresh access token, and
//! - the purchase flow on [`cart::Cart`], which turns a cart entry into an
//!   on-chain payment through a [`wallet::WalletProvider`].
//!
//! Transport is abstracted behind [`backend::Marketplace`] and
//! [`backend::TokenExchange`]; the `dmp-http` crate implements them over
//! HTTP and `dmp-evm` implements the wallet provider on EVM chains.
//!
//! # Modules
//!
//! - [`amount`] - Exact ETH amounts and base-unit conversion
//! - [`backend`] - Backend traits consumed by the views and the keeper
//! - [`cart`] - Cart view and the purchase flow state machine
//! - [`error`] - Error taxonomy shared by every user action
//! - [`feed`] - Feed view
//! - [`keeper`] - Background access-token rotation
//! - [`model`] - Products, sellers, payment orders and profiles
//! - [`profile`] - Profile view, wallet update and listing toggle
//! - [`session`] - Credential storage
//! - [`timestamp`] - Unix timestamps used for credential expiry
//! - [`wallet`] - Wallet provider abstraction
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod amount;
pub mod backend;
pub mod cart;
pub mod error;
pub mod feed;
pub mod keeper;
pub mod model;
pub mod profile;
pub mod session;
pub mod timestamp;
pub mod wallet;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::BoxFuture;
pub use error::ActionError;

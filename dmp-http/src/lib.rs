#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP transport for the dmp marketplace.
//!
//! [`MarketClient`] talks JSON to the two backend hosts: the auth API, which
//! only trades refresh tokens, and the core API, which serves every
//! bearer-authenticated call. It implements [`dmp::backend::Marketplace`] and
//! [`dmp::backend::TokenExchange`] so the views and the session keeper can
//! use it directly.
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod client;
pub mod error;

pub use client::MarketClient;
pub use error::MarketClientError;

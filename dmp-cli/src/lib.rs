//! Command line client for the dmp marketplace.
//!
//! # Modules
//!
//! - [`config`] - Client configuration with environment variable expansion

pub mod config;

//! Error types for marketplace client actions.
//!
//! Every user action (loading a view, paying, delivering, rating, ...) fails
//! with an [`ActionError`]. Views store the rendered message next to the item
//! that triggered the action; nothing escalates beyond that scope.

use rust_decimal::Decimal;

use crate::model::{Action, ProductId};

/// Failure of a single user action.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// No access token is stored. Detected locally, no request is sent.
    #[error("authorization required")]
    MissingCredential,

    /// The backend rejected the request or could not be reached.
    #[error("{0}")]
    Backend(#[from] BackendError),

    /// No wallet provider is available to sign the payment.
    #[error("no wallet provider found, please install one (for example MetaMask)")]
    MissingWallet,

    /// The wallet refused the transaction or it failed on chain.
    #[error("payment failed: {0}")]
    Wallet(#[from] WalletError),

    /// The order price cannot be expressed in base units.
    #[error("invalid price: {0}")]
    Amount(#[from] AmountError),

    /// Ratings are integers from 1 to 10.
    #[error("rating must be between 1 and 10, got {0}")]
    InvalidRating(u8),

    /// A wallet address update was requested with an empty address.
    #[error("wallet address must not be empty")]
    EmptyWallet,

    /// The action is not offered for the product in its current state.
    #[error("{action} is not available for product {id}")]
    NotAvailable {
        /// The refused action.
        action: Action,
        /// The product it was requested for.
        id: ProductId,
    },

    /// The product is not part of the view the action was issued on.
    #[error("product {0} is not in this list")]
    UnknownProduct(ProductId),
}

/// Failure reported by (or while talking to) the marketplace backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend refused the credential (HTTP 401/403).
    #[error("authorization rejected: {0}")]
    Unauthorized(String),

    /// The backend answered with a non-success status.
    ///
    /// `message` is the best-effort human readable reason extracted from the
    /// response body.
    #[error("{message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Extracted reason.
        message: String,
    },

    /// The request never produced a response.
    #[error("network error: {0}")]
    Transport(String),

    /// The response could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Failure reported by a wallet provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    /// The provider exposes no account to pay from.
    #[error("no wallet account available")]
    NoAccounts,

    /// The wallet or the node refused to submit the transaction.
    #[error("transaction rejected: {0}")]
    Rejected(String),

    /// The transaction was mined but reverted.
    #[error("transaction {0} reverted")]
    Reverted(String),

    /// The provider failed while waiting for the receipt.
    #[error("provider error: {0}")]
    Provider(String),
}

/// A decimal ETH amount that has no exact base-unit representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// Amounts must not be negative.
    #[error("amount {0} is negative")]
    Negative(Decimal),

    /// The amount has more fractional digits than the chain supports.
    #[error("amount {value} has more than {max} fractional digits")]
    TooPrecise {
        /// The offending amount.
        value: Decimal,
        /// Maximum supported fractional digits.
        max: u32,
    },
}

/// Failure while reading or persisting stored credentials.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem access failed.
    #[error("session storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored session could not be (de)serialized.
    #[error("session storage format error: {0}")]
    Format(#[from] serde_json::Error),
}

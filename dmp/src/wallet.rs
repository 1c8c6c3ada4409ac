//! Wallet provider abstraction.
//!
//! A wallet provider is whatever can sign and submit the marketplace payment
//! transaction: a browser-injected wallet in a web client, a local
//! signer connected to an RPC node in `dmp-evm`.

use std::fmt;

use alloy_primitives::{Address, B256, U256};

use crate::backend::BoxFuture;
use crate::error::WalletError;
use crate::model::PaymentOrder;

/// The single contract call made per purchase attempt:
/// `payForProduct(orderId, seller)` with `value` attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayForProduct {
    /// Account paying.
    pub from: Address,
    /// Payment router contract.
    pub contract: Address,
    /// Backend order id.
    pub order_id: U256,
    /// Seller payout address.
    pub seller: Address,
    /// Amount in base units.
    pub value: U256,
}

impl PayForProduct {
    /// Builds the call for `order`, paying `value` base units from `from`.
    #[must_use]
    pub const fn new(from: Address, order: &PaymentOrder, value: U256) -> Self {
        Self {
            from,
            contract: order.contract_address,
            order_id: order.order_id,
            seller: order.seller_address,
            value,
        }
    }
}

/// Receipt of a mined, successful payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    /// Transaction hash.
    pub transaction_hash: B256,
    /// Block the transaction was mined in, when known.
    pub block_number: Option<u64>,
}

impl fmt::Display for TxReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.transaction_hash)
    }
}

/// Signs and submits payment transactions.
pub trait WalletProvider: Send + Sync {
    /// Asks the wallet for the accounts it may pay from.
    fn request_accounts(&self) -> BoxFuture<'_, Result<Vec<Address>, WalletError>>;

    /// Submits `call` and waits until it is mined.
    ///
    /// Returns an error if the wallet refuses, the submission fails, or the
    /// transaction reverts.
    fn pay_for_product<'a>(
        &'a self,
        call: &'a PayForProduct,
    ) -> BoxFuture<'a, Result<TxReceipt, WalletError>>;
}

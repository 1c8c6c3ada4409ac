//! Local-key wallet provider.
//!
//! The wallet holds one [`PrivateKeySigner`] and an HTTP provider for a
//! single chain. Every payment is one `payForProduct` transaction; there is
//! no nonce management beyond what the provider's fillers do, and no retry.

use std::time::Duration;

use alloy_network::{EthereumWallet, ReceiptResponse};
use alloy_primitives::Address;
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_signer_local::PrivateKeySigner;
use dmp::backend::BoxFuture;
use dmp::error::WalletError;
use dmp::wallet::{PayForProduct, TxReceipt, WalletProvider};
use url::Url;

use crate::contract::PayRouter;

/// Errors building an [`EvmWallet`].
#[derive(Debug, thiserror::Error)]
pub enum EvmWalletError {
    /// The private key is not a valid secp256k1 key.
    #[error("invalid private key: {0}")]
    InvalidKey(String),
    /// The RPC URL could not be parsed.
    #[error("invalid RPC URL: {0}")]
    InvalidRpcUrl(#[from] url::ParseError),
}

/// Pays marketplace orders from a locally held key.
#[derive(Clone)]
pub struct EvmWallet {
    provider: DynProvider,
    account: Address,
    receipt_timeout: Duration,
    confirmations: u64,
}

impl std::fmt::Debug for EvmWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmWallet")
            .field("account", &self.account)
            .field("receipt_timeout", &self.receipt_timeout)
            .field("confirmations", &self.confirmations)
            .finish_non_exhaustive()
    }
}

impl EvmWallet {
    /// Default time to wait for a payment receipt (30 seconds).
    pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connects `signer` to the node at `rpc_url`.
    ///
    /// No request is made until the first payment.
    #[must_use]
    pub fn connect(rpc_url: Url, signer: PrivateKeySigner) -> Self {
        let account = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(rpc_url)
            .erased();
        Self {
            provider,
            account,
            receipt_timeout: Self::DEFAULT_RECEIPT_TIMEOUT,
            confirmations: 1,
        }
    }

    /// Parses a hex private key and an RPC URL, then [connects](Self::connect).
    ///
    /// # Errors
    ///
    /// Returns [`EvmWalletError`] if the key or the URL is invalid.
    pub fn from_private_key(rpc_url: &str, private_key: &str) -> Result<Self, EvmWalletError> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .map_err(|e| EvmWalletError::InvalidKey(format!("{e}")))?;
        let rpc_url: Url = rpc_url.parse()?;
        Ok(Self::connect(rpc_url, signer))
    }

    /// Sets how long to wait for a payment receipt.
    #[must_use]
    pub const fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    /// Sets how many confirmations a payment needs.
    #[must_use]
    pub const fn with_confirmations(mut self, confirmations: u64) -> Self {
        self.confirmations = confirmations;
        self
    }

    /// The paying account.
    #[must_use]
    pub const fn account(&self) -> Address {
        self.account
    }

    /// Sends the payment and waits for its receipt.
    ///
    /// # Errors
    ///
    /// - [`WalletError::Rejected`] if the node refuses the transaction
    /// - [`WalletError::Provider`] if the receipt cannot be fetched in time
    /// - [`WalletError::Reverted`] if the transaction was mined but failed
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(
            name = "dmp.evm_wallet.pay_for_product",
            skip_all,
            fields(order_id = %call.order_id, contract = %call.contract, value = %call.value),
            err
        )
    )]
    pub async fn pay(&self, call: &PayForProduct) -> Result<TxReceipt, WalletError> {
        let router = PayRouter::new(call.contract, &self.provider);
        let pending = router
            .payForProduct(call.order_id, call.seller)
            .from(call.from)
            .value(call.value)
            .send()
            .await
            .map_err(|e| WalletError::Rejected(e.to_string()))?;

        #[cfg(feature = "telemetry")]
        tracing::info!(tx_hash = %pending.tx_hash(), "Payment submitted");

        let receipt = pending
            .with_required_confirmations(self.confirmations)
            .with_timeout(Some(self.receipt_timeout))
            .get_receipt()
            .await
            .map_err(|e| WalletError::Provider(e.to_string()))?;

        let transaction_hash = receipt.transaction_hash();
        if !receipt.status() {
            return Err(WalletError::Reverted(transaction_hash.to_string()));
        }
        Ok(TxReceipt {
            transaction_hash,
            block_number: receipt.block_number(),
        })
    }
}

impl WalletProvider for EvmWallet {
    fn request_accounts(&self) -> BoxFuture<'_, Result<Vec<Address>, WalletError>> {
        let accounts = vec![self.account];
        Box::pin(async move { Ok(accounts) })
    }

    fn pay_for_product<'a>(
        &'a self,
        call: &'a PayForProduct,
    ) -> BoxFuture<'a, Result<TxReceipt, WalletError>> {
        Box::pin(self.pay(call))
    }
}

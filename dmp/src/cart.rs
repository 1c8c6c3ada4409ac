//! Cart view and the purchase flow.
//!
//! Each [`CartEntry`] walks through [`PurchaseState`] when the user pays for
//! it:
//!
//! ```text
//! Idle -> RequestingOrder -> AwaitingWallet -> AwaitingConfirmation -> Paid
//!   ^            |                 |                   |
//!   +------------+-----------------+-------------------+  (any failure)
//! ```
//!
//! 1. `RequestingOrder`: the backend creates a [`PaymentOrder`] for the
//!    product. Requires a stored access token.
//! 2. `AwaitingWallet`: a wallet provider must be present; account access is
//!    requested and the `payForProduct` call is built, the ETH price scaled
//!    to base units.
//! 3. `AwaitingConfirmation`: the transaction is submitted and the flow waits
//!    for it to be mined. Other tasks keep running meanwhile.
//! 4. `Paid`: the entry is marked paid and the cart is reloaded from the
//!    backend.
//!
//! Any failure puts the entry back to `Idle` with the message stored on the
//! entry. Nothing is retried automatically; delivery and rating are separate
//! actions.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::backend::Marketplace;
use crate::error::{ActionError, WalletError};
use crate::model::{Action, PaymentOrder, Product, ProductId, Rating};
use crate::session::SessionStore;
use crate::wallet::{PayForProduct, TxReceipt, WalletProvider};

/// Progress of a purchase attempt on one cart entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PurchaseState {
    /// Waiting for the user.
    #[default]
    Idle,
    /// Asking the backend for the payment order.
    RequestingOrder,
    /// Asking the wallet for account access.
    AwaitingWallet,
    /// Transaction submitted, waiting to be mined.
    AwaitingConfirmation,
    /// Payment confirmed on chain.
    Paid,
}

/// A product in the cart with its local UI state.
#[derive(Debug, Clone, PartialEq)]
pub struct CartEntry {
    /// The product as last loaded from the backend.
    pub product: Product,
    /// Purchase progress.
    pub state: PurchaseState,
    /// Whether a payment for this product was confirmed in this session.
    pub paid: bool,
    /// Whether an action on this entry is in flight.
    pub busy: bool,
    /// Message of the last failed action.
    pub error: Option<String>,
}

impl CartEntry {
    fn new(product: Product, paid: bool) -> Self {
        Self {
            product,
            state: if paid {
                PurchaseState::Paid
            } else {
                PurchaseState::Idle
            },
            paid,
            busy: false,
            error: None,
        }
    }

    /// Whether the product counts as bought, by the backend or locally.
    #[must_use]
    pub const fn is_purchased(&self) -> bool {
        self.paid || self.product.status.is_purchased()
    }

    /// Actions offered for this entry.
    ///
    /// Unpurchased entries offer paying and removal; purchased ones offer
    /// delivery, plus rating until rated.
    #[must_use]
    pub fn actions(&self) -> Vec<Action> {
        let mut actions = Vec::with_capacity(2);
        if self.is_purchased() {
            actions.push(Action::Deliver);
        } else {
            actions.push(Action::Pay);
            actions.push(Action::Remove);
        }
        if self.product.status.can_rate() {
            actions.push(Action::Rate);
        }
        actions
    }

    /// Whether `action` is offered.
    #[must_use]
    pub fn offers(&self, action: Action) -> bool {
        self.actions().contains(&action)
    }
}

/// The user's cart.
pub struct Cart {
    backend: Arc<dyn Marketplace>,
    session: Arc<dyn SessionStore>,
    wallet: Option<Arc<dyn WalletProvider>>,
    entries: Vec<CartEntry>,
    loading: bool,
    error: Option<String>,
}

impl fmt::Debug for Cart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cart")
            .field("entries", &self.entries)
            .field("has_wallet", &self.wallet.is_some())
            .field("loading", &self.loading)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl Cart {
    /// Creates an empty cart view. Call [`Self::load`] to fill it.
    ///
    /// `wallet` is `None` when no wallet provider is available; paying then
    /// fails with [`ActionError::MissingWallet`].
    #[must_use]
    pub fn new(
        backend: Arc<dyn Marketplace>,
        session: Arc<dyn SessionStore>,
        wallet: Option<Arc<dyn WalletProvider>>,
    ) -> Self {
        Self {
            backend,
            session,
            wallet,
            entries: Vec::new(),
            loading: false,
            error: None,
        }
    }

    /// All entries in backend order.
    #[must_use]
    pub fn entries(&self) -> &[CartEntry] {
        &self.entries
    }

    /// Entries still to be paid.
    pub fn to_buy(&self) -> impl Iterator<Item = &CartEntry> {
        self.entries.iter().filter(|e| !e.is_purchased())
    }

    /// Entries bought, as reported by the backend or paid in this session.
    pub fn bought(&self) -> impl Iterator<Item = &CartEntry> {
        self.entries.iter().filter(|e| e.is_purchased())
    }

    /// Looks up an entry by product id.
    #[must_use]
    pub fn entry(&self, id: ProductId) -> Option<&CartEntry> {
        self.entries.iter().find(|e| e.product.id == id)
    }

    /// Whether the cart is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a reload is in flight.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.loading
    }

    /// Message of the last failed reload.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Reloads the cart from the backend.
    ///
    /// Entries paid during this session keep their paid mark.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::MissingCredential`] without contacting the
    /// backend when no access token is stored, or the backend's error. The
    /// message is also kept in [`Self::error`]; the current entries are
    /// left in place on failure.
    #[cfg_attr(feature = "telemetry", tracing::instrument(name = "dmp.cart.load", skip_all, err))]
    pub async fn load(&mut self) -> Result<(), ActionError> {
        self.loading = true;
        self.error = None;
        let result = self.fetch().await;
        self.loading = false;
        match result {
            Ok(products) => {
                let paid: HashSet<ProductId> = self
                    .entries
                    .iter()
                    .filter(|e| e.paid)
                    .map(|e| e.product.id)
                    .collect();
                self.entries = products
                    .into_iter()
                    .map(|p| {
                        let was_paid = paid.contains(&p.id);
                        CartEntry::new(p, was_paid)
                    })
                    .collect();
                Ok(())
            }
            Err(err) => {
                self.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    async fn fetch(&self) -> Result<Vec<Product>, ActionError> {
        let token = self
            .session
            .access_token()
            .ok_or(ActionError::MissingCredential)?;
        Ok(self.backend.cart(&token).await?)
    }

    /// Removes an unpurchased product from the cart.
    ///
    /// On success the entry disappears from the list; other entries are not
    /// touched.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::NotAvailable`] for purchased entries, a missing
    /// credential, or the backend's error (also stored on the entry).
    #[cfg_attr(feature = "telemetry", tracing::instrument(name = "dmp.cart.remove", skip(self), err))]
    pub async fn remove(&mut self, id: ProductId) -> Result<(), ActionError> {
        let idx = self.begin(id, Action::Remove)?;
        let result = self.remove_inner(id).await;
        match result {
            Ok(()) => {
                self.entries.retain(|e| e.product.id != id);
                Ok(())
            }
            Err(err) => Err(self.fail(idx, err)),
        }
    }

    async fn remove_inner(&self, id: ProductId) -> Result<(), ActionError> {
        let token = self
            .session
            .access_token()
            .ok_or(ActionError::MissingCredential)?;
        Ok(self.backend.remove_from_cart(&token, id).await?)
    }

    /// Pays for a cart product on chain.
    ///
    /// On confirmation the entry is marked paid and the cart is reloaded. A
    /// failed reload does not undo the payment; its message lands in
    /// [`Self::error`].
    ///
    /// # Errors
    ///
    /// Returns the [`ActionError`] of the first failing step. The entry is
    /// then back in [`PurchaseState::Idle`], unpaid, with the message stored
    /// on it.
    #[cfg_attr(feature = "telemetry", tracing::instrument(name = "dmp.cart.pay", skip(self), err))]
    pub async fn pay(&mut self, id: ProductId) -> Result<TxReceipt, ActionError> {
        let idx = self.begin(id, Action::Pay)?;
        match self.run_payment(idx).await {
            Ok(receipt) => {
                let entry = &mut self.entries[idx];
                entry.state = PurchaseState::Paid;
                entry.paid = true;
                entry.busy = false;
                #[cfg(feature = "telemetry")]
                tracing::info!(product_id = id, tx = %receipt, "Product paid");
                self.reload_after(Action::Pay).await;
                Ok(receipt)
            }
            Err(err) => {
                self.entries[idx].state = PurchaseState::Idle;
                Err(self.fail(idx, err))
            }
        }
    }

    async fn run_payment(&mut self, idx: usize) -> Result<TxReceipt, ActionError> {
        let id = self.entries[idx].product.id;

        self.transition(idx, PurchaseState::RequestingOrder);
        let token = self
            .session
            .access_token()
            .ok_or(ActionError::MissingCredential)?;
        let order: PaymentOrder = self.backend.buy_product(&token, id).await?;

        self.transition(idx, PurchaseState::AwaitingWallet);
        let wallet = self.wallet.clone().ok_or(ActionError::MissingWallet)?;
        let value = order.price.to_base_units()?;
        let accounts = wallet.request_accounts().await?;
        let from = accounts
            .first()
            .copied()
            .ok_or(WalletError::NoAccounts)?;
        let call = PayForProduct::new(from, &order, value);

        self.transition(idx, PurchaseState::AwaitingConfirmation);
        Ok(wallet.pay_for_product(&call).await?)
    }

    /// Confirms delivery of a purchased product.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::NotAvailable`] for unpurchased entries, a
    /// missing credential, or the backend's error (also stored on the entry).
    #[cfg_attr(feature = "telemetry", tracing::instrument(name = "dmp.cart.deliver", skip(self), err))]
    pub async fn deliver(&mut self, id: ProductId) -> Result<(), ActionError> {
        let idx = self.begin(id, Action::Deliver)?;
        let result = async {
            let token = self
                .session
                .access_token()
                .ok_or(ActionError::MissingCredential)?;
            Ok::<_, ActionError>(self.backend.deliver(&token, id).await?)
        }
        .await;
        match result {
            Ok(()) => {
                self.entries[idx].busy = false;
                Ok(())
            }
            Err(err) => Err(self.fail(idx, err)),
        }
    }

    /// Rates a purchased, not yet rated product and reloads the cart.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::InvalidRating`] for values outside 1..=10,
    /// [`ActionError::NotAvailable`] when rating is not offered, a missing
    /// credential, or the backend's error (also stored on the entry).
    #[cfg_attr(feature = "telemetry", tracing::instrument(name = "dmp.cart.rate", skip(self), err))]
    pub async fn rate(&mut self, id: ProductId, value: u8) -> Result<(), ActionError> {
        let idx = self.begin(id, Action::Rate)?;
        let result = async {
            let rating = Rating::new(value).ok_or(ActionError::InvalidRating(value))?;
            let token = self
                .session
                .access_token()
                .ok_or(ActionError::MissingCredential)?;
            Ok::<_, ActionError>(self.backend.rate(&token, id, rating).await?)
        }
        .await;
        match result {
            Ok(()) => {
                self.entries[idx].busy = false;
                self.reload_after(Action::Rate).await;
                Ok(())
            }
            Err(err) => Err(self.fail(idx, err)),
        }
    }

    /// Reloads after a successful action. A failure only shows in
    /// [`Self::error`].
    #[allow(unused_variables)] // action and err are only used for tracing
    async fn reload_after(&mut self, action: Action) {
        if let Err(err) = self.load().await {
            #[cfg(feature = "telemetry")]
            tracing::warn!(error = %err, %action, "Cart reload failed");
        }
    }

    /// Finds the entry, checks the action is offered and clears its error.
    fn begin(&mut self, id: ProductId, action: Action) -> Result<usize, ActionError> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.product.id == id)
            .ok_or(ActionError::UnknownProduct(id))?;
        let entry = &mut self.entries[idx];
        if !entry.offers(action) {
            return Err(ActionError::NotAvailable { action, id });
        }
        entry.error = None;
        entry.busy = true;
        Ok(idx)
    }

    fn transition(&mut self, idx: usize, state: PurchaseState) {
        #[cfg(feature = "telemetry")]
        tracing::debug!(product_id = self.entries[idx].product.id, ?state, "Purchase state");
        self.entries[idx].state = state;
    }

    fn fail(&mut self, idx: usize, err: ActionError) -> ActionError {
        let entry = &mut self.entries[idx];
        entry.busy = false;
        entry.error = Some(err.to_string());
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::model::{CredentialPair, ProductStatus};
    use crate::session::MemorySessionStore;
    use crate::testing::{FakeBackend, FakeWallet, order, product};
    use alloy_primitives::U256;

    fn signed_in() -> Arc<MemorySessionStore> {
        Arc::new(MemorySessionStore::with_credentials(&CredentialPair::new("A1", "R1")))
    }

    async fn loaded_cart(
        backend: &Arc<FakeBackend>,
        session: Arc<MemorySessionStore>,
        wallet: Option<Arc<FakeWallet>>,
    ) -> Cart {
        let mut cart = Cart::new(
            Arc::clone(backend) as Arc<dyn Marketplace>,
            session,
            wallet.map(|w| w as Arc<dyn WalletProvider>),
        );
        cart.load().await.unwrap();
        cart
    }

    #[tokio::test]
    async fn test_offered_actions_follow_purchase_flag() {
        let backend = Arc::new(FakeBackend::with_cart(vec![
            product(1, false, false, true),
            product(2, true, false, false),
            product(3, true, true, false),
        ]));
        let cart = loaded_cart(&backend, signed_in(), None).await;

        assert_eq!(
            cart.entry(1).unwrap().actions(),
            vec![Action::Pay, Action::Remove]
        );
        assert_eq!(
            cart.entry(2).unwrap().actions(),
            vec![Action::Deliver, Action::Rate]
        );
        assert_eq!(cart.entry(3).unwrap().actions(), vec![Action::Deliver]);
        assert_eq!(cart.to_buy().count(), 1);
        assert_eq!(cart.bought().count(), 2);
    }

    #[tokio::test]
    async fn test_successful_payment_marks_paid_and_reloads() {
        let backend = Arc::new(FakeBackend::with_cart(vec![product(1, false, false, true)]));
        let wallet = Arc::new(FakeWallet::confirming());
        let mut cart = loaded_cart(&backend, signed_in(), Some(Arc::clone(&wallet))).await;

        let receipt = cart.pay(1).await.unwrap();

        assert_eq!(receipt.block_number, Some(1));
        let calls = wallet.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].value, U256::from(1_000_000_000u64));
        assert_eq!(calls[0].order_id, U256::from(1u64));
        assert_eq!(calls[0].from, wallet.accounts[0]);

        let entry = cart.entry(1).unwrap();
        assert!(entry.paid);
        assert_eq!(entry.state, PurchaseState::Paid);
        assert_eq!(entry.error, None);
        assert_eq!(entry.actions(), vec![Action::Deliver]);
        assert_eq!(
            backend.calls(),
            vec!["cart", "buy_product:1", "cart"]
        );
    }

    #[tokio::test]
    async fn test_rejected_wallet_leaves_item_unpaid() {
        let backend = Arc::new(FakeBackend::with_cart(vec![product(1, false, false, true)]));
        let wallet = Arc::new(FakeWallet::rejecting());
        let mut cart = loaded_cart(&backend, signed_in(), Some(wallet)).await;

        let err = cart.pay(1).await.unwrap_err();

        assert!(matches!(err, ActionError::Wallet(_)));
        let entry = cart.entry(1).unwrap();
        assert!(!entry.paid);
        assert_eq!(entry.state, PurchaseState::Idle);
        assert!(entry.error.as_deref().unwrap().starts_with("payment failed"));
        assert!(!backend.called("deliver"));
    }

    #[tokio::test]
    async fn test_missing_wallet_asks_for_install() {
        let backend = Arc::new(FakeBackend::with_cart(vec![product(1, false, false, true)]));
        let mut cart = loaded_cart(&backend, signed_in(), None).await;

        let err = cart.pay(1).await.unwrap_err();

        assert!(matches!(err, ActionError::MissingWallet));
        assert!(cart.entry(1).unwrap().error.as_deref().unwrap().contains("install"));
        assert!(!cart.entry(1).unwrap().paid);
    }

    #[tokio::test]
    async fn test_missing_wallet_is_reported_before_price_checks() {
        let backend = Arc::new(FakeBackend::with_cart(vec![product(1, false, false, true)]));
        let mut too_precise = order();
        too_precise.price = "0.0000000000000000001".parse().unwrap();
        *backend.order.lock().unwrap() = Some(too_precise);
        let mut cart = loaded_cart(&backend, signed_in(), None).await;

        let err = cart.pay(1).await.unwrap_err();

        assert!(matches!(err, ActionError::MissingWallet));
        assert_eq!(cart.entry(1).unwrap().state, PurchaseState::Idle);
    }

    #[tokio::test]
    async fn test_too_precise_price_never_reaches_wallet() {
        let backend = Arc::new(FakeBackend::with_cart(vec![product(1, false, false, true)]));
        let mut too_precise = order();
        too_precise.price = "0.0000000000000000001".parse().unwrap();
        *backend.order.lock().unwrap() = Some(too_precise);
        let wallet = Arc::new(FakeWallet::confirming());
        let mut cart = loaded_cart(&backend, signed_in(), Some(Arc::clone(&wallet))).await;

        let err = cart.pay(1).await.unwrap_err();

        assert!(matches!(err, ActionError::Amount(_)));
        assert!(wallet.calls().is_empty());
        assert!(!cart.entry(1).unwrap().paid);
    }

    #[tokio::test]
    async fn test_session_paid_entry_is_listed_as_bought() {
        let backend = Arc::new(FakeBackend::with_cart(vec![
            product(1, false, false, true),
            product(2, false, false, true),
        ]));
        let wallet = Arc::new(FakeWallet::confirming());
        let mut cart = loaded_cart(&backend, signed_in(), Some(wallet)).await;

        cart.pay(1).await.unwrap();

        let to_buy: Vec<ProductId> = cart.to_buy().map(|e| e.product.id).collect();
        let bought: Vec<ProductId> = cart.bought().map(|e| e.product.id).collect();
        assert_eq!(to_buy, vec![2]);
        assert_eq!(bought, vec![1]);
    }

    #[tokio::test]
    async fn test_missing_credential_sends_nothing() {
        let backend = Arc::new(FakeBackend::with_cart(vec![product(1, false, false, true)]));
        let session = signed_in();
        let wallet = Arc::new(FakeWallet::confirming());
        let mut cart = loaded_cart(&backend, Arc::clone(&session), Some(Arc::clone(&wallet))).await;
        session.clear().unwrap();

        let err = cart.pay(1).await.unwrap_err();

        assert!(matches!(err, ActionError::MissingCredential));
        assert_eq!(cart.entry(1).unwrap().error.as_deref(), Some("authorization required"));
        assert_eq!(backend.calls(), vec!["cart"]);
        assert!(wallet.calls().is_empty());
    }

    #[tokio::test]
    async fn test_backend_rejection_of_order_is_shown_inline() {
        let backend = Arc::new(FakeBackend::with_cart(vec![product(1, false, false, true)]));
        backend.fail("buy_product");
        let wallet = Arc::new(FakeWallet::confirming());
        let mut cart = loaded_cart(&backend, signed_in(), Some(Arc::clone(&wallet))).await;

        let err = cart.pay(1).await.unwrap_err();

        assert!(matches!(err, ActionError::Backend(BackendError::Rejected { .. })));
        assert_eq!(cart.entry(1).unwrap().error.as_deref(), Some("buy_product rejected"));
        assert!(wallet.calls().is_empty());
    }

    #[tokio::test]
    async fn test_paid_mark_survives_reload() {
        let backend = Arc::new(FakeBackend::with_cart(vec![product(1, false, false, true)]));
        let wallet = Arc::new(FakeWallet::confirming());
        let mut cart = loaded_cart(&backend, signed_in(), Some(wallet)).await;
        cart.pay(1).await.unwrap();

        cart.load().await.unwrap();

        assert!(cart.entry(1).unwrap().paid);
        assert!(matches!(
            cart.pay(1).await,
            Err(ActionError::NotAvailable { action: Action::Pay, id: 1 })
        ));
    }

    #[tokio::test]
    async fn test_remove_only_drops_the_unpurchased_item() {
        let backend = Arc::new(FakeBackend::with_cart(vec![
            product(1, false, false, true),
            product(2, true, false, false),
            product(3, false, false, true),
        ]));
        let mut cart = loaded_cart(&backend, signed_in(), None).await;

        cart.remove(1).await.unwrap();

        let ids: Vec<ProductId> = cart.entries().iter().map(|e| e.product.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(cart.bought().count(), 1);
        assert!(matches!(
            cart.remove(2).await,
            Err(ActionError::NotAvailable { action: Action::Remove, id: 2 })
        ));
    }

    #[tokio::test]
    async fn test_deliver_failure_is_inline_and_not_retried() {
        let backend = Arc::new(FakeBackend::with_cart(vec![product(2, true, false, false)]));
        backend.fail("deliver");
        let mut cart = loaded_cart(&backend, signed_in(), None).await;

        assert!(cart.deliver(2).await.is_err());

        assert_eq!(cart.entry(2).unwrap().error.as_deref(), Some("deliver rejected"));
        assert!(!cart.entry(2).unwrap().busy);
        assert_eq!(backend.calls(), vec!["cart", "deliver:2"]);
    }

    #[tokio::test]
    async fn test_rating_is_validated_and_reloads() {
        let backend = Arc::new(FakeBackend::with_cart(vec![product(2, true, false, false)]));
        let mut cart = loaded_cart(&backend, signed_in(), None).await;

        assert!(matches!(cart.rate(2, 11).await, Err(ActionError::InvalidRating(11))));
        assert!(!backend.called("rate"));

        *backend.cart.lock().unwrap() = vec![product(2, true, true, false)];
        cart.rate(2, 8).await.unwrap();

        assert_eq!(
            cart.entry(2).unwrap().product.status,
            ProductStatus::PurchasedRated
        );
        assert!(!cart.entry(2).unwrap().offers(Action::Rate));
    }

    #[tokio::test]
    async fn test_load_without_credential_keeps_entries() {
        let backend = Arc::new(FakeBackend::with_cart(vec![product(1, false, false, true)]));
        let session = signed_in();
        let mut cart = loaded_cart(&backend, Arc::clone(&session), None).await;
        session.clear().unwrap();

        assert!(cart.load().await.is_err());

        assert_eq!(cart.error(), Some("authorization required"));
        assert_eq!(cart.entries().len(), 1);
        assert!(!cart.is_loading());
    }
}

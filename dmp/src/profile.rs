//! Profile view: account details, linked wallet and own products.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::amount::EthAmount;
use crate::backend::Marketplace;
use crate::error::ActionError;
use crate::model::{Action, Product, ProductId, UserProfile};
use crate::session::SessionStore;

/// Message shown after a successful wallet change.
pub const WALLET_UPDATED: &str = "wallet updated";

/// The signed-in user's profile page.
pub struct Profile {
    backend: Arc<dyn Marketplace>,
    session: Arc<dyn SessionStore>,
    user: Option<UserProfile>,
    wallet: Option<String>,
    balance: Option<EthAmount>,
    products: Vec<Product>,
    error: Option<String>,
    wallet_message: Option<String>,
    product_errors: HashMap<ProductId, String>,
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("user", &self.user)
            .field("wallet", &self.wallet)
            .field("balance", &self.balance)
            .field("products", &self.products.len())
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl Profile {
    /// Creates an empty profile view.
    #[must_use]
    pub fn new(backend: Arc<dyn Marketplace>, session: Arc<dyn SessionStore>) -> Self {
        Self {
            backend,
            session,
            user: None,
            wallet: None,
            balance: None,
            products: Vec::new(),
            error: None,
            wallet_message: None,
            product_errors: HashMap::new(),
        }
    }

    /// Account details, once loaded.
    #[must_use]
    pub const fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    /// Linked wallet address, once loaded.
    #[must_use]
    pub fn wallet(&self) -> Option<&str> {
        self.wallet.as_deref()
    }

    /// Wallet balance, once loaded.
    #[must_use]
    pub const fn balance(&self) -> Option<EthAmount> {
        self.balance
    }

    /// Page-level error of the last load.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Outcome of the last wallet change, success or failure.
    #[must_use]
    pub fn wallet_message(&self) -> Option<&str> {
        self.wallet_message.as_deref()
    }

    /// Error of the last listing toggle on `id`.
    #[must_use]
    pub fn product_error(&self, id: ProductId) -> Option<&str> {
        self.product_errors.get(&id).map(String::as_str)
    }

    /// Own products currently on sale.
    pub fn on_sale(&self) -> impl Iterator<Item = &Product> {
        self.products.iter().filter(|p| p.status.is_listed())
    }

    /// Own products not on sale and not sold.
    pub fn not_on_sale(&self) -> impl Iterator<Item = &Product> {
        self.products
            .iter()
            .filter(|p| !p.status.is_listed() && !p.status.is_purchased())
    }

    /// Own products that have been sold.
    pub fn sold(&self) -> impl Iterator<Item = &Product> {
        self.products.iter().filter(|p| p.status.is_purchased())
    }

    /// Loads profile, wallet, balance and own products concurrently.
    ///
    /// Each part fails on its own: a failing part leaves its previous value
    /// and records the page error, except own products whose failure is only
    /// logged.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::MissingCredential`] without any request when no
    /// access token is stored, otherwise the first failing part's error.
    #[cfg_attr(feature = "telemetry", tracing::instrument(name = "dmp.profile.load", skip_all, err))]
    pub async fn load(&mut self) -> Result<(), ActionError> {
        self.error = None;
        let Some(token) = self.session.access_token() else {
            return Err(self.page_error(ActionError::MissingCredential));
        };

        let (user, wallet, products, balance) = tokio::join!(
            self.backend.profile(&token),
            self.backend.wallet(&token),
            self.backend.my_products(&token),
            self.backend.balance(&token),
        );

        let mut first_error = None;
        match user {
            Ok(user) => self.user = Some(user),
            Err(err) => first_error = first_error.or(Some(err)),
        }
        match wallet {
            Ok(wallet) => self.wallet = Some(wallet),
            Err(err) => first_error = first_error.or(Some(err)),
        }
        match products {
            Ok(products) => self.products = products,
            #[allow(unused_variables)]
            Err(err) => {
                #[cfg(feature = "telemetry")]
                tracing::error!(error = %err, "Failed to load own products");
            }
        }
        match balance {
            Ok(balance) => self.balance = Some(balance),
            Err(err) => first_error = first_error.or(Some(err)),
        }

        match first_error {
            Some(err) => Err(self.page_error(err.into())),
            None => Ok(()),
        }
    }

    /// Links a new wallet address, then reloads wallet and balance.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::EmptyWallet`] for blank input without a request,
    /// a missing credential, or the backend's error. The outcome is also kept
    /// in [`Self::wallet_message`].
    #[cfg_attr(feature = "telemetry", tracing::instrument(name = "dmp.profile.update_wallet", skip_all, err))]
    pub async fn update_wallet(&mut self, address: &str) -> Result<(), ActionError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(ActionError::EmptyWallet);
        }
        self.wallet_message = None;
        let Some(token) = self.session.access_token() else {
            let err = ActionError::MissingCredential;
            self.wallet_message = Some(err.to_string());
            return Err(err);
        };
        if let Err(err) = self.backend.update_wallet(&token, address).await {
            self.wallet_message = Some(err.to_string());
            return Err(err.into());
        }
        self.wallet_message = Some(WALLET_UPDATED.to_owned());

        let (wallet, balance) = tokio::join!(
            self.backend.wallet(&token),
            self.backend.balance(&token),
        );
        match wallet {
            Ok(wallet) => self.wallet = Some(wallet),
            Err(err) => self.error = Some(err.to_string()),
        }
        match balance {
            Ok(balance) => self.balance = Some(balance),
            Err(err) => self.error = Some(err.to_string()),
        }
        Ok(())
    }

    /// Puts an own product on sale or takes it off, then reloads own
    /// products.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::NotAvailable`] for sold products (nothing is
    /// sent), [`ActionError::UnknownProduct`] for ids not owned, a missing
    /// credential, or the backend's error (also kept per product).
    #[cfg_attr(feature = "telemetry", tracing::instrument(name = "dmp.profile.toggle_listing", skip(self), err))]
    pub async fn toggle_listing(&mut self, id: ProductId) -> Result<(), ActionError> {
        let product = self
            .products
            .iter()
            .find(|p| p.id == id)
            .ok_or(ActionError::UnknownProduct(id))?;
        if product.status.is_purchased() {
            return Err(ActionError::NotAvailable {
                action: Action::ToggleListing,
                id,
            });
        }
        let is_sell_now = product.status.is_listed();
        self.product_errors.remove(&id);

        let result = async {
            let token = self
                .session
                .access_token()
                .ok_or(ActionError::MissingCredential)?;
            self.backend.switch_product(&token, id, is_sell_now).await?;
            Ok::<_, ActionError>(self.backend.my_products(&token).await?)
        }
        .await;
        match result {
            Ok(products) => {
                self.products = products;
                Ok(())
            }
            Err(err) => {
                self.product_errors.insert(id, err.to_string());
                Err(err)
            }
        }
    }

    fn page_error(&mut self, err: ActionError) -> ActionError {
        self.error = Some(err.to_string());
        err
    }
}

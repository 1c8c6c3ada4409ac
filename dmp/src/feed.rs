//! Feed view: everything currently on sale.

use std::fmt;
use std::sync::Arc;

use crate::backend::Marketplace;
use crate::error::ActionError;
use crate::model::{Product, ProductId};
use crate::session::SessionStore;

/// Products on sale, as last loaded.
pub struct Feed {
    backend: Arc<dyn Marketplace>,
    session: Arc<dyn SessionStore>,
    products: Vec<Product>,
    error: Option<String>,
}

impl fmt::Debug for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feed")
            .field("products", &self.products.len())
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl Feed {
    /// Creates an empty feed view.
    #[must_use]
    pub fn new(backend: Arc<dyn Marketplace>, session: Arc<dyn SessionStore>) -> Self {
        Self {
            backend,
            session,
            products: Vec::new(),
            error: None,
        }
    }

    /// Loaded products.
    #[must_use]
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// Message of the last failed action.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Loads the feed.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::MissingCredential`] without a request when no
    /// access token is stored, or the backend's error.
    #[cfg_attr(feature = "telemetry", tracing::instrument(name = "dmp.feed.load", skip_all, err))]
    pub async fn load(&mut self) -> Result<(), ActionError> {
        self.error = None;
        let result = async {
            let token = self
                .session
                .access_token()
                .ok_or(ActionError::MissingCredential)?;
            Ok::<_, ActionError>(self.backend.feed(&token).await?)
        }
        .await;
        match result {
            Ok(products) => {
                self.products = products;
                Ok(())
            }
            Err(err) => {
                self.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Adds a feed product to the cart.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::UnknownProduct`] for ids not in the feed, a
    /// missing credential, or the backend's error.
    #[cfg_attr(feature = "telemetry", tracing::instrument(name = "dmp.feed.add_to_cart", skip(self), err))]
    pub async fn add_to_cart(&mut self, id: ProductId) -> Result<(), ActionError> {
        if !self.products.iter().any(|p| p.id == id) {
            return Err(ActionError::UnknownProduct(id));
        }
        self.error = None;
        let result = async {
            let token = self
                .session
                .access_token()
                .ok_or(ActionError::MissingCredential)?;
            Ok::<_, ActionError>(self.backend.add_to_cart(&token, id).await?)
        }
        .await;
        result.inspect_err(|err| self.error = Some(err.to_string()))
    }
}

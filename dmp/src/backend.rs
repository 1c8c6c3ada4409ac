//! Backend traits.
//!
//! [`Marketplace`] covers the bearer-authenticated core API and
//! [`TokenExchange`] the auth API's refresh endpoint. Both are object safe so
//! views and the keeper can hold them as `Arc<dyn ...>` and tests can swap in
//! in-memory fakes.

use std::future::Future;
use std::pin::Pin;

use crate::amount::EthAmount;
use crate::error::BackendError;
use crate::model::{CredentialPair, PaymentOrder, Product, ProductId, Rating, UserProfile};

/// Boxed, sendable future returned by the backend and wallet traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result alias used by the backend traits.
pub type BackendResult<T> = Result<T, BackendError>;

/// Calls of the marketplace core API.
///
/// Every call takes the bearer access token explicitly; callers read it from
/// the [`crate::session::SessionStore`] right before the request.
pub trait Marketplace: Send + Sync {
    /// All products currently on sale.
    fn feed<'a>(&'a self, token: &'a str) -> BoxFuture<'a, BackendResult<Vec<Product>>>;

    /// Products in the user's cart, purchased ones included.
    fn cart<'a>(&'a self, token: &'a str) -> BoxFuture<'a, BackendResult<Vec<Product>>>;

    /// Adds a product to the cart.
    fn add_to_cart<'a>(&'a self, token: &'a str, id: ProductId)
    -> BoxFuture<'a, BackendResult<()>>;

    /// Removes a product from the cart.
    fn remove_from_cart<'a>(
        &'a self,
        token: &'a str,
        id: ProductId,
    ) -> BoxFuture<'a, BackendResult<()>>;

    /// Creates a payment order for a cart product.
    fn buy_product<'a>(
        &'a self,
        token: &'a str,
        id: ProductId,
    ) -> BoxFuture<'a, BackendResult<PaymentOrder>>;

    /// Marks a purchased product as delivered.
    fn deliver<'a>(&'a self, token: &'a str, id: ProductId) -> BoxFuture<'a, BackendResult<()>>;

    /// Submits the buyer's rating of a purchased product.
    fn rate<'a>(
        &'a self,
        token: &'a str,
        id: ProductId,
        rating: Rating,
    ) -> BoxFuture<'a, BackendResult<()>>;

    /// The signed-in user's profile.
    fn profile<'a>(&'a self, token: &'a str) -> BoxFuture<'a, BackendResult<UserProfile>>;

    /// The wallet address linked to the account.
    fn wallet<'a>(&'a self, token: &'a str) -> BoxFuture<'a, BackendResult<String>>;

    /// Balance of the linked wallet.
    fn balance<'a>(&'a self, token: &'a str) -> BoxFuture<'a, BackendResult<EthAmount>>;

    /// Links a new wallet address to the account.
    fn update_wallet<'a>(
        &'a self,
        token: &'a str,
        wallet: &'a str,
    ) -> BoxFuture<'a, BackendResult<()>>;

    /// Products the user sells or has sold.
    fn my_products<'a>(&'a self, token: &'a str) -> BoxFuture<'a, BackendResult<Vec<Product>>>;

    /// Flips the listing state of an own product.
    ///
    /// `is_sell_now` is the state the client currently shows; the backend
    /// toggles it.
    fn switch_product<'a>(
        &'a self,
        token: &'a str,
        id: ProductId,
        is_sell_now: bool,
    ) -> BoxFuture<'a, BackendResult<()>>;
}

/// Exchange of a refresh token for a new credential pair.
pub trait TokenExchange: Send + Sync {
    /// Trades `refresh_token` for a fresh access/refresh pair.
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, BackendResult<CredentialPair>>;
}

//! A [`Marketplace`] and [`TokenExchange`] implementation over HTTP.
//!
//! [`MarketClient`] holds two base URLs: the auth API (only `RefreshToken`)
//! and the core API (everything under `Protected/`). Core calls carry the
//! access token as a bearer header. Endpoint paths are joined relative to the
//! base, so a base of `https://host/api/` yields `https://host/api/Protected/GetCart`.
//!
//! ## Error Handling
//!
//! Non-success responses become [`MarketClientError::HttpStatus`] carrying the
//! best human-readable reason found in the body:
//! - the `message` (or `error`) field of a JSON object,
//! - a bare JSON string,
//! - the raw body text,
//! - the status line when the body is empty.
//!
//! The error converts into [`BackendError`] at the trait boundary, with 401
//! and 403 mapped to [`BackendError::Unauthorized`].

use std::fmt::Display;
use std::time::Duration;

use dmp::amount::EthAmount;
use dmp::backend::{BackendResult, BoxFuture, Marketplace, TokenExchange};
use dmp::error::BackendError;
use dmp::model::{
    CredentialPair, PaymentOrder, Product, ProductId, ProductList, Rating, UserProfile,
};
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::{Span, instrument};

use crate::error::MarketClientError;

#[derive(Serialize)]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct IdBody {
    id: ProductId,
}

#[derive(Serialize)]
struct RateBody {
    id: ProductId,
    rating: Rating,
}

#[derive(Serialize)]
struct WalletBody<'a> {
    wallet: &'a str,
}

#[derive(Serialize)]
struct SwitchBody {
    id: ProductId,
    is_sell_now: bool,
}

/// A client for the marketplace auth and core APIs.
#[derive(Clone, Debug)]
pub struct MarketClient {
    /// Base URL of the auth API
    auth_base: Url,
    /// Base URL of the core API
    core_base: Url,
    /// Shared Reqwest HTTP client
    client: Client,
    /// Optional request timeout
    timeout: Option<Duration>,
}

impl MarketClient {
    /// Constructs a client from already parsed base URLs.
    #[must_use]
    pub fn new(auth_base: Url, core_base: Url) -> Self {
        Self {
            auth_base,
            core_base,
            client: Client::new(),
            timeout: None,
        }
    }

    /// Constructs a client from base URL strings.
    ///
    /// Trailing slashes are normalized so endpoint paths always join below
    /// the given base.
    ///
    /// # Errors
    ///
    /// Returns [`MarketClientError::UrlParse`] if either URL is invalid.
    pub fn try_new(auth_base: &str, core_base: &str) -> Result<Self, MarketClientError> {
        Ok(Self::new(
            normalize_base(auth_base, "Failed to parse auth API base url")?,
            normalize_base(core_base, "Failed to parse core API base url")?,
        ))
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the auth API base URL.
    #[must_use]
    pub const fn auth_base(&self) -> &Url {
        &self.auth_base
    }

    /// Returns the core API base URL.
    #[must_use]
    pub const fn core_base(&self) -> &Url {
        &self.core_base
    }

    /// Returns the configured timeout, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Sends `POST RefreshToken` to the auth API.
    ///
    /// # Errors
    ///
    /// Returns [`MarketClientError`] if the request fails or is rejected.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "dmp.market_client.refresh", skip_all, err)
    )]
    pub async fn refresh(&self, refresh_token: &str) -> Result<CredentialPair, MarketClientError> {
        const CONTEXT: &str = "POST RefreshToken";
        let url = join(&self.auth_base, "RefreshToken", CONTEXT)?;
        let req = self.client.post(url).json(&RefreshBody { refresh_token });
        self.fetch_json(req, CONTEXT).await
    }

    /// Sends `GET Protected/GetAllFeed`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketClientError`] if the request fails or is rejected.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "dmp.market_client.feed", skip_all, err)
    )]
    pub async fn feed(&self, token: &str) -> Result<Vec<Product>, MarketClientError> {
        self.product_list(token, "Protected/GetAllFeed", "GET Protected/GetAllFeed")
            .await
    }

    /// Sends `GET Protected/GetCart`. A `null` cart is empty.
    ///
    /// # Errors
    ///
    /// Returns [`MarketClientError`] if the request fails or is rejected.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "dmp.market_client.cart", skip_all, err)
    )]
    pub async fn cart(&self, token: &str) -> Result<Vec<Product>, MarketClientError> {
        self.product_list(token, "Protected/GetCart", "GET Protected/GetCart")
            .await
    }

    /// Sends `POST protected/addToCart`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketClientError`] if the request fails or is rejected.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "dmp.market_client.add_to_cart", skip(self, token), err)
    )]
    pub async fn add_to_cart(&self, token: &str, id: ProductId) -> Result<(), MarketClientError> {
        self.post(token, "protected/addToCart", "POST protected/addToCart", &IdBody { id })
            .await
    }

    /// Sends `POST protected/removeFromCart`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketClientError`] if the request fails or is rejected.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "dmp.market_client.remove_from_cart", skip(self, token), err)
    )]
    pub async fn remove_from_cart(
        &self,
        token: &str,
        id: ProductId,
    ) -> Result<(), MarketClientError> {
        self.post(
            token,
            "protected/removeFromCart",
            "POST protected/removeFromCart",
            &IdBody { id },
        )
        .await
    }

    /// Sends `POST Protected/BuyProduct` and decodes the payment order.
    ///
    /// # Errors
    ///
    /// Returns [`MarketClientError`] if the request fails or is rejected.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "dmp.market_client.buy_product", skip(self, token), err)
    )]
    pub async fn buy_product(
        &self,
        token: &str,
        id: ProductId,
    ) -> Result<PaymentOrder, MarketClientError> {
        const CONTEXT: &str = "POST Protected/BuyProduct";
        let url = join(&self.core_base, "Protected/BuyProduct", CONTEXT)?;
        let req = self.client.post(url).bearer_auth(token).json(&IdBody { id });
        self.fetch_json(req, CONTEXT).await
    }

    /// Sends `POST protected/deliveryGoods`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketClientError`] if the request fails or is rejected.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "dmp.market_client.deliver", skip(self, token), err)
    )]
    pub async fn deliver(&self, token: &str, id: ProductId) -> Result<(), MarketClientError> {
        self.post(
            token,
            "protected/deliveryGoods",
            "POST protected/deliveryGoods",
            &IdBody { id },
        )
        .await
    }

    /// Sends `POST Protected/RateProduct`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketClientError`] if the request fails or is rejected.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "dmp.market_client.rate", skip(self, token), err)
    )]
    pub async fn rate(
        &self,
        token: &str,
        id: ProductId,
        rating: Rating,
    ) -> Result<(), MarketClientError> {
        self.post(
            token,
            "Protected/RateProduct",
            "POST Protected/RateProduct",
            &RateBody { id, rating },
        )
        .await
    }

    /// Sends `GET Protected/GetMyProfile`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketClientError`] if the request fails or is rejected.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "dmp.market_client.profile", skip_all, err)
    )]
    pub async fn profile(&self, token: &str) -> Result<UserProfile, MarketClientError> {
        self.get_json(token, "Protected/GetMyProfile", "GET Protected/GetMyProfile")
            .await
    }

    /// Sends `GET Protected/GetWallet`.
    ///
    /// The address may come back as a JSON string or as plain text.
    ///
    /// # Errors
    ///
    /// Returns [`MarketClientError`] if the request fails or is rejected.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "dmp.market_client.wallet", skip_all, err)
    )]
    pub async fn wallet(&self, token: &str) -> Result<String, MarketClientError> {
        const CONTEXT: &str = "GET Protected/GetWallet";
        let url = join(&self.core_base, "Protected/GetWallet", CONTEXT)?;
        let body = self
            .fetch_text(self.client.get(url).bearer_auth(token), CONTEXT)
            .await?;
        let wallet = serde_json::from_str::<String>(&body)
            .unwrap_or_else(|_| body.trim().to_owned());
        Ok(wallet)
    }

    /// Sends `GET Protected/GetBalance`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketClientError`] if the request fails or is rejected.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "dmp.market_client.balance", skip_all, err)
    )]
    pub async fn balance(&self, token: &str) -> Result<EthAmount, MarketClientError> {
        self.get_json(token, "Protected/GetBalance", "GET Protected/GetBalance")
            .await
    }

    /// Sends `POST Protected/UpdateWallet`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketClientError`] if the request fails or is rejected.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "dmp.market_client.update_wallet", skip(self, token), err)
    )]
    pub async fn update_wallet(&self, token: &str, wallet: &str) -> Result<(), MarketClientError> {
        self.post(
            token,
            "Protected/UpdateWallet",
            "POST Protected/UpdateWallet",
            &WalletBody { wallet },
        )
        .await
    }

    /// Sends `GET Protected/GetMyProduct`. A `null` list is empty.
    ///
    /// # Errors
    ///
    /// Returns [`MarketClientError`] if the request fails or is rejected.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "dmp.market_client.my_products", skip_all, err)
    )]
    pub async fn my_products(&self, token: &str) -> Result<Vec<Product>, MarketClientError> {
        self.product_list(token, "Protected/GetMyProduct", "GET Protected/GetMyProduct")
            .await
    }

    /// Sends `POST Protected/SwitchProduct` with the current listing flag.
    ///
    /// # Errors
    ///
    /// Returns [`MarketClientError`] if the request fails or is rejected.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "dmp.market_client.switch_product", skip(self, token), err)
    )]
    pub async fn switch_product(
        &self,
        token: &str,
        id: ProductId,
        is_sell_now: bool,
    ) -> Result<(), MarketClientError> {
        self.post(
            token,
            "Protected/SwitchProduct",
            "POST Protected/SwitchProduct",
            &SwitchBody { id, is_sell_now },
        )
        .await
    }

    /// Authenticated GET on the core API, decoding a JSON body.
    async fn get_json<R>(
        &self,
        token: &str,
        path: &str,
        context: &'static str,
    ) -> Result<R, MarketClientError>
    where
        R: DeserializeOwned,
    {
        let url = join(&self.core_base, path, context)?;
        self.fetch_json(self.client.get(url).bearer_auth(token), context)
            .await
    }

    /// Authenticated GET of a product list. Records that do not decode are
    /// skipped.
    async fn product_list(
        &self,
        token: &str,
        path: &str,
        context: &'static str,
    ) -> Result<Vec<Product>, MarketClientError> {
        let list: ProductList = self.get_json(token, path, context).await?;
        #[cfg(feature = "telemetry")]
        if list.skipped > 0 {
            tracing::warn!(skipped = list.skipped, context, "Skipped inconsistent product records");
        }
        Ok(list.products)
    }

    /// Authenticated POST on the core API whose response body is ignored.
    async fn post<T>(
        &self,
        token: &str,
        path: &str,
        context: &'static str,
        payload: &T,
    ) -> Result<(), MarketClientError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let url = join(&self.core_base, path, context)?;
        let req = self.client.post(url).bearer_auth(token).json(payload);
        self.fetch_text(req, context).await.map(drop)
    }

    async fn fetch_json<R>(
        &self,
        req: RequestBuilder,
        context: &'static str,
    ) -> Result<R, MarketClientError>
    where
        R: DeserializeOwned,
    {
        let body = self.fetch_text(req, context).await?;
        let result = serde_json::from_str::<R>(&body)
            .map_err(|source| MarketClientError::JsonDeserialization { context, source });
        record_result_on_span(&result);
        result
    }

    /// Sends the request and returns the body of a success response.
    async fn fetch_text(
        &self,
        mut req: RequestBuilder,
        context: &'static str,
    ) -> Result<String, MarketClientError> {
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let http_response = req
            .send()
            .await
            .map_err(|e| MarketClientError::Http { context, source: e })?;

        let status = http_response.status();
        let body = http_response
            .text()
            .await
            .map_err(|e| MarketClientError::ResponseBodyRead { context, source: e });
        let result = match body {
            Ok(body) if status.is_success() => Ok(body),
            Ok(body) => Err(MarketClientError::HttpStatus {
                context,
                status,
                message: extract_message(&body, status),
            }),
            Err(err) => Err(err),
        };

        record_result_on_span(&result);

        result
    }
}

/// Converts a string URL into a `MarketClient` using the same base for both
/// APIs.
impl TryFrom<&str> for MarketClient {
    type Error = MarketClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_new(value, value)
    }
}

impl Marketplace for MarketClient {
    fn feed<'a>(&'a self, token: &'a str) -> BoxFuture<'a, BackendResult<Vec<Product>>> {
        Box::pin(async move { Self::feed(self, token).await.map_err(BackendError::from) })
    }

    fn cart<'a>(&'a self, token: &'a str) -> BoxFuture<'a, BackendResult<Vec<Product>>> {
        Box::pin(async move { Self::cart(self, token).await.map_err(BackendError::from) })
    }

    fn add_to_cart<'a>(&'a self, token: &'a str, id: ProductId) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            Self::add_to_cart(self, token, id)
                .await
                .map_err(BackendError::from)
        })
    }

    fn remove_from_cart<'a>(
        &'a self,
        token: &'a str,
        id: ProductId,
    ) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            Self::remove_from_cart(self, token, id)
                .await
                .map_err(BackendError::from)
        })
    }

    fn buy_product<'a>(
        &'a self,
        token: &'a str,
        id: ProductId,
    ) -> BoxFuture<'a, BackendResult<PaymentOrder>> {
        Box::pin(async move {
            Self::buy_product(self, token, id)
                .await
                .map_err(BackendError::from)
        })
    }

    fn deliver<'a>(&'a self, token: &'a str, id: ProductId) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            Self::deliver(self, token, id)
                .await
                .map_err(BackendError::from)
        })
    }

    fn rate<'a>(
        &'a self,
        token: &'a str,
        id: ProductId,
        rating: Rating,
    ) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            Self::rate(self, token, id, rating)
                .await
                .map_err(BackendError::from)
        })
    }

    fn profile<'a>(&'a self, token: &'a str) -> BoxFuture<'a, BackendResult<UserProfile>> {
        Box::pin(async move { Self::profile(self, token).await.map_err(BackendError::from) })
    }

    fn wallet<'a>(&'a self, token: &'a str) -> BoxFuture<'a, BackendResult<String>> {
        Box::pin(async move { Self::wallet(self, token).await.map_err(BackendError::from) })
    }

    fn balance<'a>(&'a self, token: &'a str) -> BoxFuture<'a, BackendResult<EthAmount>> {
        Box::pin(async move { Self::balance(self, token).await.map_err(BackendError::from) })
    }

    fn update_wallet<'a>(
        &'a self,
        token: &'a str,
        wallet: &'a str,
    ) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            Self::update_wallet(self, token, wallet)
                .await
                .map_err(BackendError::from)
        })
    }

    fn my_products<'a>(&'a self, token: &'a str) -> BoxFuture<'a, BackendResult<Vec<Product>>> {
        Box::pin(async move {
            Self::my_products(self, token)
                .await
                .map_err(BackendError::from)
        })
    }

    fn switch_product<'a>(
        &'a self,
        token: &'a str,
        id: ProductId,
        is_sell_now: bool,
    ) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            Self::switch_product(self, token, id, is_sell_now)
                .await
                .map_err(BackendError::from)
        })
    }
}

impl TokenExchange for MarketClient {
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, BackendResult<CredentialPair>> {
        Box::pin(async move {
            Self::refresh(self, refresh_token)
                .await
                .map_err(BackendError::from)
        })
    }
}

/// Parses `value` as a base URL ending in exactly one slash.
fn normalize_base(value: &str, context: &'static str) -> Result<Url, MarketClientError> {
    let mut normalized = value.trim_end_matches('/').to_string();
    normalized.push('/');
    Url::parse(&normalized).map_err(|source| MarketClientError::UrlParse { context, source })
}

fn join(base: &Url, path: &str, context: &'static str) -> Result<Url, MarketClientError> {
    base.join(path)
        .map_err(|source| MarketClientError::UrlParse { context, source })
}

/// Best-effort human-readable reason of a failed response.
fn extract_message(body: &str, status: http::StatusCode) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => {
            for key in ["message", "error"] {
                if let Some(serde_json::Value::String(message)) = map.get(key) {
                    return message.clone();
                }
            }
        }
        Ok(serde_json::Value::String(message)) if !message.is_empty() => return message,
        _ => {}
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status.to_string()
    } else {
        trimmed.to_owned()
    }
}

/// Records the outcome of a request on a tracing span, including status and errors.
#[cfg(feature = "telemetry")]
fn record_result_on_span<R, E: Display>(result: &Result<R, E>) {
    let span = Span::current();
    match result {
        Ok(_) => {
            span.record("otel.status_code", "OK");
        }
        Err(err) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.message", tracing::field::display(err));
            tracing::event!(tracing::Level::ERROR, error = %err, "Request to marketplace failed");
        }
    }
}

/// Records the outcome of a request on a tracing span, including status and errors.
/// Noop if telemetry feature is off.
#[cfg(not(feature = "telemetry"))]
fn record_result_on_span<R, E: Display>(_result: &Result<R, E>) {}

//! In-memory fakes for the backend, token exchange and wallet traits.

use std::collections::HashSet;
use std::sync::Mutex;

use alloy_primitives::{Address, B256};
use serde_json::json;

use crate::amount::EthAmount;
use crate::backend::{BackendResult, BoxFuture, Marketplace, TokenExchange};
use crate::error::{BackendError, WalletError};
use crate::model::{CredentialPair, PaymentOrder, Product, ProductId, Rating, UserProfile};
use crate::wallet::{PayForProduct, TxReceipt, WalletProvider};

/// Builds a product with the given lifecycle flags.
pub fn product(id: ProductId, is_buy: bool, is_rated: bool, is_sell_now: bool) -> Product {
    serde_json::from_value(json!({
        "id": id,
        "title": format!("product {id}"),
        "description": "",
        "price": 0.000000001,
        "pub_date": "2025-01-01T00:00:00Z",
        "is_buy": is_buy,
        "is_rated": is_rated,
        "is_sell_now": is_sell_now,
        "image": "",
        "Seller": { "id": 1, "user_name": "seller", "rating": 9.0, "count_rating": 3 }
    }))
    .unwrap()
}

pub fn order() -> PaymentOrder {
    serde_json::from_value(json!({
        "Price": 0.000000001,
        "Address": "0x00000000000000000000000000000000000000aa",
        "OrderId": 1,
        "SellerAddress": "0x00000000000000000000000000000000000000bb"
    }))
    .unwrap()
}

#[derive(Default)]
pub struct FakeBackend {
    pub cart: Mutex<Vec<Product>>,
    pub feed: Mutex<Vec<Product>>,
    pub my_products: Mutex<Vec<Product>>,
    pub order: Mutex<Option<PaymentOrder>>,
    pub profile: Mutex<Option<UserProfile>>,
    pub wallet: Mutex<String>,
    pub balance: Mutex<EthAmount>,
    failing: Mutex<HashSet<&'static str>>,
    calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn with_cart(cart: Vec<Product>) -> Self {
        let backend = Self::default();
        *backend.cart.lock().unwrap() = cart;
        *backend.order.lock().unwrap() = Some(order());
        backend
    }

    pub fn fail(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called(&self, op: &str) -> bool {
        self.calls()
            .iter()
            .any(|c| c == op || c.starts_with(&format!("{op}:")))
    }

    fn respond<T: Send + 'static>(
        &self,
        op: &'static str,
        id: Option<ProductId>,
        value: impl FnOnce() -> BackendResult<T>,
    ) -> BoxFuture<'static, BackendResult<T>> {
        let call = id.map_or_else(|| op.to_owned(), |id| format!("{op}:{id}"));
        self.calls.lock().unwrap().push(call);
        let result = if self.failing.lock().unwrap().contains(op) {
            Err(BackendError::Rejected {
                status: 400,
                message: format!("{op} rejected"),
            })
        } else {
            value()
        };
        Box::pin(async move { result })
    }
}

impl Marketplace for FakeBackend {
    fn feed<'a>(&'a self, _token: &'a str) -> BoxFuture<'a, BackendResult<Vec<Product>>> {
        self.respond("feed", None, || Ok(self.feed.lock().unwrap().clone()))
    }

    fn cart<'a>(&'a self, _token: &'a str) -> BoxFuture<'a, BackendResult<Vec<Product>>> {
        self.respond("cart", None, || Ok(self.cart.lock().unwrap().clone()))
    }

    fn add_to_cart<'a>(&'a self, _token: &'a str, id: ProductId) -> BoxFuture<'a, BackendResult<()>> {
        self.respond("add_to_cart", Some(id), || Ok(()))
    }

    fn remove_from_cart<'a>(
        &'a self,
        _token: &'a str,
        id: ProductId,
    ) -> BoxFuture<'a, BackendResult<()>> {
        self.respond("remove_from_cart", Some(id), || Ok(()))
    }

    fn buy_product<'a>(
        &'a self,
        _token: &'a str,
        id: ProductId,
    ) -> BoxFuture<'a, BackendResult<PaymentOrder>> {
        self.respond("buy_product", Some(id), || {
            self.order.lock().unwrap().clone().ok_or(BackendError::Rejected {
                status: 409,
                message: "product unavailable".into(),
            })
        })
    }

    fn deliver<'a>(&'a self, _token: &'a str, id: ProductId) -> BoxFuture<'a, BackendResult<()>> {
        self.respond("deliver", Some(id), || Ok(()))
    }

    fn rate<'a>(
        &'a self,
        _token: &'a str,
        id: ProductId,
        _rating: Rating,
    ) -> BoxFuture<'a, BackendResult<()>> {
        self.respond("rate", Some(id), || Ok(()))
    }

    fn profile<'a>(&'a self, _token: &'a str) -> BoxFuture<'a, BackendResult<UserProfile>> {
        self.respond("profile", None, || {
            self.profile
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| BackendError::InvalidResponse("no profile".into()))
        })
    }

    fn wallet<'a>(&'a self, _token: &'a str) -> BoxFuture<'a, BackendResult<String>> {
        self.respond("wallet", None, || Ok(self.wallet.lock().unwrap().clone()))
    }

    fn balance<'a>(&'a self, _token: &'a str) -> BoxFuture<'a, BackendResult<EthAmount>> {
        self.respond("balance", None, || Ok(*self.balance.lock().unwrap()))
    }

    fn update_wallet<'a>(
        &'a self,
        _token: &'a str,
        wallet: &'a str,
    ) -> BoxFuture<'a, BackendResult<()>> {
        let wallet = wallet.to_owned();
        self.respond("update_wallet", None, || {
            *self.wallet.lock().unwrap() = wallet;
            Ok(())
        })
    }

    fn my_products<'a>(&'a self, _token: &'a str) -> BoxFuture<'a, BackendResult<Vec<Product>>> {
        self.respond("my_products", None, || {
            Ok(self.my_products.lock().unwrap().clone())
        })
    }

    fn switch_product<'a>(
        &'a self,
        _token: &'a str,
        id: ProductId,
        _is_sell_now: bool,
    ) -> BoxFuture<'a, BackendResult<()>> {
        self.respond("switch_product", Some(id), || Ok(()))
    }
}

enum Reply {
    Pair(CredentialPair),
    Revoked,
    Hang,
    Panic,
}

pub struct FakeExchange {
    reply: Reply,
    seen: Mutex<Vec<String>>,
}

impl FakeExchange {
    const fn with_reply(reply: Reply) -> Self {
        Self {
            reply,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub const fn succeeding(response: CredentialPair) -> Self {
        Self::with_reply(Reply::Pair(response))
    }

    pub const fn failing() -> Self {
        Self::with_reply(Reply::Revoked)
    }

    /// Never answers.
    pub const fn hanging() -> Self {
        Self::with_reply(Reply::Hang)
    }

    pub const fn panicking() -> Self {
        Self::with_reply(Reply::Panic)
    }

    pub fn seen_tokens(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl TokenExchange for FakeExchange {
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, BackendResult<CredentialPair>> {
        self.seen.lock().unwrap().push(refresh_token.to_owned());
        match &self.reply {
            Reply::Pair(pair) => {
                let pair = pair.clone();
                Box::pin(async move { Ok(pair) })
            }
            Reply::Revoked => Box::pin(async {
                Err(BackendError::Unauthorized("refresh token revoked".into()))
            }),
            Reply::Hang => Box::pin(std::future::pending()),
            Reply::Panic => panic!("token exchange blew up"),
        }
    }
}

pub struct FakeWallet {
    pub accounts: Vec<Address>,
    outcome: Result<TxReceipt, WalletError>,
    calls: Mutex<Vec<PayForProduct>>,
}

impl FakeWallet {
    pub fn confirming() -> Self {
        Self {
            accounts: vec![Address::with_last_byte(0xcc)],
            outcome: Ok(TxReceipt {
                transaction_hash: B256::with_last_byte(0x01),
                block_number: Some(1),
            }),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            outcome: Err(WalletError::Rejected("user denied transaction signature".into())),
            ..Self::confirming()
        }
    }

    pub fn calls(&self) -> Vec<PayForProduct> {
        self.calls.lock().unwrap().clone()
    }
}

impl WalletProvider for FakeWallet {
    fn request_accounts(&self) -> BoxFuture<'_, Result<Vec<Address>, WalletError>> {
        let accounts = self.accounts.clone();
        Box::pin(async move { Ok(accounts) })
    }

    fn pay_for_product<'a>(
        &'a self,
        call: &'a PayForProduct,
    ) -> BoxFuture<'a, Result<TxReceipt, WalletError>> {
        self.calls.lock().unwrap().push(*call);
        let outcome = self.outcome.clone();
        Box::pin(async move { outcome })
    }
}

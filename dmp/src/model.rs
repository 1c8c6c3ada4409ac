//! Marketplace data model.
//!
//! Types here mirror the JSON the backend sends, with one deliberate
//! difference: the purchase/rating/listing flags of a product are folded into
//! a single [`ProductStatus`], so combinations the backend can never mean
//! (rated but not purchased) are rejected when decoding. In a
//! [`ProductList`] such a record is skipped instead of failing the list.

use std::fmt;

use alloy_primitives::{Address, U256};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::amount::EthAmount;

/// Backend identifier of a product.
pub type ProductId = u64;

/// Where a product is in its lifecycle.
///
/// `Unlisted -> Listed -> PurchasedUnrated -> PurchasedRated`; each step is a
/// separate user action persisted by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductStatus {
    /// Owned by the seller, not offered for sale.
    Unlisted,
    /// Offered for sale.
    Listed,
    /// Bought, waiting for the buyer's rating.
    PurchasedUnrated,
    /// Bought and rated.
    PurchasedRated,
}

impl ProductStatus {
    /// Builds the status from the backend's flags.
    ///
    /// `is_sell_now` is meaningless once the product is purchased and is
    /// ignored then. Returns `None` for a rated product that was never bought.
    #[must_use]
    pub const fn from_flags(is_buy: bool, is_rated: bool, is_sell_now: bool) -> Option<Self> {
        match (is_buy, is_rated, is_sell_now) {
            (true, true, _) => Some(Self::PurchasedRated),
            (true, false, _) => Some(Self::PurchasedUnrated),
            (false, true, _) => None,
            (false, false, true) => Some(Self::Listed),
            (false, false, false) => Some(Self::Unlisted),
        }
    }

    /// Whether the product has been bought.
    #[must_use]
    pub const fn is_purchased(self) -> bool {
        matches!(self, Self::PurchasedUnrated | Self::PurchasedRated)
    }

    /// Whether the buyer rated the product.
    #[must_use]
    pub const fn is_rated(self) -> bool {
        matches!(self, Self::PurchasedRated)
    }

    /// Whether the product is currently offered for sale.
    #[must_use]
    pub const fn is_listed(self) -> bool {
        matches!(self, Self::Listed)
    }

    /// Whether a rating may be submitted.
    #[must_use]
    pub const fn can_rate(self) -> bool {
        matches!(self, Self::PurchasedUnrated)
    }
}

/// A user action offered on a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Buy the product on chain.
    Pay,
    /// Drop the product from the cart.
    Remove,
    /// Confirm delivery of a bought product.
    Deliver,
    /// Rate a bought product.
    Rate,
    /// Put an own product on sale or take it off.
    ToggleListing,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pay => "pay",
            Self::Remove => "remove",
            Self::Deliver => "deliver",
            Self::Rate => "rate",
            Self::ToggleListing => "toggle listing",
        };
        f.write_str(name)
    }
}

/// Seller summary embedded in every product.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Seller {
    /// Backend user id.
    pub id: u64,
    /// Display name.
    #[serde(rename = "user_name")]
    pub name: String,
    /// Average rating.
    pub rating: f64,
    /// Number of ratings received.
    #[serde(rename = "count_rating")]
    pub rating_count: u64,
}

impl Seller {
    /// Rating formatted with at most two fractional digits.
    #[must_use]
    pub fn rating_display(&self) -> String {
        format_rating(self.rating)
    }
}

/// A product as shown in feed, cart and profile lists.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "ProductRecord")]
pub struct Product {
    /// Backend identifier.
    pub id: ProductId,
    /// Title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Price in ETH.
    pub price: EthAmount,
    /// Publication date as sent by the backend (RFC 3339).
    pub pub_date: String,
    /// Lifecycle state.
    pub status: ProductStatus,
    /// Image reference (URL).
    pub image: String,
    /// Who sells it.
    pub seller: Seller,
}

impl Product {
    /// The calendar date part of [`Self::pub_date`].
    #[must_use]
    pub fn publish_date(&self) -> &str {
        self.pub_date.get(..10).unwrap_or(&self.pub_date)
    }
}

#[derive(Deserialize)]
struct ProductRecord {
    id: ProductId,
    title: String,
    #[serde(default)]
    description: String,
    price: EthAmount,
    #[serde(default)]
    pub_date: String,
    #[serde(default)]
    is_buy: bool,
    #[serde(default)]
    is_rated: bool,
    #[serde(default)]
    is_sell_now: bool,
    #[serde(default)]
    image: String,
    #[serde(rename = "Seller")]
    seller: Seller,
}

/// A product whose flags describe no valid lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("product {0} is marked as rated but was never purchased")]
pub struct InconsistentProduct(pub ProductId);

impl TryFrom<ProductRecord> for Product {
    type Error = InconsistentProduct;

    fn try_from(record: ProductRecord) -> Result<Self, Self::Error> {
        let status = ProductStatus::from_flags(record.is_buy, record.is_rated, record.is_sell_now)
            .ok_or(InconsistentProduct(record.id))?;
        Ok(Self {
            id: record.id,
            title: record.title,
            description: record.description,
            price: record.price,
            pub_date: record.pub_date,
            status,
            image: record.image,
            seller: record.seller,
        })
    }
}

/// A product list as sent by the feed, cart and own-products endpoints.
///
/// `null` decodes as an empty list. Records that do not decode as a
/// [`Product`] are dropped and counted in `skipped`; the rest of the list
/// still loads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductList {
    /// Products that decoded.
    pub products: Vec<Product>,
    /// Number of records dropped.
    pub skipped: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListedRecord {
    Valid(Product),
    Invalid(de::IgnoredAny),
}

impl<'de> Deserialize<'de> for ProductList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let records = Option::<Vec<ListedRecord>>::deserialize(deserializer)?;
        let mut list = Self::default();
        for record in records.unwrap_or_default() {
            match record {
                ListedRecord::Valid(product) => list.products.push(product),
                ListedRecord::Invalid(_) => list.skipped += 1,
            }
        }
        Ok(list)
    }
}

/// Payment parameters returned by the backend for one purchase attempt.
///
/// Never persisted; it only lives for the duration of the attempt.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentOrder {
    /// Payment router contract to call.
    #[serde(rename = "Address")]
    pub contract_address: Address,
    /// Backend order identifier passed to the contract.
    #[serde(rename = "OrderId", deserialize_with = "deserialize_order_id")]
    pub order_id: U256,
    /// Seller's payout address.
    #[serde(rename = "SellerAddress")]
    pub seller_address: Address,
    /// Amount to pay in ETH.
    #[serde(rename = "Price", alias = "price")]
    pub price: EthAmount,
}

fn deserialize_order_id<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    struct OrderIdVisitor;

    impl Visitor<'_> for OrderIdVisitor {
        type Value = U256;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an order id as an unsigned integer or a numeric string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<U256, E> {
            Ok(U256::from(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<U256, E> {
            u64::try_from(v)
                .map(U256::from)
                .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<U256, E> {
            v.trim()
                .parse::<U256>()
                .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }

    deserializer.deserialize_any(OrderIdVisitor)
}

/// The signed-in user's own profile.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserProfile {
    /// Display name.
    pub user_name: String,
    /// Average rating received as a seller.
    pub rating: f64,
    /// Number of ratings received.
    pub count_rating: u64,
    /// Backend id of the linked wallet.
    #[serde(default)]
    pub wallet_id: u64,
}

impl UserProfile {
    /// Rating formatted with at most two fractional digits.
    #[must_use]
    pub fn rating_display(&self) -> String {
        format_rating(self.rating)
    }
}

/// A buyer's rating of a purchase, from 1 to 10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Rating(u8);

impl Rating {
    /// Lowest accepted rating.
    pub const MIN: u8 = 1;
    /// Highest accepted rating.
    pub const MAX: u8 = 10;

    /// Validates a rating value.
    #[must_use]
    pub const fn new(value: u8) -> Option<Self> {
        if value >= Self::MIN && value <= Self::MAX {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

/// An access token with the refresh token that can mint its successor.
///
/// Both values are opaque; their format belongs to the backend.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct CredentialPair {
    /// Short-lived bearer token.
    #[serde(rename = "accessToken")]
    pub access_token: String,
    /// Long-lived token exchanged for new pairs.
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

impl CredentialPair {
    /// Creates a credential pair.
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

fn format_rating(rating: f64) -> String {
    let fixed = format!("{rating:.2}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_owned()
    } else {
        trimmed.to_owned()
    }
}

//! Exact ETH amounts.
//!
//! Prices travel from the backend as JSON numbers denominated in ETH. They are
//! decoded into [`EthAmount`], an exact decimal, from the shortest decimal
//! representation of the number. Conversion to on-chain base units (wei) is
//! then exact integer arithmetic: an amount that would need rounding is
//! rejected instead of being silently changed.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::U256;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};

use crate::error::AmountError;

/// An amount of ETH, kept as an exact decimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EthAmount(Decimal);

impl EthAmount {
    /// Number of fractional digits of one ETH in base units.
    pub const DECIMALS: u32 = 18;

    /// Fractional digits shown when an amount is displayed.
    pub const DISPLAY_DECIMALS: u32 = 9;

    /// Wraps a decimal ETH amount.
    #[must_use]
    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Returns the underlying decimal.
    #[must_use]
    pub const fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Converts the amount to base units (`amount * 10^18`).
    ///
    /// # Errors
    ///
    /// Returns [`AmountError::Negative`] for negative amounts and
    /// [`AmountError::TooPrecise`] when the amount has more than
    /// [`Self::DECIMALS`] fractional digits.
    pub fn to_base_units(&self) -> Result<U256, AmountError> {
        if self.0.is_sign_negative() && !self.0.is_zero() {
            return Err(AmountError::Negative(self.0));
        }
        let normalized = self.0.normalize();
        let scale = normalized.scale();
        if scale > Self::DECIMALS {
            return Err(AmountError::TooPrecise {
                value: self.0,
                max: Self::DECIMALS,
            });
        }
        let mantissa = normalized.mantissa().unsigned_abs();
        let factor = U256::from(10u64.pow(Self::DECIMALS - scale));
        Ok(U256::from(mantissa) * factor)
    }

    /// Formats the amount for display: at most [`Self::DISPLAY_DECIMALS`]
    /// fractional digits, trailing zeros removed, no digit grouping.
    #[must_use]
    pub fn display(&self) -> String {
        self.0
            .round_dp_with_strategy(
                Self::DISPLAY_DECIMALS,
                RoundingStrategy::MidpointAwayFromZero,
            )
            .normalize()
            .to_string()
    }

    fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        // `f64` formatting yields the shortest string that round-trips, never
        // in exponent notation.
        Decimal::from_str_exact(&value.to_string()).ok().map(Self)
    }
}

impl From<Decimal> for EthAmount {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl FromStr for EthAmount {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str_exact(s.trim()).map(Self)
    }
}

impl fmt::Display for EthAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ETH", self.display())
    }
}

impl<'de> Deserialize<'de> for EthAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(EthAmountVisitor)
    }
}

struct EthAmountVisitor;

impl Visitor<'_> for EthAmountVisitor {
    type Value = EthAmount;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an ETH amount as a number or a decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(EthAmount(Decimal::from(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(EthAmount(Decimal::from(v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        EthAmount::from_f64(v)
            .ok_or_else(|| E::invalid_value(de::Unexpected::Float(v), &self))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse()
            .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
    }
}

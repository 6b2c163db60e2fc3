//! Fixed-point money
//!
//! Rewards and balances are currency values with exactly four fractional
//! digits. They are held as a count of ten-thousandths so that storage-level
//! arithmetic (`total = total + ?`) stays exact, and are rendered through
//! `rust_decimal` so the scale survives serialization (`"0.5000"`).

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of fractional digits carried by every amount
pub const AMOUNT_SCALE: u32 = 4;

/// Errors converting a decimal into an [`Amount`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("Invalid amount '{0}'")]
    Unparseable(String),

    #[error("Amount {0} has more than 4 fractional digits")]
    TooPrecise(Decimal),

    #[error("Amount {0} is out of range")]
    OutOfRange(Decimal),
}

/// A monetary value in ten-thousandths
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Build from a raw count of ten-thousandths
    pub const fn from_units(units: i64) -> Self {
        Self(units)
    }

    /// Raw count of ten-thousandths
    pub const fn units(self) -> i64 {
        self.0
    }

    /// Convert an exact decimal. Values carrying more than four significant
    /// fractional digits are rejected rather than rounded.
    pub fn from_decimal(value: Decimal) -> Result<Self, AmountError> {
        if value.normalize().scale() > AMOUNT_SCALE {
            return Err(AmountError::TooPrecise(value));
        }

        let mut scaled = value;
        scaled.rescale(AMOUNT_SCALE);
        i64::try_from(scaled.mantissa())
            .map(Self)
            .map_err(|_| AmountError::OutOfRange(value))
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, AMOUNT_SCALE)
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value =
            Decimal::from_str(s.trim()).map_err(|_| AmountError::Unparseable(s.to_string()))?;
        Self::from_decimal(value)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Serialize::serialize(&self.to_decimal(), serializer)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = <Decimal as Deserialize>::deserialize(deserializer)?;
        Amount::from_decimal(value).map_err(serde::de::Error::custom)
    }
}

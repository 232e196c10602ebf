//! Monetary amounts and hour quantities.
//!
//! Both wrap [`Decimal`] and refuse negative values at construction. Money is
//! held at two decimal places, rounded half-up, which is how payroll amounts
//! are reported.
use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::ValidationError;

pub const MONEY_SCALE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Result<Self, ValidationError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(ValidationError::NegativeAmount(amount));
        }
        Ok(Self(round_half_up(amount)))
    }
    pub fn from_cents(cents: u32) -> Self {
        Self(Decimal::new(i64::from(cents), MONEY_SCALE))
    }
    pub fn parse(amount: &str) -> Result<Self, ValidationError> {
        let value = Decimal::from_str(amount.trim())
            .map_err(|_| ValidationError::Unparseable(amount.to_owned()))?;
        Self::new(value)
    }
    pub fn amount(&self) -> Decimal {
        self.0
    }
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(|v| Money(round_half_up(v)))
    }
    /// `None` when the result would be negative.
    pub fn checked_sub(self, other: Money) -> Option<Money> {
        let v = self.0.checked_sub(other.0)?;
        if v.is_sign_negative() && !v.is_zero() {
            return None;
        }
        Some(Money(round_half_up(v)))
    }
    /// Amount for the given number of hours at this hourly rate.
    pub fn times(self, hours: Hours) -> Option<Money> {
        self.0.checked_mul(hours.0).map(|v| Money(round_half_up(v)))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}

fn round_half_up(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hours(Decimal);

impl Hours {
    pub const ZERO: Hours = Hours(Decimal::ZERO);

    pub fn new(hours: Decimal) -> Result<Self, ValidationError> {
        if hours.is_sign_negative() && !hours.is_zero() {
            return Err(ValidationError::NegativeHours(hours));
        }
        Ok(Self(hours.normalize()))
    }
    pub fn from_tenths(tenths: u32) -> Self {
        Self(Decimal::new(i64::from(tenths), 1).normalize())
    }
    pub fn parse(hours: &str) -> Result<Self, ValidationError> {
        let value = Decimal::from_str(hours.trim())
            .map_err(|_| ValidationError::Unparseable(hours.to_owned()))?;
        Self::new(value)
    }
    pub fn value(&self) -> Decimal {
        self.0
    }
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
    pub fn checked_add(self, other: Hours) -> Option<Hours> {
        self.0.checked_add(other.0).map(|v| Hours(v.normalize()))
    }
}

// at least one decimal place so "2" reads as "2.0h"
impl fmt::Display for Hours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.scale() == 0 {
            write!(f, "{}.0h", self.0)
        } else {
            write!(f, "{}h", self.0)
        }
    }
}

macro_rules! decimal_cbor {
    ($name:ident, $ctor:path) => {
        // decimal string keeps the stored value exact and human readable
        impl<C> minicbor::Encode<C> for $name {
            fn encode<W: minicbor::encode::Write>(
                &self,
                e: &mut minicbor::Encoder<W>,
                _: &mut C,
            ) -> Result<(), minicbor::encode::Error<W::Error>> {
                e.str(&self.0.to_string())?.ok()
            }
        }

        impl<'b, C> minicbor::Decode<'b, C> for $name {
            fn decode(
                d: &mut minicbor::Decoder<'b>,
                _: &mut C,
            ) -> Result<Self, minicbor::decode::Error> {
                let raw = d.str()?;
                let value = Decimal::from_str(raw)
                    .map_err(|_| minicbor::decode::Error::message("invalid decimal"))?;
                $ctor(value).map_err(|_| minicbor::decode::Error::message("negative quantity"))
            }
        }
    };
}

decimal_cbor!(Money, Money::new);
decimal_cbor!(Hours, Hours::new);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_rounds_half_up() {
        assert_eq!(Money::parse("10.005").unwrap().to_string(), "$10.01");
        assert_eq!(Money::parse("10.004").unwrap().to_string(), "$10.00");
        assert_eq!(Money::parse("7").unwrap().to_string(), "$7.00");
    }

    #[test]
    fn cents_convert_exactly() {
        assert_eq!(Money::from_cents(5865), Money::parse("58.65").unwrap());
        assert_eq!(
            Money::from_cents(u32::MAX).to_string(),
            "$42949672.95"
        );
    }

    #[test]
    fn negative_values_are_rejected() {
        assert!(Money::parse("-0.01").is_err());
        assert!(Hours::parse("-1").is_err());
        assert!(Money::ZERO.checked_sub(Money::parse("1").unwrap()).is_none());
    }

    #[test]
    fn hourly_rate_times_hours() {
        let rate = Money::parse("94.50").unwrap();
        let amount = rate.times(Hours::parse("2.0").unwrap()).unwrap();
        assert_eq!(amount, Money::parse("189.00").unwrap());
    }

    #[test]
    fn hours_display_keeps_a_decimal() {
        assert_eq!(Hours::parse("2").unwrap().to_string(), "2.0h");
        assert_eq!(Hours::parse("1.50").unwrap().to_string(), "1.5h");
    }

    #[test]
    fn decimal_encoding_is_exact() {
        let money = Money::parse("117.29").unwrap();
        let encoding = minicbor::to_vec(money).unwrap();
        let decode: Money = minicbor::decode(&encoding).unwrap();
        assert_eq!(money, decode);
    }
}

//! Fixed-point coin amounts.
//!
//! Node RPC speaks decimal coin values (`0.05000000`); everything inside the
//! tool works in integer units. Conversion in both directions goes through
//! decimal strings so a value never passes through a float.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{COIN, COIN_DECIMALS, MAX_MONEY};
use crate::error::AmountError;

/// A non-negative amount in the smallest on-chain unit.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Self = Self(0);
    pub const ONE_COIN: Self = Self(COIN);

    pub const fn from_units(units: u64) -> Self {
        Self(units)
    }

    pub const fn units(self) -> u64 {
        self.0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn checked_mul(self, factor: u64) -> Option<Self> {
        self.0.checked_mul(factor).map(Self)
    }

    /// Sum an iterator of amounts, failing on overflow.
    pub fn checked_sum<I>(iter: I) -> Result<Self, AmountError>
    where
        I: IntoIterator<Item = Self>,
    {
        iter.into_iter()
            .try_fold(Self::ZERO, |acc, a| acc.checked_add(a))
            .ok_or(AmountError::Overflow)
    }

    /// Parse a decimal coin string such as `"1.5"` or `"0.00010000"`.
    ///
    /// Digits past the eighth decimal place are accepted only if they are zero.
    pub fn parse_coins(s: &str) -> Result<Self, AmountError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AmountError::Empty);
        }
        if s.starts_with('-') {
            return Err(AmountError::Negative(s.to_string()));
        }
        let unsigned = s.strip_prefix('+').unwrap_or(s);

        let (whole, frac) = match unsigned.split_once('.') {
            Some((w, f)) => (w, f),
            None => (unsigned, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(AmountError::InvalidFormat(s.to_string()));
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(AmountError::InvalidFormat(s.to_string()));
        }

        let (kept, extra) = frac.split_at(frac.len().min(COIN_DECIMALS));
        if extra.bytes().any(|b| b != b'0') {
            return Err(AmountError::TooPrecise(s.to_string()));
        }

        let whole_units = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u64>()
                .map_err(|_| AmountError::OutOfRange(s.to_string()))?
                .checked_mul(COIN)
                .ok_or_else(|| AmountError::OutOfRange(s.to_string()))?
        };

        let mut frac_units: u64 = 0;
        for (i, b) in kept.bytes().enumerate() {
            let digit = u64::from(b - b'0');
            frac_units += digit * 10u64.pow((COIN_DECIMALS - 1 - i) as u32);
        }

        let units = whole_units
            .checked_add(frac_units)
            .ok_or_else(|| AmountError::OutOfRange(s.to_string()))?;
        if units > MAX_MONEY {
            return Err(AmountError::OutOfRange(s.to_string()));
        }
        Ok(Self(units))
    }

    /// Convert a JSON number from the node into an amount.
    pub fn from_json_number(n: &serde_json::Number) -> Result<Self, AmountError> {
        let text = n.to_string();
        if text.contains(['e', 'E']) {
            return Err(AmountError::InvalidFormat(text));
        }
        Self::parse_coins(&text)
    }

    /// Render as a JSON number with eight decimals, for node RPC parameters.
    pub fn to_json_number(self) -> Result<serde_json::Number, AmountError> {
        serde_json::Number::from_str(&self.to_string())
            .map_err(|e| AmountError::InvalidFormat(e.to_string()))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:0width$}",
            self.0 / COIN,
            self.0 % COIN,
            width = COIN_DECIMALS
        )
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_coins(s)
    }
}

impl From<u64> for Amount {
    fn from(units: u64) -> Self {
        Self(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_whole_coins() {
        assert_eq!(Amount::parse_coins("5").unwrap(), Amount::from_units(5 * COIN));
    }

    #[test]
    fn parse_fractional() {
        assert_eq!(Amount::parse_coins("0.009").unwrap(), Amount::from_units(900_000));
        assert_eq!(Amount::parse_coins(".5").unwrap(), Amount::from_units(COIN / 2));
        assert_eq!(Amount::parse_coins("1.").unwrap(), Amount::ONE_COIN);
    }

    #[test]
    fn parse_smallest_unit() {
        assert_eq!(Amount::parse_coins("0.00000001").unwrap(), Amount::from_units(1));
    }

    #[test]
    fn parse_trailing_zeros_past_eight_places() {
        assert_eq!(
            Amount::parse_coins("0.0500000000").unwrap(),
            Amount::from_units(5_000_000)
        );
    }

    #[test]
    fn parse_rejects_sub_unit_precision() {
        assert!(matches!(
            Amount::parse_coins("0.000000001"),
            Err(AmountError::TooPrecise(_))
        ));
    }

    #[test]
    fn parse_rejects_negative() {
        assert!(matches!(Amount::parse_coins("-1"), Err(AmountError::Negative(_))));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(Amount::parse_coins(""), Err(AmountError::Empty));
        assert!(matches!(Amount::parse_coins("."), Err(AmountError::InvalidFormat(_))));
        assert!(matches!(Amount::parse_coins("1.2.3"), Err(AmountError::InvalidFormat(_))));
        assert!(matches!(Amount::parse_coins("1e5"), Err(AmountError::InvalidFormat(_))));
        assert!(matches!(Amount::parse_coins("abc"), Err(AmountError::InvalidFormat(_))));
    }

    #[test]
    fn parse_rejects_above_max_money() {
        assert!(matches!(
            Amount::parse_coins("21000000.00000001"),
            Err(AmountError::OutOfRange(_))
        ));
        assert!(matches!(
            Amount::parse_coins("999999999999999999999"),
            Err(AmountError::OutOfRange(_))
        ));
    }

    #[test]
    fn display_pads_eight_decimals() {
        assert_eq!(Amount::from_units(900_000).to_string(), "0.00900000");
        assert_eq!(Amount::from_units(5 * COIN + 1).to_string(), "5.00000001");
        assert_eq!(Amount::ZERO.to_string(), "0.00000000");
    }

    #[test]
    fn json_number_keeps_exact_decimal() {
        let n = Amount::from_units(900_000).to_json_number().unwrap();
        assert_eq!(n.to_string(), "0.00900000");
        let v: serde_json::Value = serde_json::from_str("0.1").unwrap();
        let n = v.as_number().unwrap();
        assert_eq!(Amount::from_json_number(n).unwrap(), Amount::from_units(10_000_000));
    }

    #[test]
    fn json_number_rejects_exponent() {
        let v: serde_json::Value = serde_json::from_str("1e-8").unwrap();
        assert!(Amount::from_json_number(v.as_number().unwrap()).is_err());
    }

    #[test]
    fn checked_sum_detects_overflow() {
        let big = Amount::from_units(u64::MAX);
        assert_eq!(
            Amount::checked_sum([big, Amount::from_units(1)]),
            Err(AmountError::Overflow)
        );
        assert_eq!(
            Amount::checked_sum([Amount::from_units(2), Amount::from_units(3)]),
            Ok(Amount::from_units(5))
        );
    }

    #[test]
    fn checked_sub_underflow_is_none() {
        assert_eq!(Amount::from_units(1).checked_sub(Amount::from_units(2)), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn display_then_parse_is_identity(units in 0u64..=MAX_MONEY) {
            let a = Amount::from_units(units);
            prop_assert_eq!(Amount::parse_coins(&a.to_string()).unwrap(), a);
        }
    }
}

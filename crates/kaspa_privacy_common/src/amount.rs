//! The money path. No floating point, ever: amounts are a count of sompi,
//! the smallest indivisible denomination (1 coin = 10^8 sompi).

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};
use std::str::FromStr;

pub const SOMPI_PER_COIN: u64 = 100_000_000;
const MAX_FRACTIONAL_DIGITS: usize = 8;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AmountParseError {
    #[error("amount must not be empty")]
    Empty,
    #[error("amount has more than {MAX_FRACTIONAL_DIGITS} fractional digits")]
    TooManyFractionalDigits,
    #[error("amount contains a non-digit character")]
    InvalidDigit,
    #[error("amount must be greater than zero")]
    Zero,
    #[error("amount overflows u64 sompi")]
    Overflow,
}

/// A count of sompi. Copy, ordered, arithmetic via checked/saturating only —
/// the money path never silently wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Sompi(pub u64);

impl Sompi {
    pub const ZERO: Sompi = Sompi(0);

    pub fn from_coins(coins: u64) -> Self { Sompi(coins.saturating_mul(SOMPI_PER_COIN)) }

    pub fn checked_add(self, other: Sompi) -> Option<Sompi> { self.0.checked_add(other.0).map(Sompi) }

    pub fn checked_sub(self, other: Sompi) -> Option<Sompi> { self.0.checked_sub(other.0).map(Sompi) }

    pub fn is_zero(self) -> bool { self.0 == 0 }
}

impl Add for Sompi {
    type Output = Sompi;

    fn add(self, rhs: Self) -> Self::Output {
        self.checked_add(rhs).expect("sompi addition overflowed u64")
    }
}

impl Sub for Sompi {
    type Output = Sompi;

    fn sub(self, rhs: Self) -> Self::Output {
        self.checked_sub(rhs).expect("sompi subtraction underflowed")
    }
}

impl Sum for Sompi {
    fn sum<I: Iterator<Item = Sompi>>(iter: I) -> Self {
        iter.fold(Sompi::ZERO, |acc, next| acc + next)
    }
}

impl fmt::Display for Sompi {
    /// Renders as a decimal coin amount, e.g. `Sompi(123_456_789)` -> "1.23456789".
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / SOMPI_PER_COIN;
        let frac = self.0 % SOMPI_PER_COIN;
        if frac == 0 {
            write!(f, "{whole}")
        } else {
            write!(f, "{whole}.{:08}", frac)
        }
    }
}

impl FromStr for Sompi {
    type Err = AmountParseError;

    /// Parses a user-facing decimal coin string with at most 8 fractional
    /// digits into an exact sompi count. No floating point involved.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AmountParseError::Empty);
        }

        let (whole_part, frac_part) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if frac_part.len() > MAX_FRACTIONAL_DIGITS {
            return Err(AmountParseError::TooManyFractionalDigits);
        }
        let whole_part = if whole_part.is_empty() { "0" } else { whole_part };
        if !whole_part.chars().all(|c| c.is_ascii_digit()) || !frac_part.chars().all(|c| c.is_ascii_digit()) {
            return Err(AmountParseError::InvalidDigit);
        }

        let whole: u64 = whole_part.parse().map_err(|_| AmountParseError::Overflow)?;
        let mut frac_digits = frac_part.to_string();
        while frac_digits.len() < MAX_FRACTIONAL_DIGITS {
            frac_digits.push('0');
        }
        let frac: u64 = if frac_digits.is_empty() {
            0
        } else {
            frac_digits.parse().map_err(|_| AmountParseError::Overflow)?
        };

        let sompi = whole
            .checked_mul(SOMPI_PER_COIN)
            .and_then(|v| v.checked_add(frac))
            .ok_or(AmountParseError::Overflow)?;
        if sompi == 0 {
            return Err(AmountParseError::Zero);
        }
        Ok(Sompi(sompi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_coins() {
        assert_eq!("1".parse::<Sompi>().unwrap(), Sompi::from_coins(1));
    }

    #[test]
    fn parses_max_precision() {
        assert_eq!("1.23456789".parse::<Sompi>().unwrap(), Sompi(123_456_789));
    }

    #[test]
    fn rejects_excess_precision() {
        assert_eq!(
            "1.234567891".parse::<Sompi>().unwrap_err(),
            AmountParseError::TooManyFractionalDigits
        );
    }

    #[test]
    fn rejects_zero() {
        assert_eq!("0".parse::<Sompi>().unwrap_err(), AmountParseError::Zero);
    }

    #[test]
    fn round_trips_display() {
        let amt = "1.23456789".parse::<Sompi>().unwrap();
        assert_eq!(amt.to_string(), "1.23456789");
        assert_eq!(Sompi::from_coins(60_000_000 / SOMPI_PER_COIN).0, 0);
    }

    #[test]
    fn pads_short_fraction() {
        assert_eq!("0.6".parse::<Sompi>().unwrap(), Sompi(60_000_000));
    }
}

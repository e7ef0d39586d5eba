//! Fixed-point credit amounts.
//!
//! A credit buys one minute of live translation. Balances and charges move in
//! hundredths of a credit (the per-tick charge is 0.05), so amounts are stored
//! as `i64` hundredths to keep tick arithmetic exact across thousands of
//! debits. Floating point never touches the ledger.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A credit amount with two implied fraction digits.
///
/// Serializes as its canonical decimal string (`"9.95"`) and parses the same,
/// accepting zero, one, or two fraction digits. Committed ledger values are
/// never negative; the signed representation exists so that arithmetic
/// mistakes surface as errors instead of wrapping.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Credits(i64);

impl Credits {
    /// Zero credits.
    pub const ZERO: Self = Self(0);

    /// Create an amount from hundredths of a credit.
    #[must_use]
    pub const fn from_hundredths(hundredths: i64) -> Self {
        Self(hundredths)
    }

    /// Create an amount from a whole number of credits.
    #[must_use]
    pub const fn from_whole(credits: i64) -> Self {
        Self(credits * 100)
    }

    /// Return the amount in hundredths of a credit.
    #[must_use]
    pub const fn hundredths(self) -> i64 {
        self.0
    }

    /// Whether the amount is exactly zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Whether the amount is below zero.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Checked addition. `None` on `i64` overflow.
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked subtraction. `None` on `i64` overflow.
    #[must_use]
    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Saturating addition.
    #[must_use]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    /// Saturating subtraction.
    #[must_use]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let mag = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", mag / 100, mag % 100)
    }
}

impl fmt::Debug for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credits({self})")
    }
}

impl FromStr for Credits {
    type Err = CreditsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (negative, rest) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (int_part, frac_part) = match rest.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (rest, None),
        };
        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CreditsParseError::Malformed);
        }
        let frac_hundredths = match frac_part {
            None => 0,
            Some(f) => {
                if f.is_empty() || !f.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(CreditsParseError::Malformed);
                }
                if f.len() > 2 {
                    return Err(CreditsParseError::TooPrecise);
                }
                let digits: i64 = f.parse().map_err(|_| CreditsParseError::Malformed)?;
                if f.len() == 1 {
                    digits * 10
                } else {
                    digits
                }
            }
        };
        let whole: i64 = int_part.parse().map_err(|_| CreditsParseError::OutOfRange)?;
        let hundredths = whole
            .checked_mul(100)
            .and_then(|w| w.checked_add(frac_hundredths))
            .ok_or(CreditsParseError::OutOfRange)?;
        Ok(Self(if negative { -hundredths } else { hundredths }))
    }
}

impl TryFrom<String> for Credits {
    type Error = CreditsParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Credits> for String {
    fn from(credits: Credits) -> Self {
        credits.to_string()
    }
}

/// Errors that can occur when parsing a credit amount.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CreditsParseError {
    /// The input is not a decimal number.
    #[error("malformed credit amount")]
    Malformed,

    /// The input carries more than two fraction digits.
    #[error("credit amounts carry at most two fraction digits")]
    TooPrecise,

    /// The input does not fit the internal representation.
    #[error("credit amount out of range")]
    OutOfRange,
}

//! Fixed-point money representation.
//!
//! Monetary amounts are stored in the smallest currency unit (cents) as
//! unsigned integers. Floating-point arithmetic is never used for money.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_object::ValueObject;

/// Monetary amount in cents (two fractional digits).
///
/// Serialized on the wire as the integer cent amount.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    pub fn cents(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_mul(self, factor: u64) -> Option<Money> {
        self.0.checked_mul(factor).map(Money)
    }
}

impl ValueObject for Money {}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for Money {
    type Err = DomainError;

    /// Parse a decimal amount such as `"12.34"`, `"12.3"` or `"12"`.
    ///
    /// At most two fractional digits are accepted; negative amounts are not.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DomainError::validation("amount must not be empty"));
        }
        if s.starts_with('-') {
            return Err(DomainError::validation("amount must not be negative"));
        }

        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };

        if frac.len() > 2 {
            return Err(DomainError::validation(
                "amount must have at most two fractional digits",
            ));
        }

        let whole: u64 = whole
            .parse()
            .map_err(|_| DomainError::validation(format!("invalid amount: {s}")))?;

        let frac_cents: u64 = if frac.is_empty() {
            0
        } else {
            let parsed: u64 = frac
                .parse()
                .map_err(|_| DomainError::validation(format!("invalid amount: {s}")))?;
            if frac.len() == 1 { parsed * 10 } else { parsed }
        };

        whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac_cents))
            .map(Money)
            .ok_or_else(|| DomainError::validation("amount out of range"))
    }
}

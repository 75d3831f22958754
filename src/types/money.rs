//! Money type
//!
//! All prices are held as integer euro cents. Serialized as a plain integer
//! (cents) so the frontend never parses floats.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Monetary value in euro cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    #[inline]
    pub const fn from_euros(euros: i64) -> Self {
        Money(euros * 100)
    }

    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Share of this amount in basis points (500 = 5%), rounded half away from zero.
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    pub fn checked_mul(self, rhs: i64) -> Option<Money> {
        self.0.checked_mul(rhs).map(Money)
    }

    pub fn percentage(&self, bps: u32) -> Money {
        Money(div_round(self.0 as i128 * bps as i128, 10_000) as i64)
    }

    /// Divide into `parts`, rounded to the nearest cent.
    /// Returns `None` when `parts` is not positive.
    pub fn divide_rounded(&self, parts: i64) -> Option<Money> {
        if parts <= 0 {
            return None;
        }
        Some(Money(div_round(self.0 as i128, parts as i128) as i64))
    }

    /// Split into `parts` shares that sum exactly to `self`.
    ///
    /// Remainder cents go to the first shares, so `€1.00 / 3` becomes
    /// `[0.34, 0.33, 0.33]`.
    pub fn split_evenly(&self, parts: usize) -> Vec<Money> {
        if parts == 0 {
            return vec![];
        }
        let n = parts as i64;
        let base = self.0 / n;
        let remainder = self.0 % n;
        let step = remainder.signum();
        (0..n)
            .map(|i| if i < remainder.abs() { Money(base + step) } else { Money(base) })
            .collect()
    }
}

/// Integer division rounding half away from zero. `den` must be positive.
fn div_round(num: i128, den: i128) -> i128 {
    let quotient = num / den;
    let remainder = num % den;
    if remainder.abs() * 2 >= den {
        quotient + num.signum()
    } else {
        quotient
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let euros = (abs / 100).to_string();

        let mut grouped = String::with_capacity(euros.len() + euros.len() / 3);
        for (i, ch) in euros.chars().enumerate() {
            if i > 0 && (euros.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }

        write!(f, "{}€{}.{:02}", sign, grouped, abs % 100)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

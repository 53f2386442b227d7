use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::{op, CommissionRate, BASIS_POINTS_PER_PERCENT};

pub const MICROS_PER_UNIT: i64 = 1_000_000;
pub const MICROS_PER_CENT: i64 = 10_000;
const FRACTION_DIGITS: usize = 6;

//--------------------------------------       Money         ---------------------------------------------------------
/// A fixed-point monetary amount, stored as an integer number of micro-units (one millionth of a currency unit).
///
/// Line totals arrive with up to six decimal places. Amounts derived by the settlement pipeline (commissions) are
/// always rounded to whole cents with [`Money::round_to_cents`].
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, AddAssign, add_assign);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self(self.0.saturating_mul(rhs))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Value cannot be represented as a monetary amount: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(micros: i64) -> Self {
        Self(micros)
    }
}

impl Money {
    pub const ZERO: Money = Money(0);

    /// The raw value in micro-units
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_units(units: i64) -> Self {
        Self(units.saturating_mul(MICROS_PER_UNIT))
    }

    pub fn from_cents(cents: i64) -> Self {
        Self(cents.saturating_mul(MICROS_PER_CENT))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Rounds to the nearest whole cent. Halves round away from zero, so 12.345 becomes 12.35 and -12.345 becomes
    /// -12.35.
    pub fn round_to_cents(self) -> Self {
        let cents = round_half_away_from_zero(i128::from(self.0), i128::from(MICROS_PER_CENT));
        Self::saturate(cents * i128::from(MICROS_PER_CENT))
    }

    /// Computes `round2(self * rate / 100)`. The multiplication happens in 128-bit integers and the result is only
    /// rounded once, at the cent boundary.
    pub fn apply_rate(self, rate: CommissionRate) -> Self {
        let numerator = i128::from(self.0) * i128::from(rate.basis_points());
        let denominator = i128::from(100 * BASIS_POINTS_PER_PERCENT) * i128::from(MICROS_PER_CENT);
        let cents = round_half_away_from_zero(numerator, denominator);
        Self::saturate(cents * i128::from(MICROS_PER_CENT))
    }

    fn saturate(value: i128) -> Self {
        let clamped = value.clamp(i128::from(i64::MIN), i128::from(i64::MAX));
        #[allow(clippy::cast_possible_truncation)]
        Self(clamped as i64)
    }
}

fn round_half_away_from_zero(numerator: i128, denominator: i128) -> i128 {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if remainder.abs() * 2 >= denominator {
        quotient + numerator.signum()
    } else {
        quotient
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let units = abs / MICROS_PER_UNIT.unsigned_abs();
        let fraction = format!("{:06}", abs % MICROS_PER_UNIT.unsigned_abs());
        let mut fraction = fraction.as_str();
        while fraction.len() > 2 && fraction.ends_with('0') {
            fraction = &fraction[..fraction.len() - 1];
        }
        write!(f, "{sign}{units}.{fraction}")
    }
}

impl FromStr for Money {
    type Err = MoneyConversionError;

    /// Parses decimal strings such as `12`, `12.5` or `-0.003456`. At most six decimal places are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (whole, fraction) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };
        let all_digits = |v: &str| v.chars().all(|c| c.is_ascii_digit());
        if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
            return Err(MoneyConversionError(format!("'{s}' is not a decimal number")));
        }
        if fraction.len() > FRACTION_DIGITS {
            return Err(MoneyConversionError(format!("'{s}' has more than {FRACTION_DIGITS} decimal places")));
        }
        let whole = if whole.is_empty() { 0 } else { whole.parse::<i64>().map_err(|e| MoneyConversionError(e.to_string()))? };
        let fraction = format!("{fraction:0<width$}", width = FRACTION_DIGITS);
        let fraction = fraction.parse::<i64>().map_err(|e| MoneyConversionError(e.to_string()))?;
        let micros = whole
            .checked_mul(MICROS_PER_UNIT)
            .and_then(|w| w.checked_add(fraction))
            .ok_or_else(|| MoneyConversionError(format!("'{s}' is too large")))?;
        Ok(Self(if negative { -micros } else { micros }))
    }
}

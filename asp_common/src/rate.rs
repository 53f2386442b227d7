use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

pub const BASIS_POINTS_PER_PERCENT: i64 = 100;

/// A commission rate expressed in basis points (hundredths of a percent). `1250` is 12.5%.
///
/// Rates are never negative. Construction from raw integers goes through [`CommissionRate::from_basis_points`], and
/// deserialization applies the same check.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(try_from = "i64", into = "i64")]
pub struct CommissionRate(i64);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid commission rate: {0}")]
pub struct RateConversionError(String);

impl CommissionRate {
    pub const ZERO: CommissionRate = CommissionRate(0);

    pub fn from_basis_points(bps: i64) -> Result<Self, RateConversionError> {
        if bps < 0 {
            return Err(RateConversionError(format!("{bps} basis points is negative")));
        }
        Ok(Self(bps))
    }

    pub fn from_percent(percent: i64) -> Result<Self, RateConversionError> {
        let bps = percent
            .checked_mul(BASIS_POINTS_PER_PERCENT)
            .ok_or_else(|| RateConversionError(format!("{percent}% is out of range")))?;
        Self::from_basis_points(bps)
    }

    pub fn basis_points(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<i64> for CommissionRate {
    type Error = RateConversionError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::from_basis_points(value)
    }
}

impl From<CommissionRate> for i64 {
    fn from(rate: CommissionRate) -> Self {
        rate.0
    }
}

impl Display for CommissionRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let whole = self.0 / BASIS_POINTS_PER_PERCENT;
        let frac = self.0 % BASIS_POINTS_PER_PERCENT;
        match frac {
            0 => write!(f, "{whole}%"),
            f2 if f2 % 10 == 0 => write!(f, "{whole}.{}%", f2 / 10),
            f2 => write!(f, "{whole}.{f2:02}%"),
        }
    }
}

impl FromStr for CommissionRate {
    type Err = RateConversionError;

    /// Accepts `12`, `12.5`, `12.25%`. Precision beyond a basis point is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
        let invalid = || RateConversionError(format!("'{s}' is not a percentage"));
        let (whole, frac) = trimmed.split_once('.').unwrap_or((trimmed, ""));
        if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        if frac.len() > 2 {
            return Err(RateConversionError(format!("'{s}' is more precise than a basis point")));
        }
        let whole = whole.parse::<i64>().map_err(|_| invalid())?;
        let frac = format!("{frac:0<2}").parse::<i64>().map_err(|_| invalid())?;
        let bps = whole
            .checked_mul(BASIS_POINTS_PER_PERCENT)
            .and_then(|w| w.checked_add(frac))
            .ok_or_else(invalid)?;
        Self::from_basis_points(bps)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn negative_rates_are_rejected() {
        assert!(CommissionRate::from_basis_points(-1).is_err());
        assert!(CommissionRate::from_percent(-5).is_err());
        assert!(serde_json::from_str::<CommissionRate>("-10").is_err());
        assert_eq!(serde_json::from_str::<CommissionRate>("1250").unwrap().basis_points(), 1250);
    }

    #[test]
    fn display() {
        assert_eq!(CommissionRate::from_percent(10).unwrap().to_string(), "10%");
        assert_eq!(CommissionRate::from_basis_points(1250).unwrap().to_string(), "12.5%");
        assert_eq!(CommissionRate::from_basis_points(1205).unwrap().to_string(), "12.05%");
        assert_eq!(CommissionRate::ZERO.to_string(), "0%");
    }

    #[test]
    fn parse() {
        assert_eq!("12.5".parse::<CommissionRate>().unwrap().basis_points(), 1250);
        assert_eq!("12.25%".parse::<CommissionRate>().unwrap().basis_points(), 1225);
        assert_eq!("7".parse::<CommissionRate>().unwrap().basis_points(), 700);
        assert!("-7".parse::<CommissionRate>().is_err());
        assert!("7.125".parse::<CommissionRate>().is_err());
        assert!("seven".parse::<CommissionRate>().is_err());
    }
}

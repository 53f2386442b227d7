mod money;
mod rate;

pub mod helpers;
pub mod op;
mod secret;

pub use money::{Money, MoneyConversionError, MICROS_PER_CENT, MICROS_PER_UNIT};
pub use rate::{CommissionRate, RateConversionError, BASIS_POINTS_PER_PERCENT};
pub use secret::Secret;

//! Commission rate resolution.
//!
//! Precedence, highest first:
//! 1. a non-zero override on the order line,
//! 2. a non-zero rate on the product,
//! 3. a non-zero default rate on the product's merchant,
//! 4. zero.
//!
//! Resolution never fails. Missing catalog data falls through to the next level.
use asp_common::{CommissionRate, Money};
use serde::{Deserialize, Serialize};

use crate::db_types::{CatalogContext, OrderLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateSource {
    LineOverride,
    Product,
    MerchantDefault,
    None,
}

pub fn resolve_rate(line: &OrderLine, context: &CatalogContext) -> CommissionRate {
    resolve_rate_with_source(line.commission_override, context).0
}

pub fn resolve_rate_with_source(
    line_override: Option<CommissionRate>,
    context: &CatalogContext,
) -> (CommissionRate, RateSource) {
    let candidates = [
        (line_override, RateSource::LineOverride),
        (context.product_rate, RateSource::Product),
        (context.merchant_default_rate, RateSource::MerchantDefault),
    ];
    candidates
        .into_iter()
        .find_map(|(rate, source)| rate.filter(|r| !r.is_zero()).map(|r| (r, source)))
        .unwrap_or((CommissionRate::ZERO, RateSource::None))
}

/// `round2(line_total * rate / 100)`
pub fn commission_amount(line_total: Money, rate: CommissionRate) -> Money {
    line_total.apply_rate(rate)
}

#[cfg(test)]
mod test {
    use super::*;

    fn pct(p: i64) -> Option<CommissionRate> {
        Some(CommissionRate::from_percent(p).unwrap())
    }

    #[test]
    fn line_override_wins() {
        let ctx = CatalogContext::new(pct(5), pct(3));
        assert_eq!(resolve_rate_with_source(pct(10), &ctx), (pct(10).unwrap(), RateSource::LineOverride));
    }

    #[test]
    fn zero_values_fall_through() {
        let ctx = CatalogContext::new(pct(0), pct(3));
        assert_eq!(resolve_rate_with_source(pct(0), &ctx), (pct(3).unwrap(), RateSource::MerchantDefault));
        let ctx = CatalogContext::new(pct(7), None);
        assert_eq!(resolve_rate_with_source(None, &ctx), (pct(7).unwrap(), RateSource::Product));
    }

    #[test]
    fn missing_context_resolves_to_zero() {
        let ctx = CatalogContext::default();
        assert_eq!(resolve_rate_with_source(None, &ctx), (CommissionRate::ZERO, RateSource::None));
        let ctx = CatalogContext::new(pct(0), pct(0));
        assert_eq!(resolve_rate_with_source(pct(0), &ctx), (CommissionRate::ZERO, RateSource::None));
    }

    #[test]
    fn every_combination_picks_the_highest_precedence_non_zero_rate() {
        let options = [None, pct(0), pct(4)];
        for line in options {
            for product in options {
                for merchant in options {
                    let ctx = CatalogContext::new(product, merchant);
                    let expected = [line, product, merchant]
                        .into_iter()
                        .flatten()
                        .find(|r| !r.is_zero())
                        .unwrap_or(CommissionRate::ZERO);
                    assert_eq!(resolve_rate_with_source(line, &ctx).0, expected);
                }
            }
        }
    }

    #[test]
    fn amounts_round_to_cents() {
        let total: Money = "12.3456".parse().unwrap();
        assert_eq!(commission_amount(total, pct(100).unwrap()), "12.35".parse().unwrap());
        assert_eq!(commission_amount(total, CommissionRate::ZERO), Money::ZERO);
    }
}

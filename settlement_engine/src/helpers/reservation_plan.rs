//! Reservation planning: consolidating an order's lines per stock unit and diffing against what the order already
//! holds. Only the resulting deltas are ever applied to stock counters.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    db_types::{OrderLine, Reservation, StockUnitId},
    traits::ValidationError,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationChange {
    pub stock_unit_id: StockUnitId,
    /// The quantity the order held against the unit before this run
    pub previous: i64,
    /// The consolidated quantity the order should hold after this run
    pub target: i64,
}

impl ReservationChange {
    pub fn delta(&self) -> i64 {
        self.target - self.previous
    }
}

/// Sums the quantities of all inventory-tracked lines per stock unit.
///
/// Every tracked line must name a stock unit and have a positive quantity; the first offending line fails the whole
/// order. Untracked lines are ignored.
pub fn consolidate_lines(lines: &[OrderLine]) -> Result<BTreeMap<StockUnitId, i64>, ValidationError> {
    let mut targets = BTreeMap::new();
    for line in lines.iter().filter(|l| l.track_inventory) {
        let unit = line.stock_unit_id.as_ref().ok_or_else(|| ValidationError::MissingStockUnit(line.line_id.clone()))?;
        if line.quantity <= 0 {
            return Err(ValidationError::NonPositiveQuantity { line_id: line.line_id.clone(), quantity: line.quantity });
        }
        let total: &mut i64 = targets.entry(unit.clone()).or_default();
        *total = total.checked_add(line.quantity).ok_or_else(|| ValidationError::QuantityOverflow(unit.clone()))?;
    }
    Ok(targets)
}

/// Diffs consolidated targets against the order's existing reservations.
///
/// Units the order holds but no line references any more get a target of zero. Units whose target equals the held
/// quantity are left out, so an unchanged order produces an empty plan.
pub fn plan_reservation_changes(
    targets: &BTreeMap<StockUnitId, i64>,
    existing: &[Reservation],
) -> Vec<ReservationChange> {
    let mut held = existing
        .iter()
        .map(|r| (r.stock_unit_id.clone(), r.held_quantity()))
        .collect::<BTreeMap<StockUnitId, i64>>();
    let mut changes = targets
        .iter()
        .map(|(unit, target)| ReservationChange {
            stock_unit_id: unit.clone(),
            previous: held.remove(unit).unwrap_or_default(),
            target: *target,
        })
        .collect::<Vec<_>>();
    changes.extend(held.into_iter().map(|(stock_unit_id, previous)| ReservationChange { stock_unit_id, previous, target: 0 }));
    changes.retain(|c| c.delta() != 0);
    changes.sort_by(|a, b| a.stock_unit_id.cmp(&b.stock_unit_id));
    changes
}

//! The inventory reservation manager.
//!
//! An order holds one reservation per stock unit, carrying the consolidated quantity of all its lines for that unit.
//! Stock counters are only ever moved by the difference between the new target and what the order already holds, so
//! rerunning with unchanged lines moves nothing.
//!
//! Increments go through a compare-and-set on `available`, so two writers can never both take the last items of a
//! unit. All changes for an order are expected to run inside one transaction: if any unit is short, the caller rolls
//! back and none of the order's counters move.
use log::{debug, trace};
use sqlx::SqliteConnection;

use super::{catalog, optional_row};
use crate::{
    db_types::{OrderId, OrderLine, Reservation, ReservationStatus, StockUnit, StockUnitId, VariantId},
    helpers::{consolidate_lines, plan_reservation_changes, ReservationChange},
    settlement_objects::ReservationOutcome,
    traits::SettlementError,
};

pub async fn reserve_for_order(
    order_id: &OrderId,
    lines: &[OrderLine],
    conn: &mut SqliteConnection,
) -> Result<ReservationOutcome, SettlementError> {
    let targets = consolidate_lines(lines)?;
    let existing = fetch_reservations_for_order(order_id, &mut *conn).await?;
    let changes = plan_reservation_changes(&targets, &existing);
    if changes.is_empty() {
        trace!("🗃️ Reservations for order [{order_id}] are up to date");
        return Ok(ReservationOutcome::default());
    }
    for change in &changes {
        apply_change(order_id, change, &mut *conn).await?;
    }
    debug!("🗃️ Applied {} reservation changes for order [{order_id}]", changes.len());
    Ok(ReservationOutcome { changes })
}

/// Releases everything the order holds, e.g. on refund
pub async fn release_all_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<ReservationChange>, SettlementError> {
    let existing = fetch_reservations_for_order(order_id, &mut *conn).await?;
    let changes = existing
        .iter()
        .filter(|r| r.held_quantity() > 0)
        .map(|r| ReservationChange { stock_unit_id: r.stock_unit_id.clone(), previous: r.held_quantity(), target: 0 })
        .collect::<Vec<_>>();
    for change in &changes {
        apply_change(order_id, change, &mut *conn).await?;
    }
    Ok(changes)
}

async fn apply_change(
    order_id: &OrderId,
    change: &ReservationChange,
    conn: &mut SqliteConnection,
) -> Result<(), SettlementError> {
    let delta = change.delta();
    let unit = if delta > 0 {
        take_stock(&change.stock_unit_id, delta, &mut *conn).await?
    } else {
        return_stock(&change.stock_unit_id, -delta, &mut *conn).await?
    };
    if let Some(variant_id) = &unit.variant_id {
        adjust_variant(variant_id, delta, &mut *conn).await?;
    }
    let status = if change.target > 0 { ReservationStatus::Active } else { ReservationStatus::Released };
    upsert_reservation(order_id, &change.stock_unit_id, change.target, status, &mut *conn).await?;
    trace!(
        "🗃️ Order [{order_id}] now holds {} of {} (delta {delta}). Unit has {} available, {} reserved",
        change.target,
        change.stock_unit_id,
        unit.available,
        unit.reserved
    );
    Ok(())
}

/// Moves `quantity` items from available to reserved, but only if at least that many are available
async fn take_stock(
    stock_unit_id: &StockUnitId,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<StockUnit, SettlementError> {
    let query = sqlx::query_as(
        r#"
            UPDATE stock_units SET
                reserved = reserved + $2,
                available = MAX(0, available - $2),
                updated_at = CURRENT_TIMESTAMP
            WHERE stock_unit_id = $1 AND available >= $2
            RETURNING *;
        "#,
    )
    .bind(stock_unit_id.as_str())
    .bind(quantity);
    let unit: Option<StockUnit> = optional_row(query, &mut *conn).await?;
    match unit {
        Some(unit) => Ok(unit),
        None => match catalog::fetch_stock_unit(stock_unit_id, conn).await? {
            Some(current) => Err(SettlementError::InsufficientStock {
                stock_unit_id: stock_unit_id.clone(),
                requested: quantity,
                available: current.available,
            }),
            None => Err(SettlementError::StockUnitNotFound(stock_unit_id.clone())),
        },
    }
}

async fn return_stock(
    stock_unit_id: &StockUnitId,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<StockUnit, SettlementError> {
    let query = sqlx::query_as(
        r#"
            UPDATE stock_units SET
                reserved = MAX(0, reserved - $2),
                available = available + $2,
                updated_at = CURRENT_TIMESTAMP
            WHERE stock_unit_id = $1
            RETURNING *;
        "#,
    )
    .bind(stock_unit_id.as_str())
    .bind(quantity);
    let unit: Option<StockUnit> = optional_row(query, conn).await?;
    unit.ok_or_else(|| SettlementError::StockUnitNotFound(stock_unit_id.clone()))
}

/// Mirrors a stock unit delta onto its variant. The variant is a read model, so it is clamped rather than checked.
async fn adjust_variant(variant_id: &VariantId, delta: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            UPDATE variants SET
                reserved = MAX(0, reserved + $2),
                available = MAX(0, available - $2),
                updated_at = CURRENT_TIMESTAMP
            WHERE variant_id = $1;
        "#,
    )
    .bind(variant_id.as_str())
    .bind(delta)
    .execute(conn)
    .await?;
    Ok(())
}

async fn upsert_reservation(
    order_id: &OrderId,
    stock_unit_id: &StockUnitId,
    quantity: i64,
    status: ReservationStatus,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO reservations (order_id, stock_unit_id, quantity, status) VALUES ($1, $2, $3, $4)
            ON CONFLICT (order_id, stock_unit_id) DO UPDATE SET
                quantity = excluded.quantity,
                status = excluded.status,
                updated_at = CURRENT_TIMESTAMP
            WHERE reservations.quantity <> excluded.quantity OR reservations.status <> excluded.status;
        "#,
    )
    .bind(order_id.as_str())
    .bind(stock_unit_id.as_str())
    .bind(quantity)
    .bind(status)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_reservations_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<Reservation>, sqlx::Error> {
    let reservations = sqlx::query_as("SELECT * FROM reservations WHERE order_id = $1 ORDER BY stock_unit_id")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(reservations)
}

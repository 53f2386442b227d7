//! The commission ledger writer.
//!
//! One row per order line, keyed by the line id. Reruns update the rate and amount in place when they changed and
//! never touch the status, so a commission that has already been confirmed or paid keeps its place in the lifecycle.
use asp_common::Money;
use log::{debug, trace, warn};
use sqlx::SqliteConnection;

use super::{catalog, one_row, one_scalar, optional_row, orders};
use crate::{
    db_types::{CommissionEntry, CommissionStatus, NewCommissionEntry, Order, OrderId, OrderLine, OrderLineId, ProfileId},
    helpers::{commission_amount, resolve_rate_with_source},
    settlement_objects::CommissionOutcome,
    traits::SettlementError,
};

/// Resolves the rate of every line, upserts the ledger rows and recomputes the order's aggregate commission total.
///
/// Orders without an affiliate are skipped entirely.
pub async fn write_commissions(
    order: &Order,
    lines: &[OrderLine],
    conn: &mut SqliteConnection,
) -> Result<CommissionOutcome, SettlementError> {
    let affiliate = match &order.affiliate_id {
        Some(a) => a,
        None => {
            debug!("🗃️ Order [{}] has no affiliate. No commissions to write.", order.order_id);
            return Ok(CommissionOutcome { skipped: true, ..Default::default() });
        },
    };
    let mut rows_written = 0;
    for line in lines {
        let context = catalog::fetch_catalog_context(&line.product_id, &mut *conn).await?;
        let (rate, source) = resolve_rate_with_source(line.commission_override, &context);
        let amount = commission_amount(line.line_total, rate);
        trace!("🗃️ Line {} of {}: rate {rate} ({source:?}) gives {amount}", line.line_id, line.line_total);
        let entry = NewCommissionEntry {
            order_line_id: line.line_id.clone(),
            order_id: order.order_id.clone(),
            affiliate_id: affiliate.clone(),
            rate,
            amount,
        };
        rows_written += upsert_commission(&entry, &mut *conn).await?;
    }
    let total = refresh_commission_total(&order.order_id, &mut *conn).await?;
    let entries = fetch_commissions_for_order(&order.order_id, &mut *conn).await?;
    debug!(
        "🗃️ Commission ledger for order [{}]: {} entries, {rows_written} written, total {total}",
        order.order_id,
        entries.len()
    );
    Ok(CommissionOutcome { entries, rows_written, total, skipped: false })
}

/// Inserts the ledger row for a line, or updates its rate, amount and beneficiary if any of them changed. Returns the
/// number of rows written, which is zero when nothing changed.
pub async fn upsert_commission(entry: &NewCommissionEntry, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
            INSERT INTO commission_entries (order_line_id, order_id, affiliate_id, rate, amount)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_line_id) DO UPDATE SET
                affiliate_id = excluded.affiliate_id,
                rate = excluded.rate,
                amount = excluded.amount,
                updated_at = CURRENT_TIMESTAMP
            WHERE commission_entries.rate <> excluded.rate
               OR commission_entries.amount <> excluded.amount
               OR commission_entries.affiliate_id <> excluded.affiliate_id;
        "#,
    )
    .bind(entry.order_line_id.as_str())
    .bind(entry.order_id.as_str())
    .bind(entry.affiliate_id.as_str())
    .bind(entry.rate.basis_points())
    .bind(entry.amount.value())
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Sets the order's aggregate to the sum of its ledger amounts and returns it
pub async fn refresh_commission_total(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Money, sqlx::Error> {
    let query = sqlx::query_scalar("SELECT COALESCE(SUM(amount), 0) FROM commission_entries WHERE order_id = $1")
        .bind(order_id.as_str());
    let total: i64 = one_scalar(query, &mut *conn).await?;
    let total = Money::from(total);
    if orders::update_commission_total(order_id, total, &mut *conn).await? {
        trace!("🗃️ Commission total for order [{order_id}] is now {total}");
    }
    Ok(total)
}

pub async fn fetch_commissions_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<CommissionEntry>, sqlx::Error> {
    let entries = sqlx::query_as("SELECT * FROM commission_entries WHERE order_id = $1 ORDER BY id")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(entries)
}

pub async fn fetch_commissions_for_affiliate(
    affiliate_id: &ProfileId,
    conn: &mut SqliteConnection,
) -> Result<Vec<CommissionEntry>, sqlx::Error> {
    let entries = sqlx::query_as("SELECT * FROM commission_entries WHERE affiliate_id = $1 ORDER BY id")
        .bind(affiliate_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(entries)
}

pub async fn fetch_commission(
    order_line_id: &OrderLineId,
    conn: &mut SqliteConnection,
) -> Result<Option<CommissionEntry>, sqlx::Error> {
    let query = sqlx::query_as("SELECT * FROM commission_entries WHERE order_line_id = $1").bind(order_line_id.as_str());
    optional_row(query, conn).await
}

/// Moves a commission to `status`, enforcing the forward-only lifecycle. Setting the current status again is a no-op.
///
/// This reads before it writes. Inside a transaction, claim the owning order first.
pub async fn update_commission_status(
    order_line_id: &OrderLineId,
    status: CommissionStatus,
    conn: &mut SqliteConnection,
) -> Result<CommissionEntry, SettlementError> {
    let current = fetch_commission(order_line_id, &mut *conn)
        .await?
        .ok_or_else(|| SettlementError::CommissionNotFound(order_line_id.clone()))?;
    if current.status == status {
        trace!("🗃️ Commission for line {order_line_id} is already {status}");
        return Ok(current);
    }
    if !current.status.can_transition_to(status) {
        return Err(SettlementError::InvalidCommissionTransition { from: current.status, to: status });
    }
    let query = sqlx::query_as(
        r#"
            UPDATE commission_entries SET
                status = $2,
                confirmed_at = CASE WHEN $2 = 'Confirmed' THEN CURRENT_TIMESTAMP ELSE confirmed_at END,
                paid_at = CASE WHEN $2 = 'Paid' THEN CURRENT_TIMESTAMP ELSE paid_at END,
                updated_at = CURRENT_TIMESTAMP
            WHERE order_line_id = $1
            RETURNING *;
        "#,
    )
    .bind(order_line_id.as_str())
    .bind(status);
    let entry = one_row(query, conn).await?;
    debug!("🗃️ Commission for line {order_line_id} moved from {} to {status}", current.status);
    Ok(entry)
}

/// Cancels every commission of the order that has not been paid out yet. Paid commissions are left alone and logged.
pub async fn cancel_open_commissions(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE commission_entries SET status = 'Cancelled', updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $1 AND status IN ('Pending', 'Confirmed');
        "#,
    )
    .bind(order_id.as_str())
    .execute(&mut *conn)
    .await?;
    let query = sqlx::query_scalar("SELECT COUNT(*) FROM commission_entries WHERE order_id = $1 AND status = 'Paid'")
        .bind(order_id.as_str());
    let paid: i64 = one_scalar(query, conn).await?;
    if paid > 0 {
        warn!("🗃️ Order [{order_id}] has {paid} commissions that were already paid out. They need manual clawback.");
    }
    Ok(result.rows_affected())
}

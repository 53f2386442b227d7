use asp_common::{CommissionRate, Money};
use log::{debug, trace};
use sqlx::SqliteConnection;

use super::{one_row, optional_row};
use crate::{
    db_types::{NewOrder, NewOrderLine, Order, OrderId, OrderLine, OrderLineId, PaymentStatus, ProfileId, SessionId, StockUnitId},
    traits::{SettlementError, ValidationError},
};

/// Inserts the order and its lines, returning `false` in the second parameter if the order already exists. In that
/// case the stored order is returned untouched, and the incoming payload is not validated.
///
/// The insert is the first statement, so a deferred transaction takes the write lock before reading anything and
/// concurrent deliveries of the same order queue up behind it. This is not atomic on its own. Run it inside a
/// transaction so that an order is never stored without its lines.
pub async fn idempotent_insert(order: NewOrder, conn: &mut SqliteConnection) -> Result<(Order, bool), SettlementError> {
    let validation = order.validate();
    let NewOrder { order_id, shop_id, affiliate_id, customer_profile_id, buyer_session_id, lines, created_at } = order;
    let query = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                shop_id,
                affiliate_id,
                customer_profile_id,
                buyer_session_id,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (order_id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .bind(shop_id)
    .bind(affiliate_id)
    .bind(customer_profile_id)
    .bind(buyer_session_id)
    .bind(created_at);
    let inserted: Option<Order> = optional_row(query, &mut *conn).await?;
    let Some(inserted) = inserted else {
        let existing = fetch_order(&order_id, &mut *conn).await?.ok_or(sqlx::Error::RowNotFound)?;
        trace!("🗃️ Order [{}] already exists with id {}", existing.order_id, existing.id);
        return Ok((existing, false));
    };
    validation?;
    for line in lines {
        insert_line(&inserted.order_id, line, &mut *conn).await?;
    }
    debug!("🗃️ Order [{}] inserted with id {}", inserted.order_id, inserted.id);
    Ok((inserted, true))
}

async fn insert_line(order_id: &OrderId, line: NewOrderLine, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO order_lines (
                line_id,
                order_id,
                product_id,
                stock_unit_id,
                quantity,
                line_total,
                commission_override,
                track_inventory
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8);
        "#,
    )
    .bind(line.line_id)
    .bind(order_id.as_str())
    .bind(line.product_id)
    .bind(line.stock_unit_id)
    .bind(line.quantity)
    .bind(line.line_total.value())
    .bind(line.commission_override)
    .bind(line.track_inventory)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let query = sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str());
    optional_row(query, conn).await
}

/// Takes the database write lock and returns the order row.
///
/// This must be the first statement of a settlement transaction. The update writes nothing new, but it makes a second
/// transaction for the same order wait until the first one commits, so both never read the same reservation and
/// ledger state.
pub async fn claim_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let query = sqlx::query_as("UPDATE orders SET payment_status = payment_status WHERE order_id = $1 RETURNING *")
        .bind(order_id.as_str());
    optional_row(query, conn).await
}

/// Same as [`claim_order`], for the order that owns the given line. Returns `None` if the line does not exist.
pub async fn claim_order_of_line(line_id: &OrderLineId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let query = sqlx::query_as(
        r#"
            UPDATE orders SET payment_status = payment_status
            WHERE order_id = (SELECT order_id FROM order_lines WHERE line_id = $1)
            RETURNING *;
        "#,
    )
    .bind(line_id.as_str());
    optional_row(query, conn).await
}

pub async fn fetch_order_lines(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Vec<OrderLine>, sqlx::Error> {
    let lines = sqlx::query_as("SELECT * FROM order_lines WHERE order_id = $1 ORDER BY id")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(lines)
}

/// Writes the attribution and payment status determined when a payment signal is applied to the order
pub async fn update_payment(
    order_id: &OrderId,
    affiliate_id: Option<&ProfileId>,
    customer_profile_id: Option<&ProfileId>,
    buyer_session_id: Option<&SessionId>,
    status: PaymentStatus,
    conn: &mut SqliteConnection,
) -> Result<Order, sqlx::Error> {
    let query = sqlx::query_as(
        r#"
            UPDATE orders SET
                affiliate_id = $2,
                customer_profile_id = $3,
                buyer_session_id = $4,
                payment_status = $5,
                updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $1
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .bind(affiliate_id)
    .bind(customer_profile_id)
    .bind(buyer_session_id)
    .bind(status);
    one_row(query, conn).await
}

pub async fn update_payment_status(
    order_id: &OrderId,
    status: PaymentStatus,
    conn: &mut SqliteConnection,
) -> Result<Order, sqlx::Error> {
    let query = sqlx::query_as(
        "UPDATE orders SET payment_status = $2, updated_at = CURRENT_TIMESTAMP WHERE order_id = $1 RETURNING *",
    )
    .bind(order_id.as_str())
    .bind(status);
    one_row(query, conn).await
}

/// Stamps `settled_at` if the order has not been settled before. Returns `None` if it already had been.
pub async fn mark_settled(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let query = sqlx::query_as(
        r#"
            UPDATE orders SET settled_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $1 AND settled_at IS NULL
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str());
    optional_row(query, conn).await
}

pub async fn fetch_commission_total(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Money>, sqlx::Error> {
    let query = sqlx::query_as("SELECT commission_total FROM orders WHERE order_id = $1").bind(order_id.as_str());
    let total: Option<(i64,)> = optional_row(query, conn).await?;
    Ok(total.map(|(cents,)| Money::from(cents)))
}

/// Replaces the aggregate commission total, but only if it differs. Returns `true` if the row changed.
pub async fn update_commission_total(
    order_id: &OrderId,
    total: Money,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE orders SET commission_total = $2, updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $1 AND commission_total <> $2;
        "#,
    )
    .bind(order_id.as_str())
    .bind(total.value())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_line_stock_unit(
    line_id: &OrderLineId,
    stock_unit_id: Option<&StockUnitId>,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderLine>, sqlx::Error> {
    let query = sqlx::query_as(
        "UPDATE order_lines SET stock_unit_id = $2, updated_at = CURRENT_TIMESTAMP WHERE line_id = $1 RETURNING *",
    )
    .bind(line_id.as_str())
    .bind(stock_unit_id);
    optional_row(query, conn).await
}

pub async fn set_line_quantity(
    line_id: &OrderLineId,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderLine>, sqlx::Error> {
    let query = sqlx::query_as(
        "UPDATE order_lines SET quantity = $2, updated_at = CURRENT_TIMESTAMP WHERE line_id = $1 RETURNING *",
    )
    .bind(line_id.as_str())
    .bind(quantity);
    optional_row(query, conn).await
}

pub async fn set_line_commission_override(
    line_id: &OrderLineId,
    rate: Option<CommissionRate>,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderLine>, sqlx::Error> {
    let query = sqlx::query_as(
        "UPDATE order_lines SET commission_override = $2, updated_at = CURRENT_TIMESTAMP WHERE line_id = $1 RETURNING *",
    )
    .bind(line_id.as_str())
    .bind(rate);
    optional_row(query, conn).await
}

/// Combines the attribution stored on the order with the attribution carried by a payment signal. Missing values are
/// filled in from the signal; two different values are a conflict.
pub fn merge_attribution<T: PartialEq + Clone>(
    order_id: &OrderId,
    field: &'static str,
    stored: Option<&T>,
    incoming: Option<&T>,
) -> Result<Option<T>, ValidationError> {
    match (stored, incoming) {
        (Some(s), Some(i)) if s != i => Err(ValidationError::AttributionConflict { order_id: order_id.clone(), field }),
        (Some(s), _) => Ok(Some(s.clone())),
        (None, i) => Ok(i.cloned()),
    }
}

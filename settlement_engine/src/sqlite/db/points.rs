//! The point ledger. Rows are only ever inserted; the `UNIQUE` dedup key turns a repeated grant into a no-op.
use log::{debug, trace};
use sqlx::SqliteConnection;

use super::one_scalar;
use crate::{
    db_types::{NewPointEvent, Order, OrderId, OrderLine, PointEvent, ProfileId},
    helpers::{plan_point_grants, PointRules},
    settlement_objects::PointsOutcome,
};

/// Plans the point events the order is entitled to and appends the ones not yet in the ledger
pub async fn grant_points(
    order: &Order,
    lines: &[OrderLine],
    rules: &PointRules,
    conn: &mut SqliteConnection,
) -> Result<PointsOutcome, sqlx::Error> {
    let plan = plan_point_grants(order, lines, rules);
    let mut outcome = PointsOutcome { planned: plan.len(), ..Default::default() };
    for event in plan {
        if insert_point_event(&event, &mut *conn).await? {
            outcome.granted += 1;
            outcome.points_granted += event.points;
        }
    }
    debug!(
        "🗃️ Order [{}]: {} of {} planned point events granted ({} points)",
        order.order_id, outcome.granted, outcome.planned, outcome.points_granted
    );
    Ok(outcome)
}

/// Appends the event. Returns `false` if an event with the same key is already in the ledger.
pub async fn insert_point_event(event: &NewPointEvent, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let key = event.key.to_string();
    let result = sqlx::query(
        r#"
            INSERT INTO point_events (dedup_key, event_type, shop_id, source_id, beneficiary_id, order_id, points)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (dedup_key) DO NOTHING;
        "#,
    )
    .bind(&key)
    .bind(event.key.event_type())
    .bind(event.key.shop_id().as_str())
    .bind(event.key.source_id())
    .bind(event.key.beneficiary().as_str())
    .bind(event.order_id.as_str())
    .bind(event.points)
    .execute(conn)
    .await?;
    let inserted = result.rows_affected() > 0;
    if !inserted {
        trace!("🗃️ Point event {key} already granted");
    }
    Ok(inserted)
}

pub async fn fetch_point_events_for_beneficiary(
    beneficiary: &ProfileId,
    conn: &mut SqliteConnection,
) -> Result<Vec<PointEvent>, sqlx::Error> {
    let events = sqlx::query_as("SELECT * FROM point_events WHERE beneficiary_id = $1 ORDER BY id")
        .bind(beneficiary.as_str())
        .fetch_all(conn)
        .await?;
    Ok(events)
}

pub async fn fetch_point_events_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<PointEvent>, sqlx::Error> {
    let events = sqlx::query_as("SELECT * FROM point_events WHERE order_id = $1 ORDER BY id")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(events)
}

pub async fn count_point_events(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    one_scalar(sqlx::query_scalar("SELECT COUNT(*) FROM point_events"), conn).await
}

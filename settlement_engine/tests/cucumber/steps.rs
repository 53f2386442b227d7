use std::time::Duration;

use asp_common::Money;
use chrono::Utc;
use cucumber::{then, when};
use settlement_engine::{
    db_types::{
        LeaderboardEntry,
        LeaderboardPeriod,
        NewOrder,
        NewOrderLine,
        OrderId,
        OrderLineId,
        PaymentStatus,
        ProfileId,
        StockUnitId,
    },
    CatalogManagement,
    SettlementError,
};

use crate::cucumber::SettlementWorld;

fn money(s: &str) -> Money {
    s.parse().expect("Not a valid amount")
}

#[when(expr = "order {word} is placed in shop {word}")]
async fn start_order(world: &mut SettlementWorld, order_id: String, shop_id: String) {
    world.drafts.insert(order_id.clone(), NewOrder::new(order_id, shop_id));
}

#[when(expr = "order {word} is placed in shop {word} via affiliate {word}")]
async fn start_affiliate_order(world: &mut SettlementWorld, order_id: String, shop_id: String, affiliate: String) {
    world.drafts.insert(order_id.clone(), NewOrder::new(order_id, shop_id).with_affiliate(affiliate));
}

#[when(expr = "order {word} is bought by customer {word}")]
async fn bought_by_customer(world: &mut SettlementWorld, order_id: String, profile_id: String) {
    let draft = world.draft(&order_id);
    *draft = draft.clone().with_customer(profile_id);
}

#[when(expr = "order {word} is bought in session {word}")]
async fn bought_in_session(world: &mut SettlementWorld, order_id: String, session_id: String) {
    let draft = world.draft(&order_id);
    *draft = draft.clone().with_session(session_id);
}

#[when(expr = "order {word} has line {word} for {int} x {word} totalling {word}")]
async fn untracked_line(world: &mut SettlementWorld, order_id: String, line_id: String, qty: i64, product: String, total: String) {
    let line = NewOrderLine::new(line_id, product, qty, money(&total)).untracked();
    let draft = world.draft(&order_id);
    *draft = draft.clone().with_line(line);
}

#[when(expr = "order {word} has line {word} for {int} x {word} from {word} totalling {word}")]
async fn tracked_line(
    world: &mut SettlementWorld,
    order_id: String,
    line_id: String,
    qty: i64,
    product: String,
    unit: String,
    total: String,
) {
    let line = NewOrderLine::new(line_id, product, qty, money(&total)).with_stock_unit(unit);
    let draft = world.draft(&order_id);
    *draft = draft.clone().with_line(line);
}

#[when(expr = "order {word} is submitted")]
async fn submit_order(world: &mut SettlementWorld, order_id: String) {
    let order = world.drafts.remove(&order_id).unwrap_or_else(|| panic!("Order {order_id} has not been started"));
    world.api().submit_order(order).await.expect("Error submitting order");
}

#[when(expr = "order {word} is paid in shop {word}")]
async fn order_paid(world: &mut SettlementWorld, order_id: String, shop_id: String) {
    world.settle(&order_id, &shop_id).await;
}

#[when(expr = "order {word} is refunded")]
async fn order_refunded(world: &mut SettlementWorld, order_id: String) {
    world.api().order_refunded(&OrderId::from(order_id)).await.expect("Error refunding order");
}

#[when(expr = "line {word} is changed to {int} items")]
async fn change_quantity(world: &mut SettlementWorld, line_id: String, quantity: i64) {
    world.api().update_line_quantity(&OrderLineId::from(line_id), quantity).await.expect("Error updating line");
}

#[when(expr = "the reservations for order {word} are rerun")]
async fn rerun_reservations(world: &mut SettlementWorld, order_id: String) {
    world.api().rerun_reservations(&OrderId::from(order_id)).await.expect("Error rerunning reservations");
}

#[when(expr = "stock unit {word} is restocked with {int}")]
async fn restock(world: &mut SettlementWorld, unit: String, quantity: i64) {
    world.db().restock(&StockUnitId::from(unit), quantity).await.expect("Error restocking");
}

#[when(expr = "I pause for {int}ms")]
async fn pause(_world: &mut SettlementWorld, ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[then(expr = "order {word} is settled")]
async fn order_is_settled(world: &mut SettlementWorld, order_id: String) {
    let order = world.api().fetch_order(&OrderId::from(order_id)).await.unwrap().expect("Order does not exist");
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert!(order.is_settled());
}

#[then(expr = "order {word} is still pending")]
async fn order_is_pending(world: &mut SettlementWorld, order_id: String) {
    let order = world.api().fetch_order(&OrderId::from(order_id)).await.unwrap().expect("Order does not exist");
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert!(!order.is_settled());
}

#[then("the settlement is a no-op")]
async fn settlement_noop(world: &mut SettlementWorld) {
    let outcome = world.last_outcome.as_ref().expect("The last settlement failed");
    assert!(!outcome.newly_settled);
    assert!(outcome.reservations.is_noop());
    assert_eq!(outcome.commissions.rows_written, 0);
    assert_eq!(outcome.points.granted, 0);
}

#[then(expr = "the settlement fails for lack of stock in {word}")]
async fn settlement_out_of_stock(world: &mut SettlementWorld, unit: String) {
    match world.last_error.as_ref() {
        Some(SettlementError::InsufficientStock { stock_unit_id, .. }) => assert_eq!(stock_unit_id.as_str(), unit),
        other => panic!("Expected an insufficient stock error, got {other:?}"),
    }
}

#[then(expr = "the commission total of order {word} is {word}")]
async fn commission_total(world: &mut SettlementWorld, order_id: String, total: String) {
    let order = world.api().fetch_order(&OrderId::from(order_id)).await.unwrap().expect("Order does not exist");
    assert_eq!(order.commission_total, money(&total));
}

#[then(expr = "line {word} of order {word} earns {word} at {word}")]
async fn line_commission(world: &mut SettlementWorld, line_id: String, order_id: String, amount: String, rate: String) {
    let entries = world.ledger().commissions_for_order(&OrderId::from(order_id)).await.unwrap();
    let entry = entries
        .iter()
        .find(|e| e.order_line_id.as_str() == line_id)
        .unwrap_or_else(|| panic!("No commission for line {line_id}"));
    assert_eq!(entry.amount, money(&amount));
    assert_eq!(entry.rate.to_string(), rate);
}

#[then(expr = "order {word} has no commissions")]
async fn no_commissions(world: &mut SettlementWorld, order_id: String) {
    let entries = world.ledger().commissions_for_order(&OrderId::from(order_id)).await.unwrap();
    assert!(entries.is_empty());
}

#[then(expr = "stock unit {word} has {int} available and {int} reserved")]
async fn stock_counters(world: &mut SettlementWorld, unit: String, available: i64, reserved: i64) {
    let unit = world.db().fetch_stock_unit(&StockUnitId::from(unit)).await.unwrap().expect("Stock unit does not exist");
    assert_eq!((unit.available, unit.reserved), (available, reserved));
}

#[then(expr = "{word} has {int} points")]
async fn point_balance(world: &mut SettlementWorld, profile_id: String, points: i64) {
    let balance = world.ledger().point_balance(&ProfileId::from(profile_id)).await.unwrap();
    assert_eq!(balance, points);
}

fn find_entry<'a>(board: &'a [LeaderboardEntry], subject: &str) -> &'a LeaderboardEntry {
    board.iter().find(|e| e.subject_id == subject).unwrap_or_else(|| panic!("{subject} is not on the leaderboard"))
}

#[then(expr = "{word} is ranked {int} on this month's user leaderboard with {int} points")]
async fn user_rank(world: &mut SettlementWorld, profile_id: String, rank: i64, points: i64) {
    let period = LeaderboardPeriod::containing(Utc::now());
    let board = world.ledger().user_leaderboard(period, None, None).await.unwrap();
    let entry = find_entry(&board, &profile_id);
    assert_eq!((entry.rank, entry.points), (rank, points));
}

#[then(expr = "team {word} is ranked {int} on this month's team leaderboard with {int} points")]
async fn team_rank(world: &mut SettlementWorld, team_id: String, rank: i64, points: i64) {
    let period = LeaderboardPeriod::containing(Utc::now());
    let board = world.ledger().team_leaderboard(period, None, None).await.unwrap();
    let entry = find_entry(&board, &team_id);
    assert_eq!((entry.rank, entry.points), (rank, points));
}

#[then("next month's user leaderboard is empty")]
async fn next_month_empty(world: &mut SettlementWorld) {
    let period = LeaderboardPeriod::containing(Utc::now()).next();
    let board = world.ledger().user_leaderboard(period, None, None).await.unwrap();
    assert!(board.is_empty());
}

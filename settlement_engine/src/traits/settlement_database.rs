use thiserror::Error;

use crate::{
    db_types::{CommissionEntry, CommissionStatus, Order, OrderId, OrderLineId, PaymentStatus, ShopId, StockUnitId},
    helpers::PointRules,
    settlement_objects::{CommissionOutcome, OrderPaid, PointsOutcome, RefundOutcome, ReservationOutcome, SettlementOutcome},
    traits::{LedgerQueries, OrderManagement},
};

/// Malformed or inconsistent input. The order is left untouched and can be retried once the data is corrected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Order line {0} must be reserved against a stock unit, but none is assigned")]
    MissingStockUnit(OrderLineId),
    #[error("Order line {line_id} has a non-positive quantity ({quantity})")]
    NonPositiveQuantity { line_id: OrderLineId, quantity: i64 },
    #[error("Order line {0} has a negative line total")]
    NegativeLineTotal(OrderLineId),
    #[error("Order line {0} appears more than once")]
    DuplicateLine(OrderLineId),
    #[error("Order {0} has no lines")]
    EmptyOrder(OrderId),
    #[error("The consolidated quantity for stock unit {0} is too large")]
    QuantityOverflow(StockUnitId),
    #[error("Order {order_id} belongs to shop {expected}, but the payment event names shop {received}")]
    ShopMismatch { order_id: OrderId, expected: ShopId, received: ShopId },
    #[error("The payment event for order {order_id} conflicts with the stored {field}")]
    AttributionConflict { order_id: OrderId, field: &'static str },
}

#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("The requested order line {0} does not exist")]
    OrderLineNotFound(OrderLineId),
    #[error("Validation failed. {0}")]
    Validation(#[from] ValidationError),
    #[error("Insufficient stock for unit {stock_unit_id}: {requested} requested, {available} available")]
    InsufficientStock { stock_unit_id: StockUnitId, requested: i64, available: i64 },
    #[error("Stock unit {0} does not exist")]
    StockUnitNotFound(StockUnitId),
    #[error("Cannot {action} order {order_id} while its payment status is {status}")]
    InvalidPaymentState { order_id: OrderId, status: PaymentStatus, action: &'static str },
    #[error("No commission has been recorded for order line {0}")]
    CommissionNotFound(OrderLineId),
    #[error("A commission cannot move from {from} to {to}")]
    InvalidCommissionTransition { from: CommissionStatus, to: CommissionStatus },
}

impl SettlementError {
    /// Retrying the same request after the underlying data has been corrected (restock, line fix) can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SettlementError::DatabaseError(_) |
                SettlementError::Validation(_) |
                SettlementError::InsufficientStock { .. } |
                SettlementError::StockUnitNotFound(_)
        )
    }
}

impl From<sqlx::Error> for SettlementError {
    fn from(e: sqlx::Error) -> Self {
        SettlementError::DatabaseError(e.to_string())
    }
}

/// The write side of the settlement pipeline.
///
/// Every method is one atomic unit of work: either all of its effects are committed, or none are. Every method is
/// also idempotent, so callers that time out or fail may simply retry.
#[allow(async_fn_in_trait)]
pub trait SettlementDatabase: Clone + OrderManagement + LedgerQueries {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Settles a paid order.
    ///
    /// In a single transaction:
    /// * claims the order row, so that concurrent settlements of the same order run one after the other,
    /// * checks the event against the stored order, filling in attribution the order does not carry yet,
    /// * moves the payment status from `Pending` to `Paid` (already `Paid` is accepted, anything else is an error),
    /// * reserves inventory, writes the commission ledger and grants point events,
    /// * stamps `settled_at` the first time.
    ///
    /// Any failure rolls everything back and leaves the order unsettled and retryable. Settling an already settled
    /// order is a no-op on every ledger and counter.
    async fn settle_order(&self, event: &OrderPaid, rules: &PointRules) -> Result<SettlementOutcome, SettlementError>;

    /// Recomputes the commission ledger and aggregate of a paid order, e.g. after a rate correction.
    async fn write_commissions(&self, order_id: &OrderId) -> Result<CommissionOutcome, SettlementError>;

    /// Re-grants point events for a paid order. Events already in the ledger are skipped.
    async fn grant_points(&self, order_id: &OrderId, rules: &PointRules) -> Result<PointsOutcome, SettlementError>;

    /// Re-applies the reservation step of a paid order, e.g. after a line quantity or stock unit changed.
    async fn reserve_inventory(&self, order_id: &OrderId) -> Result<ReservationOutcome, SettlementError>;

    /// Refunds a paid order: releases its active reservations, cancels commissions that have not been paid out and
    /// marks the order `Refunded`. Point events are append-only and remain. Refunding a refunded order is a no-op.
    async fn refund_order(&self, order_id: &OrderId) -> Result<RefundOutcome, SettlementError>;

    /// Marks a pending order as failed. A failed order is never settled.
    async fn mark_payment_failed(&self, order_id: &OrderId) -> Result<Order, SettlementError>;

    /// Moves a commission entry along its lifecycle, stamping `confirmed_at` or `paid_at` as appropriate.
    async fn update_commission_status(
        &self,
        order_line_id: &OrderLineId,
        status: CommissionStatus,
    ) -> Result<CommissionEntry, SettlementError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), SettlementError> {
        Ok(())
    }
}

use asp_common::CommissionRate;

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderLine, OrderLineId, StockUnitId},
    traits::SettlementError,
};

/// Order ingestion and line maintenance.
///
/// Lines are fixed at checkout, apart from the stock unit assignment, quantity and commission override, which can be
/// corrected before (re)settlement. Corrections to a settled order only take effect when the corresponding writer is
/// rerun.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    /// Stores a new order and its lines. If an order with the same id exists, the stored order is returned and the
    /// second element of the tuple is `false`.
    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), SettlementError>;

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, SettlementError>;

    /// The lines of the order, in insertion order
    async fn fetch_order_lines(&self, order_id: &OrderId) -> Result<Vec<OrderLine>, SettlementError>;

    async fn assign_stock_unit(
        &self,
        line_id: &OrderLineId,
        stock_unit_id: Option<StockUnitId>,
    ) -> Result<OrderLine, SettlementError>;

    /// Sets a new, strictly positive, quantity on the line
    async fn update_line_quantity(&self, line_id: &OrderLineId, quantity: i64) -> Result<OrderLine, SettlementError>;

    async fn update_line_commission_override(
        &self,
        line_id: &OrderLineId,
        rate: Option<CommissionRate>,
    ) -> Result<OrderLine, SettlementError>;
}

use std::fmt::Debug;

use asp_common::CommissionRate;
use log::*;

use crate::{
    db_types::{CommissionEntry, CommissionStatus, NewOrder, Order, OrderId, OrderLine, OrderLineId, StockUnitId},
    events::{EventProducers, OrderRefundedEvent, OrderSettledEvent, SettlementFailedEvent},
    helpers::PointRules,
    settlement_objects::{CommissionOutcome, OrderPaid, PointsOutcome, RefundOutcome, ReservationOutcome, SettlementOutcome},
    traits::{SettlementDatabase, SettlementError},
};

/// `SettlementApi` is the entry point of the settlement pipeline.
///
/// It turns the payment layer's "order paid" signal into one atomic unit of work on the backend (commissions, point
/// events and inventory reservations) and reports the outcome to the event hooks. Every call is idempotent, so a
/// caller that timed out or received a retryable error may repeat it.
pub struct SettlementApi<B> {
    db: B,
    rules: PointRules,
    producers: EventProducers,
}

impl<B> Debug for SettlementApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettlementApi ({:?})", self.rules)
    }
}

impl<B> SettlementApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, rules: PointRules::default(), producers }
    }

    pub fn with_point_rules(mut self, rules: PointRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn point_rules(&self) -> &PointRules {
        &self.rules
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}

impl<B> SettlementApi<B>
where B: SettlementDatabase
{
    /// Stores an order written at checkout. Returns the stored order, and `false` if it already existed.
    pub async fn submit_order(&self, order: NewOrder) -> Result<(Order, bool), SettlementError> {
        let order_id = order.order_id.clone();
        let (order, created) = self.db.insert_order(order).await?;
        if created {
            debug!("🔄️📦️ Order [{order_id}] for shop {} stored", order.shop_id);
        } else {
            debug!("🔄️📦️ Order [{order_id}] already exists. Nothing to do.");
        }
        Ok((order, created))
    }

    /// Settles a paid order.
    ///
    /// On success, the order settled hook is notified. On failure nothing has been written, the failure hook is
    /// notified and the error is returned so the caller can retry later.
    pub async fn order_paid(&self, event: OrderPaid) -> Result<SettlementOutcome, SettlementError> {
        let order_id = event.order_id.clone();
        trace!("🔄️💰️ Payment received for order [{order_id}]. Settling.");
        match self.db.settle_order(&event, &self.rules).await {
            Ok(outcome) => {
                if outcome.newly_settled {
                    info!(
                        "🔄️💰️ Order [{order_id}] settled. {} reservation changes, {} commission rows (total {}), {} \
                         point events",
                        outcome.reservations.changes.len(),
                        outcome.commissions.rows_written,
                        outcome.commissions.total,
                        outcome.points.granted
                    );
                } else {
                    debug!("🔄️💰️ Order [{order_id}] was already settled. Rerun applied no new effects.");
                }
                self.call_order_settled_hook(&outcome).await;
                Ok(outcome)
            },
            Err(e) => {
                warn!("🔄️💰️ Settlement of order [{order_id}] failed and was rolled back. {e}");
                self.call_settlement_failed_hook(&order_id, &e).await;
                Err(e)
            },
        }
    }

    /// Refunds a paid order, releasing its reservations and cancelling unpaid commissions
    pub async fn order_refunded(&self, order_id: &OrderId) -> Result<RefundOutcome, SettlementError> {
        let outcome = self.db.refund_order(order_id).await?;
        if outcome.newly_refunded {
            info!(
                "🔄️↩️ Order [{order_id}] refunded. {} reservations released, {} commissions cancelled",
                outcome.released.len(),
                outcome.cancelled_commissions
            );
            for emitter in &self.producers.order_refunded_producer {
                emitter.publish_event(OrderRefundedEvent::new(outcome.clone())).await;
            }
        }
        Ok(outcome)
    }

    pub async fn payment_failed(&self, order_id: &OrderId) -> Result<Order, SettlementError> {
        let order = self.db.mark_payment_failed(order_id).await?;
        info!("🔄️❌️ Payment for order [{order_id}] failed. The order will not be settled.");
        Ok(order)
    }

    /// Recomputes commissions after a rate change. Only changed rows and the aggregate are written.
    pub async fn rerun_commissions(&self, order_id: &OrderId) -> Result<CommissionOutcome, SettlementError> {
        let outcome = self.db.write_commissions(order_id).await?;
        debug!("🔄️ Commission rerun for [{order_id}]: {} rows written, total {}", outcome.rows_written, outcome.total);
        Ok(outcome)
    }

    pub async fn rerun_points(&self, order_id: &OrderId) -> Result<PointsOutcome, SettlementError> {
        let outcome = self.db.grant_points(order_id, &self.rules).await?;
        debug!("🔄️ Point rerun for [{order_id}]: {} of {} events granted", outcome.granted, outcome.planned);
        Ok(outcome)
    }

    /// Re-applies reservations after line quantities or stock unit assignments changed. Only deltas are applied.
    pub async fn rerun_reservations(&self, order_id: &OrderId) -> Result<ReservationOutcome, SettlementError> {
        let outcome = self.db.reserve_inventory(order_id).await?;
        debug!("🔄️ Reservation rerun for [{order_id}]: {} changes", outcome.changes.len());
        Ok(outcome)
    }

    pub async fn assign_stock_unit(
        &self,
        line_id: &OrderLineId,
        stock_unit_id: Option<StockUnitId>,
    ) -> Result<OrderLine, SettlementError> {
        self.db.assign_stock_unit(line_id, stock_unit_id).await
    }

    pub async fn update_line_quantity(&self, line_id: &OrderLineId, quantity: i64) -> Result<OrderLine, SettlementError> {
        self.db.update_line_quantity(line_id, quantity).await
    }

    pub async fn update_line_commission_override(
        &self,
        line_id: &OrderLineId,
        rate: Option<CommissionRate>,
    ) -> Result<OrderLine, SettlementError> {
        self.db.update_line_commission_override(line_id, rate).await
    }

    pub async fn update_commission_status(
        &self,
        line_id: &OrderLineId,
        status: CommissionStatus,
    ) -> Result<CommissionEntry, SettlementError> {
        let entry = self.db.update_commission_status(line_id, status).await?;
        debug!("🔄️ Commission for line {line_id} is now {}", entry.status);
        Ok(entry)
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, SettlementError> {
        self.db.fetch_order(order_id).await
    }

    async fn call_order_settled_hook(&self, outcome: &SettlementOutcome) {
        for emitter in &self.producers.order_settled_producer {
            debug!("🔄️📬️ Notifying order settled hook subscribers");
            emitter.publish_event(OrderSettledEvent::new(outcome.clone())).await;
        }
    }

    async fn call_settlement_failed_hook(&self, order_id: &OrderId, error: &SettlementError) {
        for emitter in &self.producers.settlement_failed_producer {
            let event = SettlementFailedEvent {
                order_id: order_id.clone(),
                reason: error.to_string(),
                retryable: error.is_retryable(),
            };
            emitter.publish_event(event).await;
        }
    }
}

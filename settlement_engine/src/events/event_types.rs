use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Order, OrderId},
    settlement_objects::{RefundOutcome, SettlementOutcome},
};

/// Published after a settlement transaction commits, including reruns of already settled orders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSettledEvent {
    pub outcome: SettlementOutcome,
}

impl OrderSettledEvent {
    pub fn new(outcome: SettlementOutcome) -> Self {
        Self { outcome }
    }

    pub fn order(&self) -> &Order {
        &self.outcome.order
    }
}

/// Published when a settlement was rolled back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementFailedEvent {
    pub order_id: OrderId,
    pub reason: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRefundedEvent {
    pub outcome: RefundOutcome,
}

impl OrderRefundedEvent {
    pub fn new(outcome: RefundOutcome) -> Self {
        Self { outcome }
    }
}

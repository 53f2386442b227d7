use asp_common::Money;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{CommissionEntry, Order, OrderId, ProfileId, SessionId, ShopId},
    helpers::ReservationChange,
};

/// The inbound "order marked paid" signal from the payment layer. This is the only event that triggers settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaid {
    pub order_id: OrderId,
    pub shop_id: ShopId,
    #[serde(default)]
    pub affiliate_profile_id: Option<ProfileId>,
    #[serde(default)]
    pub customer_profile_id: Option<ProfileId>,
    #[serde(default)]
    pub buyer_session_id: Option<SessionId>,
}

impl OrderPaid {
    pub fn new<O: Into<OrderId>, S: Into<ShopId>>(order_id: O, shop_id: S) -> Self {
        Self {
            order_id: order_id.into(),
            shop_id: shop_id.into(),
            affiliate_profile_id: None,
            customer_profile_id: None,
            buyer_session_id: None,
        }
    }

    pub fn with_affiliate<P: Into<ProfileId>>(mut self, affiliate: P) -> Self {
        self.affiliate_profile_id = Some(affiliate.into());
        self
    }

    pub fn with_customer<P: Into<ProfileId>>(mut self, customer: P) -> Self {
        self.customer_profile_id = Some(customer.into());
        self
    }

    pub fn with_session<S: Into<SessionId>>(mut self, session: S) -> Self {
        self.buyer_session_id = Some(session.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionOutcome {
    /// The order's full ledger after the run
    pub entries: Vec<CommissionEntry>,
    /// Rows inserted or changed by this run. Zero for a rerun with unchanged inputs.
    pub rows_written: u64,
    pub total: Money,
    /// `true` when the order has no affiliate and nothing was written
    pub skipped: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsOutcome {
    pub planned: usize,
    /// Events actually added to the ledger. The rest were already there.
    pub granted: u64,
    pub points_granted: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationOutcome {
    /// The non-zero deltas applied to stock counters
    pub changes: Vec<ReservationChange>,
}

impl ReservationOutcome {
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementOutcome {
    pub order: Order,
    /// `false` when the order had already been settled and this run changed nothing
    pub newly_settled: bool,
    pub reservations: ReservationOutcome,
    pub commissions: CommissionOutcome,
    pub points: PointsOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundOutcome {
    pub order: Order,
    /// `false` when the order had already been refunded
    pub newly_refunded: bool,
    pub released: Vec<ReservationChange>,
    pub cancelled_commissions: u64,
}

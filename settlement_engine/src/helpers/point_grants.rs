use serde::{Deserialize, Serialize};

use crate::db_types::{NewPointEvent, Order, OrderLine, PointEventKey, PointEventType};

/// Point values awarded per event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointRules {
    pub order_success: i64,
    pub item_sold: i64,
    pub new_customer: i64,
}

impl Default for PointRules {
    fn default() -> Self {
        Self { order_success: 10, item_sold: 5, new_customer: 25 }
    }
}

impl PointRules {
    pub fn points_for(&self, event_type: PointEventType) -> i64 {
        match event_type {
            PointEventType::OrderSuccess => self.order_success,
            PointEventType::ItemSold => self.item_sold,
            PointEventType::NewCustomerSignup => self.new_customer,
        }
    }
}

/// Lists every point event a paid order is entitled to.
///
/// The plan is the same every time it is computed for the same order, and the backend discards events whose key is
/// already in the ledger. Orders without an affiliate earn nothing. The new-customer bonus is only planned when the
/// order carries a buyer identity, and its key does not mention the order, so a returning buyer's later orders map
/// onto the key of the first one.
pub fn plan_point_grants(order: &Order, lines: &[OrderLine], rules: &PointRules) -> Vec<NewPointEvent> {
    let beneficiary = match &order.affiliate_id {
        Some(a) => a.clone(),
        None => return Vec::new(),
    };
    let shop_id = order.shop_id.clone();
    let mut keys = Vec::with_capacity(lines.len() + 2);
    keys.push(PointEventKey::OrderSuccess {
        shop_id: shop_id.clone(),
        order_id: order.order_id.clone(),
        beneficiary: beneficiary.clone(),
    });
    keys.extend(lines.iter().map(|line| PointEventKey::ItemSold {
        shop_id: shop_id.clone(),
        line_id: line.line_id.clone(),
        beneficiary: beneficiary.clone(),
    }));
    if let Some(buyer) = order.buyer_identity() {
        keys.push(PointEventKey::NewCustomerSignup { shop_id, buyer, beneficiary });
    }
    keys.into_iter()
        .map(|key| {
            let points = rules.points_for(key.event_type());
            NewPointEvent { key, order_id: order.order_id.clone(), points }
        })
        .collect()
}

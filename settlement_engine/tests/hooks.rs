use std::{
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
    time::Duration,
};

use log::*;
use settlement_engine::{
    db_types::{NewOrder, NewOrderLine, OrderId},
    events::{EventHandlers, EventHooks},
    settlement_objects::OrderPaid,
};

mod support;
use support::{money, Fixture};

const SHOP: &str = "shop-1";

#[derive(Default, Clone)]
struct HookCalled {
    called: Arc<AtomicI32>,
}

impl HookCalled {
    pub fn called(&self) {
        let _ = self.called.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> i32 {
        self.called.load(Ordering::Relaxed)
    }

    /// Handlers run on their own tasks, so give them a moment to catch up
    pub async fn wait_for(&self, expected: i32) -> i32 {
        for _ in 0..50 {
            if self.count() >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.count()
    }
}

#[tokio::test]
async fn settlement_hooks_fire() {
    let settled = HookCalled::default();
    let failed = HookCalled::default();
    let refunded = HookCalled::default();
    let mut hooks = EventHooks::default();
    let settled_copy = settled.clone();
    hooks.on_order_settled(move |ev| {
        info!("🪝️ Order settled: {} (new: {})", ev.outcome.order.order_id, ev.outcome.newly_settled);
        settled_copy.called();
        Box::pin(async {})
    });
    let failed_copy = failed.clone();
    hooks.on_settlement_failed(move |ev| {
        info!("🪝️ Settlement failed for {}: {} (retryable: {})", ev.order_id, ev.reason, ev.retryable);
        failed_copy.called();
        Box::pin(async {})
    });
    let refunded_copy = refunded.clone();
    hooks.on_order_refunded(move |ev| {
        info!("🪝️ Order refunded: {}", ev.outcome.order.order_id);
        refunded_copy.called();
        Box::pin(async {})
    });
    let handlers = EventHandlers::new(16, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let fixture = Fixture::with_producers(producers).await;

    let order = NewOrder::new("4001", SHOP)
        .with_affiliate("aff-1")
        .with_line(NewOrderLine::new("4001-1", "p-rated", 1, money("10.00")).with_stock_unit("su-1"));
    fixture.api.submit_order(order).await.unwrap();
    let short = NewOrder::new("4002", SHOP)
        .with_line(NewOrderLine::new("4002-1", "p-rated", 5, money("50.00")).with_stock_unit("su-low"));
    fixture.api.submit_order(short).await.unwrap();

    fixture.api.order_paid(OrderPaid::new("4001", SHOP)).await.unwrap();
    fixture.api.order_paid(OrderPaid::new("4001", SHOP)).await.unwrap();
    let _ = fixture.api.order_paid(OrderPaid::new("4002", SHOP)).await.unwrap_err();
    fixture.api.order_refunded(&OrderId::from("4001")).await.unwrap();
    fixture.api.order_refunded(&OrderId::from("4001")).await.unwrap();

    assert_eq!(settled.wait_for(2).await, 2);
    assert_eq!(failed.wait_for(1).await, 1);
    assert_eq!(refunded.wait_for(1).await, 1);
    fixture.tear_down().await;
    info!("🪝️ test complete");
}

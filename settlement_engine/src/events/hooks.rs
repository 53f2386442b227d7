use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    EventHandler,
    EventProducer,
    Handler,
    OrderRefundedEvent,
    OrderSettledEvent,
    SettlementFailedEvent,
};

type BoxedHook<E> = dyn (Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static;

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_settled_producer: Vec<EventProducer<OrderSettledEvent>>,
    pub settlement_failed_producer: Vec<EventProducer<SettlementFailedEvent>>,
    pub order_refunded_producer: Vec<EventProducer<OrderRefundedEvent>>,
}

pub struct EventHandlers {
    pub on_order_settled: Option<EventHandler<OrderSettledEvent>>,
    pub on_settlement_failed: Option<EventHandler<SettlementFailedEvent>>,
    pub on_order_refunded: Option<EventHandler<OrderRefundedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_settled = hooks.on_order_settled.map(|f| EventHandler::new("order_settled", buffer_size, f));
        let on_settlement_failed =
            hooks.on_settlement_failed.map(|f| EventHandler::new("settlement_failed", buffer_size, f));
        let on_order_refunded = hooks.on_order_refunded.map(|f| EventHandler::new("order_refunded", buffer_size, f));
        Self { on_order_settled, on_settlement_failed, on_order_refunded }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_settled {
            result.order_settled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_settlement_failed {
            result.settlement_failed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_refunded {
            result.order_refunded_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_settled {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_settlement_failed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_order_refunded {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_settled: Option<Handler<OrderSettledEvent>>,
    pub on_settlement_failed: Option<Handler<SettlementFailedEvent>>,
    pub on_order_refunded: Option<Handler<OrderRefundedEvent>>,
}

impl EventHooks {
    pub fn on_order_settled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderSettledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_settled = Some(Arc::new(f) as Arc<BoxedHook<OrderSettledEvent>>);
        self
    }

    pub fn on_settlement_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(SettlementFailedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_settlement_failed = Some(Arc::new(f) as Arc<BoxedHook<SettlementFailedEvent>>);
        self
    }

    pub fn on_order_refunded<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderRefundedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_refunded = Some(Arc::new(f) as Arc<BoxedHook<OrderRefundedEvent>>);
        self
    }
}

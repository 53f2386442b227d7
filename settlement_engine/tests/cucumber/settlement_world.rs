use std::collections::HashMap;

use cucumber::World;
use log::*;
use settlement_engine::{
    db_types::{NewOrder, OrderId},
    settlement_objects::SettlementOutcome,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    LedgerApi,
    SettlementApi,
    SettlementError,
    SqliteDatabase,
};
use tokio::time::sleep;

#[derive(Default, Debug, World)]
pub struct SettlementWorld {
    pub system: Option<SettlementSystem>,
    /// Orders under construction, keyed by order id, until they are submitted
    pub drafts: HashMap<String, NewOrder>,
    pub last_outcome: Option<SettlementOutcome>,
    pub last_error: Option<SettlementError>,
}

#[derive(Debug)]
pub struct SettlementSystem {
    pub db_path: String,
    pub api: SettlementApi<SqliteDatabase>,
    pub ledger: LedgerApi<SqliteDatabase>,
}

impl SettlementWorld {
    pub fn api(&self) -> &SettlementApi<SqliteDatabase> {
        &self.system.as_ref().expect("SettlementApi not initialised").api
    }

    pub fn ledger(&self) -> &LedgerApi<SqliteDatabase> {
        &self.system.as_ref().expect("LedgerApi not initialised").ledger
    }

    pub fn db(&self) -> &SqliteDatabase {
        self.api().db()
    }

    pub fn draft(&mut self, order_id: &str) -> &mut NewOrder {
        self.drafts.get_mut(order_id).unwrap_or_else(|| panic!("Order {order_id} has not been started"))
    }

    pub async fn settle(&mut self, order_id: &str, shop_id: &str) {
        let event = settlement_engine::settlement_objects::OrderPaid::new(OrderId::from(order_id), shop_id);
        match self.api().order_paid(event).await {
            Ok(outcome) => {
                self.last_outcome = Some(outcome);
                self.last_error = None;
            },
            Err(e) => {
                self.last_outcome = None;
                self.last_error = Some(e);
            },
        }
    }
}

impl SettlementSystem {
    pub async fn new() -> Self {
        let url = random_db_path();
        let db = prepare_test_env(&url).await;
        debug!("Created database: {url}");
        sleep(std::time::Duration::from_millis(50)).await;
        let api = SettlementApi::new(db.clone(), Default::default());
        let ledger = LedgerApi::new(db);
        Self { db_path: url, api, ledger }
    }
}

#![allow(dead_code)]
use asp_common::{CommissionRate, Money};
use log::*;
use settlement_engine::{
    db_types::{MerchantId, NewStockUnit, ProductId, StockUnit, StockUnitId, Variant, VariantId},
    events::EventProducers,
    test_utils::prepare_env::{drop_database, prepare_test_env, random_db_path},
    traits::{NewMerchant, NewProduct, NewVariant},
    CatalogManagement,
    LedgerApi,
    SettlementApi,
    SettlementDatabase,
    SqliteDatabase,
};

pub struct Fixture {
    pub url: String,
    pub db: SqliteDatabase,
    pub api: SettlementApi<SqliteDatabase>,
    pub ledger: LedgerApi<SqliteDatabase>,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_producers(EventProducers::default()).await
    }

    pub async fn with_producers(producers: EventProducers) -> Self {
        let url = random_db_path();
        let db = prepare_test_env(&url).await;
        seed_catalog(&db).await;
        let api = SettlementApi::new(db.clone(), producers);
        let ledger = LedgerApi::new(db.clone());
        Self { url, db, api, ledger }
    }

    pub async fn tear_down(mut self) {
        if let Err(e) = self.api.db_mut().close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        drop_database(&self.url).await;
    }

    pub async fn stock_unit(&self, id: &str) -> StockUnit {
        self.db.fetch_stock_unit(&StockUnitId::from(id)).await.unwrap().expect("stock unit exists")
    }

    pub async fn variant(&self, id: &str) -> Variant {
        self.db.fetch_variant(&VariantId::from(id)).await.unwrap().expect("variant exists")
    }

    pub async fn ledger_size(&self) -> i64 {
        self.db.point_ledger_size().await.unwrap()
    }
}

pub fn money(s: &str) -> Money {
    s.parse().expect("valid amount")
}

pub fn pct(p: i64) -> CommissionRate {
    CommissionRate::from_percent(p).expect("valid rate")
}

/// Catalog used by the tests:
///
/// | product      | product rate | merchant (default rate) |
/// |--------------|--------------|-------------------------|
/// | `p-rated`    | 10%          | `m-default` (5%)        |
/// | `p-merchant` | -            | `m-default` (5%)        |
/// | `p-zero`     | 0%           | `m-zero` (0%)           |
/// | `p-bare`     | -            | -                       |
///
/// Stock units: `su-1` (10, variant `v-1`), `su-2` (5), `su-low` (1).
pub async fn seed_catalog(db: &SqliteDatabase) {
    let merchants = [("m-default", Some(pct(5))), ("m-zero", Some(pct(0)))];
    for (id, rate) in merchants {
        db.upsert_merchant(NewMerchant { merchant_id: MerchantId::from(id), default_commission_rate: rate })
            .await
            .expect("Error creating merchant");
    }
    let products = [
        ("p-rated", Some("m-default"), Some(pct(10))),
        ("p-merchant", Some("m-default"), None),
        ("p-zero", Some("m-zero"), Some(pct(0))),
        ("p-bare", None, None),
    ];
    for (id, merchant, rate) in products {
        db.upsert_product(NewProduct {
            product_id: ProductId::from(id),
            merchant_id: merchant.map(MerchantId::from),
            commission_rate: rate,
        })
        .await
        .expect("Error creating product");
    }
    db.upsert_variant(NewVariant { variant_id: VariantId::from("v-1"), product_id: Some(ProductId::from("p-rated")), available: 10 })
        .await
        .expect("Error creating variant");
    let units = [NewStockUnit::new("su-1", 10).for_variant("v-1"), NewStockUnit::new("su-2", 5), NewStockUnit::new("su-low", 1)];
    for unit in units {
        db.upsert_stock_unit(unit).await.expect("Error creating stock unit");
    }
}

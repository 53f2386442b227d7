use asp_common::CommissionRate;
use cucumber::given;
use settlement_engine::{
    db_types::{MerchantId, NewStockUnit, ProductId, ProfileId, TeamId},
    traits::{NewMerchant, NewProduct},
    CatalogManagement,
};

use crate::cucumber::{settlement_world::SettlementSystem, SettlementWorld};

fn rate(s: &str) -> CommissionRate {
    s.parse().expect("Not a valid commission rate")
}

#[given("a fresh install")]
async fn fresh_database(world: &mut SettlementWorld) {
    let system = SettlementSystem::new().await;
    world.system = Some(system);
}

#[given(expr = "merchant {word} with a default commission of {word}")]
async fn merchant(world: &mut SettlementWorld, merchant_id: String, default_rate: String) {
    let merchant = NewMerchant { merchant_id: MerchantId::from(merchant_id), default_commission_rate: Some(rate(&default_rate)) };
    world.db().upsert_merchant(merchant).await.expect("Error creating merchant");
}

#[given(expr = "product {word} sold by {word}")]
async fn product_of_merchant(world: &mut SettlementWorld, product_id: String, merchant_id: String) {
    let product =
        NewProduct { product_id: ProductId::from(product_id), merchant_id: Some(MerchantId::from(merchant_id)), commission_rate: None };
    world.db().upsert_product(product).await.expect("Error creating product");
}

#[given(expr = "product {word} sold by {word} with a commission of {word}")]
async fn product_with_rate(world: &mut SettlementWorld, product_id: String, merchant_id: String, product_rate: String) {
    let product = NewProduct {
        product_id: ProductId::from(product_id),
        merchant_id: Some(MerchantId::from(merchant_id)),
        commission_rate: Some(rate(&product_rate)),
    };
    world.db().upsert_product(product).await.expect("Error creating product");
}

#[given(expr = "stock unit {word} with {int} available")]
async fn stock_unit(world: &mut SettlementWorld, stock_unit_id: String, available: i64) {
    world.db().upsert_stock_unit(NewStockUnit::new(stock_unit_id, available)).await.expect("Error creating stock unit");
}

#[given(expr = "{word} is on team {word}")]
async fn team_member(world: &mut SettlementWorld, profile_id: String, team_id: String) {
    world.db().assign_team(&ProfileId::from(profile_id), Some(TeamId::from(team_id))).await.expect("Error assigning team");
}

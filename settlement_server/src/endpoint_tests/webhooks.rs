use actix_web::{http::StatusCode, test, web, App};
use asp_common::{CommissionRate, Secret};
use settlement_engine::{
    db_types::{MerchantId, NewStockUnit, ProductId},
    events::EventProducers,
    test_utils::prepare_env::{drop_database, prepare_test_env, random_db_path},
    traits::{NewMerchant, NewProduct},
    CatalogManagement,
    LedgerApi,
    SettlementApi,
    SqliteDatabase,
};

use super::helpers::post_request;
use crate::{
    config::HMAC_HEADER,
    helpers::calculate_hmac,
    middleware::HmacMiddlewareFactory,
    routes::{OrderPaidRoute, OrderRefundedRoute, PaymentFailedRoute, SubmitOrderRoute},
};

const SECRET: &str = "test-secret";

const ORDER_5001: &str = r#"{
    "order_id": "5001",
    "shop_id": "shop-1",
    "affiliate_id": "alice",
    "customer_profile_id": "bob",
    "lines": [
        { "line_id": "5001-1", "product_id": "widget", "stock_unit_id": "su-widget", "quantity": 2, "line_total": 40000000 }
    ]
}"#;

const ORDER_5002: &str = r#"{
    "order_id": "5002",
    "shop_id": "shop-1",
    "lines": [
        { "line_id": "5002-1", "product_id": "widget", "stock_unit_id": "su-widget", "quantity": 50, "line_total": 1000000000 }
    ]
}"#;

async fn prepare_db() -> (String, SqliteDatabase) {
    let url = random_db_path();
    let db = prepare_test_env(&url).await;
    let rate = CommissionRate::from_percent(10).unwrap();
    db.upsert_merchant(NewMerchant { merchant_id: MerchantId::from("acme"), default_commission_rate: Some(rate) })
        .await
        .unwrap();
    db.upsert_product(NewProduct {
        product_id: ProductId::from("widget"),
        merchant_id: Some(MerchantId::from("acme")),
        commission_rate: None,
    })
    .await
    .unwrap();
    db.upsert_stock_unit(NewStockUnit::new("su-widget", 10)).await.unwrap();
    (url, db)
}

fn signed(body: &str) -> String {
    calculate_hmac(SECRET, body.as_bytes())
}

#[actix_web::test]
async fn webhook_settlement_flow() {
    let (url, db) = prepare_db().await;
    let app = App::new()
        .app_data(web::Data::new(SettlementApi::new(db.clone(), EventProducers::default())))
        .app_data(web::Data::new(LedgerApi::new(db.clone())))
        .service(SubmitOrderRoute::<SqliteDatabase>::new())
        .service(
            web::scope("/webhook")
                .wrap(HmacMiddlewareFactory::new(HMAC_HEADER, Secret::new(SECRET.to_string()), true))
                .service(OrderPaidRoute::<SqliteDatabase>::new())
                .service(OrderRefundedRoute::<SqliteDatabase>::new())
                .service(PaymentFailedRoute::<SqliteDatabase>::new()),
        );
    let service = test::init_service(app).await;

    // Ingestion is idempotent
    let (status, body) = post_request(&service, "/orders", ORDER_5001, &[]).await.unwrap();
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let (status, _) = post_request(&service, "/orders", ORDER_5001, &[]).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    let (status, _) = post_request(&service, "/orders", ORDER_5002, &[]).await.unwrap();
    assert_eq!(status, StatusCode::CREATED);

    // Unsigned and badly signed webhooks never reach the handler
    let paid = r#"{"order_id":"5001","shop_id":"shop-1"}"#;
    let err = post_request(&service, "/webhook/order_paid", paid, &[]).await.unwrap_err();
    assert!(err.contains("HMAC"), "{err}");
    let bad_sig = calculate_hmac("not-the-secret", paid.as_bytes());
    let err = post_request(&service, "/webhook/order_paid", paid, &[(HMAC_HEADER, bad_sig.as_str())]).await.unwrap_err();
    assert!(err.contains("HMAC"), "{err}");

    let sig = signed(paid);
    let (status, body) = post_request(&service, "/webhook/order_paid", paid, &[(HMAC_HEADER, sig.as_str())]).await.unwrap();
    assert_eq!(status, StatusCode::OK, "{body}");
    let outcome: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(outcome["newly_settled"], true);
    assert_eq!(outcome["order"]["payment_status"], "Paid");
    // 10% of 40.00
    assert_eq!(outcome["commissions"]["total"], 4_000_000);
    // order success, item sold and the new customer bonus
    assert_eq!(outcome["points"]["points_granted"], 40);

    // A replay is acknowledged without doing anything
    let (status, body) = post_request(&service, "/webhook/order_paid", paid, &[(HMAC_HEADER, sig.as_str())]).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    let outcome: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(outcome["newly_settled"], false);
    assert_eq!(outcome["points"]["granted"], 0);

    // Not enough stock: the payment layer gets a conflict and will retry
    let paid = r#"{"order_id":"5002","shop_id":"shop-1"}"#;
    let sig = signed(paid);
    let (status, body) = post_request(&service, "/webhook/order_paid", paid, &[(HMAC_HEADER, sig.as_str())]).await.unwrap();
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert!(body.contains("su-widget"), "{body}");

    // Unknown orders
    let paid = r#"{"order_id":"9999","shop_id":"shop-1"}"#;
    let sig = signed(paid);
    let (status, _) = post_request(&service, "/webhook/order_paid", paid, &[(HMAC_HEADER, sig.as_str())]).await.unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The unsettled order fails, the settled one is refunded
    let failed = r#"{"order_id":"5002"}"#;
    let sig = signed(failed);
    let (status, body) =
        post_request(&service, "/webhook/payment_failed", failed, &[(HMAC_HEADER, sig.as_str())]).await.unwrap();
    assert_eq!(status, StatusCode::OK, "{body}");
    let order: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(order["payment_status"], "Failed");

    let refunded = r#"{"order_id":"5001"}"#;
    let sig = signed(refunded);
    let (status, body) =
        post_request(&service, "/webhook/order_refunded", refunded, &[(HMAC_HEADER, sig.as_str())]).await.unwrap();
    assert_eq!(status, StatusCode::OK, "{body}");
    let outcome: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(outcome["newly_refunded"], true);
    assert_eq!(outcome["cancelled_commissions"], 1);
    let unit = db.fetch_stock_unit(&"su-widget".into()).await.unwrap().unwrap();
    assert_eq!(unit.available, 10);
    assert_eq!(unit.reserved, 0);

    db.pool().close().await;
    drop_database(&url).await;
}

#[actix_web::test]
async fn disabled_hmac_checks_let_webhooks_through() {
    let (url, db) = prepare_db().await;
    let app = App::new().app_data(web::Data::new(SettlementApi::new(db.clone(), EventProducers::default()))).service(
        web::scope("/webhook")
            .wrap(HmacMiddlewareFactory::new(HMAC_HEADER, Secret::new(SECRET.to_string()), false))
            .service(PaymentFailedRoute::<SqliteDatabase>::new()),
    );
    let service = test::init_service(app).await;
    let (status, _) = post_request(&service, "/webhook/payment_failed", r#"{"order_id":"404"}"#, &[]).await.unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
    db.pool().close().await;
    drop_database(&url).await;
}

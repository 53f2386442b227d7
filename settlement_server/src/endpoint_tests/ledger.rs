use actix_web::{http::StatusCode, web, web::ServiceConfig};
use asp_common::{CommissionRate, Money};
use chrono::{TimeZone, Utc};
use settlement_engine::{
    db_types::{
        CommissionEntry,
        CommissionStatus,
        LeaderboardEntry,
        LeaderboardPeriod,
        LeaderboardScope,
        OrderId,
        OrderLineId,
        PointEvent,
        PointEventType,
        ProfileId,
        ShopId,
    },
    LedgerApi,
};

use super::{helpers::get_request, mocks::MockLedgerStore};
use crate::routes::{OrderCommissionsRoute, PointsRoute, TeamLeaderboardRoute, UserLeaderboardRoute};

fn configure_with(store: MockLedgerStore) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg: &mut ServiceConfig| {
        cfg.service(OrderCommissionsRoute::<MockLedgerStore>::new())
            .service(PointsRoute::<MockLedgerStore>::new())
            .service(UserLeaderboardRoute::<MockLedgerStore>::new())
            .service(TeamLeaderboardRoute::<MockLedgerStore>::new())
            .app_data(web::Data::new(LedgerApi::new(store)));
    }
}

fn board() -> Vec<LeaderboardEntry> {
    vec![
        LeaderboardEntry { rank: 1, subject_id: "alice".into(), points: 45 },
        LeaderboardEntry { rank: 2, subject_id: "bob".into(), points: 30 },
        LeaderboardEntry { rank: 2, subject_id: "carol".into(), points: 30 },
    ]
}

#[actix_web::test]
async fn user_leaderboard_for_a_month() {
    let _ = env_logger::try_init().ok();
    let mut store = MockLedgerStore::new();
    store
        .expect_leaderboard()
        .withf(|q| {
            q.scope == LeaderboardScope::Users &&
                q.period == LeaderboardPeriod::new(2024, 10).unwrap() &&
                q.shop_id == Some(ShopId::from("shop-1")) &&
                q.limit == Some(3)
        })
        .times(1)
        .returning(|_| Ok(board()));
    let (status, body) =
        get_request("/leaderboard/users?period=2024-10&shop_id=shop-1&limit=3", configure_with(store)).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, USER_BOARD_JSON);
}

#[actix_web::test]
async fn team_leaderboard_defaults_to_this_month() {
    let _ = env_logger::try_init().ok();
    let mut store = MockLedgerStore::new();
    store
        .expect_leaderboard()
        .withf(|q| q.scope == LeaderboardScope::Teams && q.period == LeaderboardPeriod::current() && q.limit.is_none())
        .times(1)
        .returning(|_| Ok(vec![]));
    let (status, body) = get_request("/leaderboard/teams", configure_with(store)).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["entries"], serde_json::json!([]));
}

#[actix_web::test]
async fn invalid_leaderboard_queries() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/leaderboard/users?period=2024-13", configure_with(MockLedgerStore::new()))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("not a valid month"), "{body}");

    let (status, body) =
        get_request("/leaderboard/users?limit=0", configure_with(MockLedgerStore::new())).await.unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"Invalid query: A leaderboard limit must be at least 1"}"#);
}

#[actix_web::test]
async fn commissions_for_an_order() {
    let _ = env_logger::try_init().ok();
    let mut store = MockLedgerStore::new();
    store
        .expect_commissions_for_order()
        .withf(|id| id.as_str() == "1001")
        .returning(|_| Ok(vec![commission("1001-1", 10, "4.00"), commission("1001-2", 5, "0.62")]));
    store
        .expect_commission_total_for_order()
        .withf(|id| id.as_str() == "1001")
        .returning(|_| Ok(Some("4.62".parse().unwrap())));
    let (status, body) = get_request("/orders/1001/commissions", configure_with(store)).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["order_id"], "1001");
    assert_eq!(json["commission_total"], 4_620_000);
    assert_eq!(json["entries"].as_array().map(|a| a.len()), Some(2));
    assert_eq!(json["entries"][1]["rate"], 500);
    assert_eq!(json["entries"][1]["status"], "Pending");
}

#[actix_web::test]
async fn commission_total_is_the_stored_aggregate() {
    let _ = env_logger::try_init().ok();
    let mut store = MockLedgerStore::new();
    store.expect_commissions_for_order().returning(|_| {
        let mut huge = commission("1001-1", 10, "4.00");
        huge.amount = Money::from(i64::MAX);
        Ok(vec![huge.clone(), huge])
    });
    store.expect_commission_total_for_order().returning(|_| Ok(Some(Money::from(7))));
    let (status, body) = get_request("/orders/1001/commissions", configure_with(store)).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["commission_total"], 7);
    assert_eq!(json["entries"].as_array().map(|a| a.len()), Some(2));
}

#[actix_web::test]
async fn commissions_for_an_unknown_order() {
    let _ = env_logger::try_init().ok();
    let mut store = MockLedgerStore::new();
    store.expect_commission_total_for_order().returning(|_| Ok(None));
    store.expect_commissions_for_order().never();
    let (status, body) = get_request("/orders/404/commissions", configure_with(store)).await.unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("Order 404 does not exist"), "{body}");
}

#[actix_web::test]
async fn point_history() {
    let _ = env_logger::try_init().ok();
    let mut store = MockLedgerStore::new();
    store.expect_point_events_for_beneficiary().withf(|b| b.as_str() == "alice").returning(|_| {
        Ok(vec![
            point_event(1, PointEventType::OrderSuccess, 10),
            point_event(2, PointEventType::ItemSold, 5),
            point_event(3, PointEventType::NewCustomerSignup, 25),
        ])
    });
    let (status, body) = get_request("/points/alice", configure_with(store)).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["beneficiary"], "alice");
    assert_eq!(json["balance"], 40);
    assert_eq!(json["events"][2]["event_type"], "NewCustomerSignup");
}

fn commission(line: &str, percent: i64, amount: &str) -> CommissionEntry {
    let ts = Utc.with_ymd_and_hms(2024, 10, 2, 9, 30, 0).unwrap();
    CommissionEntry {
        id: 1,
        order_line_id: OrderLineId::from(line),
        order_id: OrderId::from("1001"),
        affiliate_id: ProfileId::from("alice"),
        rate: CommissionRate::from_percent(percent).unwrap(),
        amount: amount.parse::<Money>().unwrap(),
        status: CommissionStatus::Pending,
        confirmed_at: None,
        paid_at: None,
        created_at: ts,
        updated_at: ts,
    }
}

fn point_event(id: i64, event_type: PointEventType, points: i64) -> PointEvent {
    PointEvent {
        id,
        dedup_key: format!("key-{id}"),
        event_type,
        shop_id: ShopId::from("shop-1"),
        source_id: "1001".into(),
        beneficiary_id: ProfileId::from("alice"),
        order_id: OrderId::from("1001"),
        points,
        created_at: Utc.with_ymd_and_hms(2024, 10, 2, 9, 30, 0).unwrap(),
    }
}

const USER_BOARD_JSON: &str = r#"{"period":{"year":2024,"month":10},"entries":[{"rank":1,"subject_id":"alice","points":45},{"rank":2,"subject_id":"bob","points":30},{"rank":2,"subject_id":"carol","points":30}]}"#;

use serde::{Deserialize, Serialize};
use settlement_engine::db_types::{
    CommissionEntry,
    LeaderboardEntry,
    LeaderboardPeriod,
    OrderId,
    PointEvent,
    ProfileId,
    ShopId,
};

/// Body of the refund and payment failure webhooks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderNotification {
    pub order_id: OrderId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCommissions {
    pub order_id: OrderId,
    pub commission_total: asp_common::Money,
    pub entries: Vec<CommissionEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointHistory {
    pub beneficiary: ProfileId,
    pub balance: i64,
    pub events: Vec<PointEvent>,
}

/// Query parameters for the leaderboard endpoints. The period defaults to the current month.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaderboardParams {
    pub period: Option<String>,
    pub shop_id: Option<ShopId>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leaderboard {
    pub period: LeaderboardPeriod,
    pub entries: Vec<LeaderboardEntry>,
}

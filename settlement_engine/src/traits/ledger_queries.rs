use asp_common::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{
    CommissionEntry,
    LeaderboardEntry,
    LeaderboardPeriod,
    LeaderboardScope,
    OrderId,
    PointEvent,
    ProfileId,
    Reservation,
    ShopId,
};

#[derive(Debug, Clone, Error)]
pub enum LedgerApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("User error constructing query: {0}")]
    QueryError(String),
}

impl From<sqlx::Error> for LedgerApiError {
    fn from(e: sqlx::Error) -> Self {
        LedgerApiError::DatabaseError(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardQuery {
    pub scope: LeaderboardScope,
    pub period: LeaderboardPeriod,
    /// Restrict the board to points earned in one shop
    pub shop_id: Option<ShopId>,
    pub limit: Option<u32>,
}

impl LeaderboardQuery {
    pub fn new(scope: LeaderboardScope, period: LeaderboardPeriod) -> Self {
        Self { scope, period, shop_id: None, limit: None }
    }

    pub fn for_shop(mut self, shop_id: ShopId) -> Self {
        self.shop_id = Some(shop_id);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Read-only access to the durable ledgers. Nothing here mutates state.
#[allow(async_fn_in_trait)]
pub trait LedgerQueries {
    async fn commissions_for_order(&self, order_id: &OrderId) -> Result<Vec<CommissionEntry>, LedgerApiError>;

    /// The aggregate commission total stored on the order, or `None` if the order does not exist
    async fn commission_total_for_order(&self, order_id: &OrderId) -> Result<Option<Money>, LedgerApiError>;

    async fn commissions_for_affiliate(&self, affiliate_id: &ProfileId) -> Result<Vec<CommissionEntry>, LedgerApiError>;

    async fn point_events_for_beneficiary(&self, beneficiary: &ProfileId) -> Result<Vec<PointEvent>, LedgerApiError>;

    async fn point_events_for_order(&self, order_id: &OrderId) -> Result<Vec<PointEvent>, LedgerApiError>;

    async fn reservations_for_order(&self, order_id: &OrderId) -> Result<Vec<Reservation>, LedgerApiError>;

    /// Monthly point totals per user or per team, ranked by points (ties share a rank), then by subject id.
    async fn leaderboard(&self, query: LeaderboardQuery) -> Result<Vec<LeaderboardEntry>, LedgerApiError>;
}

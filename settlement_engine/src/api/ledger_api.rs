use std::fmt::Debug;

use asp_common::Money;
use log::trace;

use crate::{
    db_types::{CommissionEntry, LeaderboardEntry, LeaderboardPeriod, LeaderboardScope, OrderId, PointEvent, ProfileId, Reservation, ShopId},
    traits::{LeaderboardQuery, LedgerApiError, LedgerQueries},
};

/// Read-only access to the settlement ledgers, for dashboards and reports.
pub struct LedgerApi<B> {
    db: B,
}

impl<B> Debug for LedgerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LedgerApi")
    }
}

impl<B> LedgerApi<B>
where B: LedgerQueries
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn commissions_for_order(&self, order_id: &OrderId) -> Result<Vec<CommissionEntry>, LedgerApiError> {
        self.db.commissions_for_order(order_id).await
    }

    /// The commission total stored on the order. `None` if there is no such order.
    pub async fn commission_total(&self, order_id: &OrderId) -> Result<Option<Money>, LedgerApiError> {
        self.db.commission_total_for_order(order_id).await
    }

    pub async fn commissions_for_affiliate(&self, affiliate: &ProfileId) -> Result<Vec<CommissionEntry>, LedgerApiError> {
        self.db.commissions_for_affiliate(affiliate).await
    }

    pub async fn point_events_for_beneficiary(&self, beneficiary: &ProfileId) -> Result<Vec<PointEvent>, LedgerApiError> {
        self.db.point_events_for_beneficiary(beneficiary).await
    }

    /// The sum of all points ever granted to the beneficiary
    pub async fn point_balance(&self, beneficiary: &ProfileId) -> Result<i64, LedgerApiError> {
        let events = self.db.point_events_for_beneficiary(beneficiary).await?;
        Ok(events.iter().fold(0, |total, e| total.saturating_add(e.points)))
    }

    pub async fn point_events_for_order(&self, order_id: &OrderId) -> Result<Vec<PointEvent>, LedgerApiError> {
        self.db.point_events_for_order(order_id).await
    }

    pub async fn reservations_for_order(&self, order_id: &OrderId) -> Result<Vec<Reservation>, LedgerApiError> {
        self.db.reservations_for_order(order_id).await
    }

    pub async fn user_leaderboard(
        &self,
        period: LeaderboardPeriod,
        shop_id: Option<ShopId>,
        limit: Option<u32>,
    ) -> Result<Vec<LeaderboardEntry>, LedgerApiError> {
        self.leaderboard(LeaderboardScope::Users, period, shop_id, limit).await
    }

    pub async fn team_leaderboard(
        &self,
        period: LeaderboardPeriod,
        shop_id: Option<ShopId>,
        limit: Option<u32>,
    ) -> Result<Vec<LeaderboardEntry>, LedgerApiError> {
        self.leaderboard(LeaderboardScope::Teams, period, shop_id, limit).await
    }

    async fn leaderboard(
        &self,
        scope: LeaderboardScope,
        period: LeaderboardPeriod,
        shop_id: Option<ShopId>,
        limit: Option<u32>,
    ) -> Result<Vec<LeaderboardEntry>, LedgerApiError> {
        if limit == Some(0) {
            return Err(LedgerApiError::QueryError("A leaderboard limit must be at least 1".into()));
        }
        let query = LeaderboardQuery { scope, period, shop_id, limit };
        trace!("📊️ Fetching {scope} leaderboard for {period}");
        self.db.leaderboard(query).await
    }
}

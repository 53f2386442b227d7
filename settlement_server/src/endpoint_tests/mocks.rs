use asp_common::Money;
use mockall::mock;
use settlement_engine::{
    db_types::{CommissionEntry, LeaderboardEntry, OrderId, PointEvent, ProfileId, Reservation},
    traits::{LeaderboardQuery, LedgerApiError, LedgerQueries},
};

mock! {
    pub LedgerStore {}
    impl LedgerQueries for LedgerStore {
        async fn commissions_for_order(&self, order_id: &OrderId) -> Result<Vec<CommissionEntry>, LedgerApiError>;
        async fn commission_total_for_order(&self, order_id: &OrderId) -> Result<Option<Money>, LedgerApiError>;
        async fn commissions_for_affiliate(&self, affiliate_id: &ProfileId) -> Result<Vec<CommissionEntry>, LedgerApiError>;
        async fn point_events_for_beneficiary(&self, beneficiary: &ProfileId) -> Result<Vec<PointEvent>, LedgerApiError>;
        async fn point_events_for_order(&self, order_id: &OrderId) -> Result<Vec<PointEvent>, LedgerApiError>;
        async fn reservations_for_order(&self, order_id: &OrderId) -> Result<Vec<Reservation>, LedgerApiError>;
        async fn leaderboard(&self, query: LeaderboardQuery) -> Result<Vec<LeaderboardEntry>, LedgerApiError>;
    }
}

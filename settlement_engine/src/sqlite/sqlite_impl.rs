//! `SqliteDatabase` is the SQLite implementation of the settlement engine backend.
//!
//! Every write method opens one transaction, composes the low-level functions in [`super::db`] inside it and commits
//! at the end. An early return through `?` drops the transaction, which rolls it back.
use std::fmt::Debug;

use asp_common::{CommissionRate, Money};
use log::*;
use sqlx::{migrate, SqliteConnection, SqlitePool};

use super::db::{catalog, commissions, db_url, leaderboard, new_pool, orders, points, reservations};
use crate::{
    db_types::{
        CatalogContext,
        CommissionEntry,
        CommissionStatus,
        LeaderboardEntry,
        Merchant,
        NewOrder,
        NewStockUnit,
        Order,
        OrderId,
        OrderLine,
        OrderLineId,
        PaymentStatus,
        PointEvent,
        Product,
        ProductId,
        ProfileId,
        Reservation,
        StockUnit,
        StockUnitId,
        TeamId,
        Variant,
        VariantId,
    },
    helpers::PointRules,
    settlement_objects::{CommissionOutcome, OrderPaid, PointsOutcome, RefundOutcome, ReservationOutcome, SettlementOutcome},
    traits::{
        CatalogError,
        CatalogManagement,
        LeaderboardQuery,
        LedgerApiError,
        LedgerQueries,
        NewMerchant,
        NewProduct,
        NewVariant,
        OrderManagement,
        SettlementDatabase,
        SettlementError,
        ValidationError,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Connects to the database named by `ASP_DATABASE_URL`
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// The number of rows in the point ledger, across all beneficiaries
    pub async fn point_ledger_size(&self) -> Result<i64, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        points::count_point_events(&mut conn).await
    }
}

/// Claims the order row for the current transaction, failing if the order does not exist
async fn claim(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Order, SettlementError> {
    orders::claim_order(order_id, conn).await?.ok_or_else(|| SettlementError::OrderNotFound(order_id.clone()))
}

fn require_paid(order: &Order, action: &'static str) -> Result<(), SettlementError> {
    match order.payment_status {
        PaymentStatus::Paid => Ok(()),
        status => Err(SettlementError::InvalidPaymentState { order_id: order.order_id.clone(), status, action }),
    }
}

/// Applies a payment signal to a claimed order: checks the shop, fills in missing attribution and moves the order to
/// `Paid`. The row is only written if something changed.
async fn apply_payment(order: Order, event: &OrderPaid, conn: &mut SqliteConnection) -> Result<Order, SettlementError> {
    let order_id = &order.order_id;
    if order.shop_id != event.shop_id {
        return Err(ValidationError::ShopMismatch {
            order_id: order_id.clone(),
            expected: order.shop_id.clone(),
            received: event.shop_id.clone(),
        }
        .into());
    }
    match order.payment_status {
        PaymentStatus::Pending | PaymentStatus::Paid => {},
        status => {
            return Err(SettlementError::InvalidPaymentState { order_id: order_id.clone(), status, action: "settle" })
        },
    }
    let affiliate = orders::merge_attribution(
        order_id,
        "affiliate",
        order.affiliate_id.as_ref(),
        event.affiliate_profile_id.as_ref(),
    )?;
    let customer = orders::merge_attribution(
        order_id,
        "customer profile",
        order.customer_profile_id.as_ref(),
        event.customer_profile_id.as_ref(),
    )?;
    let session = orders::merge_attribution(
        order_id,
        "buyer session",
        order.buyer_session_id.as_ref(),
        event.buyer_session_id.as_ref(),
    )?;
    let unchanged = order.payment_status == PaymentStatus::Paid &&
        affiliate == order.affiliate_id &&
        customer == order.customer_profile_id &&
        session == order.buyer_session_id;
    if unchanged {
        return Ok(order);
    }
    let updated = orders::update_payment(
        order_id,
        affiliate.as_ref(),
        customer.as_ref(),
        session.as_ref(),
        PaymentStatus::Paid,
        conn,
    )
    .await?;
    debug!("🗃️ Order [{order_id}] is marked as paid");
    Ok(updated)
}

impl SettlementDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn settle_order(&self, event: &OrderPaid, rules: &PointRules) -> Result<SettlementOutcome, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let order = claim(&event.order_id, &mut tx).await?;
        let order = apply_payment(order, event, &mut tx).await?;
        let lines = orders::fetch_order_lines(&order.order_id, &mut tx).await?;
        trace!("🗃️ Settling order [{}] with {} lines", order.order_id, lines.len());
        let reservations = reservations::reserve_for_order(&order.order_id, &lines, &mut tx).await?;
        let commissions = commissions::write_commissions(&order, &lines, &mut tx).await?;
        let points = points::grant_points(&order, &lines, rules, &mut tx).await?;
        let (order, newly_settled) = match orders::mark_settled(&order.order_id, &mut tx).await? {
            Some(settled) => (settled, true),
            None => (claim(&order.order_id, &mut tx).await?, false),
        };
        tx.commit().await?;
        Ok(SettlementOutcome { order, newly_settled, reservations, commissions, points })
    }

    async fn write_commissions(&self, order_id: &OrderId) -> Result<CommissionOutcome, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let order = claim(order_id, &mut tx).await?;
        require_paid(&order, "write commissions for")?;
        let lines = orders::fetch_order_lines(order_id, &mut tx).await?;
        let outcome = commissions::write_commissions(&order, &lines, &mut tx).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn grant_points(&self, order_id: &OrderId, rules: &PointRules) -> Result<PointsOutcome, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let order = claim(order_id, &mut tx).await?;
        require_paid(&order, "grant points for")?;
        let lines = orders::fetch_order_lines(order_id, &mut tx).await?;
        let outcome = points::grant_points(&order, &lines, rules, &mut tx).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn reserve_inventory(&self, order_id: &OrderId) -> Result<ReservationOutcome, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let order = claim(order_id, &mut tx).await?;
        require_paid(&order, "reserve inventory for")?;
        let lines = orders::fetch_order_lines(order_id, &mut tx).await?;
        let outcome = reservations::reserve_for_order(order_id, &lines, &mut tx).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn refund_order(&self, order_id: &OrderId) -> Result<RefundOutcome, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let order = claim(order_id, &mut tx).await?;
        match order.payment_status {
            PaymentStatus::Refunded => {
                debug!("🗃️ Order [{order_id}] has already been refunded");
                return Ok(RefundOutcome { order, newly_refunded: false, released: vec![], cancelled_commissions: 0 });
            },
            PaymentStatus::Paid => {},
            status => return Err(SettlementError::InvalidPaymentState { order_id: order_id.clone(), status, action: "refund" }),
        }
        let released = reservations::release_all_for_order(order_id, &mut tx).await?;
        let cancelled_commissions = commissions::cancel_open_commissions(order_id, &mut tx).await?;
        let order = orders::update_payment_status(order_id, PaymentStatus::Refunded, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ Order [{order_id}] refunded. {} reservations released, {cancelled_commissions} commissions cancelled",
            released.len()
        );
        Ok(RefundOutcome { order, newly_refunded: true, released, cancelled_commissions })
    }

    async fn mark_payment_failed(&self, order_id: &OrderId) -> Result<Order, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let order = claim(order_id, &mut tx).await?;
        let order = match order.payment_status {
            PaymentStatus::Failed => order,
            PaymentStatus::Pending => orders::update_payment_status(order_id, PaymentStatus::Failed, &mut tx).await?,
            status => {
                return Err(SettlementError::InvalidPaymentState {
                    order_id: order_id.clone(),
                    status,
                    action: "mark as failed",
                })
            },
        };
        tx.commit().await?;
        Ok(order)
    }

    async fn update_commission_status(
        &self,
        order_line_id: &OrderLineId,
        status: CommissionStatus,
    ) -> Result<CommissionEntry, SettlementError> {
        let mut tx = self.pool.begin().await?;
        orders::claim_order_of_line(order_line_id, &mut tx)
            .await?
            .ok_or_else(|| SettlementError::CommissionNotFound(order_line_id.clone()))?;
        let entry = commissions::update_commission_status(order_line_id, status, &mut tx).await?;
        tx.commit().await?;
        Ok(entry)
    }

    async fn close(&mut self) -> Result<(), SettlementError> {
        self.pool.close().await;
        Ok(())
    }
}

/// Claims the order that owns the line, before the line is modified. Lines of failed or refunded orders are frozen.
async fn claim_editable_line(line_id: &OrderLineId, conn: &mut SqliteConnection) -> Result<Order, SettlementError> {
    let order = orders::claim_order_of_line(line_id, conn)
        .await?
        .ok_or_else(|| SettlementError::OrderLineNotFound(line_id.clone()))?;
    match order.payment_status {
        PaymentStatus::Pending | PaymentStatus::Paid => Ok(order),
        status => Err(SettlementError::InvalidPaymentState { order_id: order.order_id, status, action: "modify" }),
    }
}

impl OrderManagement for SqliteDatabase {
    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), SettlementError> {
        let mut tx = self.pool.begin().await?;
        let result = orders::idempotent_insert(order, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_lines(&self, order_id: &OrderId) -> Result<Vec<OrderLine>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let lines = orders::fetch_order_lines(order_id, &mut conn).await?;
        Ok(lines)
    }

    async fn assign_stock_unit(
        &self,
        line_id: &OrderLineId,
        stock_unit_id: Option<StockUnitId>,
    ) -> Result<OrderLine, SettlementError> {
        let mut tx = self.pool.begin().await?;
        claim_editable_line(line_id, &mut tx).await?;
        let line = orders::set_line_stock_unit(line_id, stock_unit_id.as_ref(), &mut tx)
            .await?
            .ok_or_else(|| SettlementError::OrderLineNotFound(line_id.clone()))?;
        tx.commit().await?;
        Ok(line)
    }

    async fn update_line_quantity(&self, line_id: &OrderLineId, quantity: i64) -> Result<OrderLine, SettlementError> {
        if quantity <= 0 {
            return Err(ValidationError::NonPositiveQuantity { line_id: line_id.clone(), quantity }.into());
        }
        let mut tx = self.pool.begin().await?;
        claim_editable_line(line_id, &mut tx).await?;
        let line = orders::set_line_quantity(line_id, quantity, &mut tx)
            .await?
            .ok_or_else(|| SettlementError::OrderLineNotFound(line_id.clone()))?;
        tx.commit().await?;
        Ok(line)
    }

    async fn update_line_commission_override(
        &self,
        line_id: &OrderLineId,
        rate: Option<CommissionRate>,
    ) -> Result<OrderLine, SettlementError> {
        let mut tx = self.pool.begin().await?;
        claim_editable_line(line_id, &mut tx).await?;
        let line = orders::set_line_commission_override(line_id, rate, &mut tx)
            .await?
            .ok_or_else(|| SettlementError::OrderLineNotFound(line_id.clone()))?;
        tx.commit().await?;
        Ok(line)
    }
}

impl CatalogManagement for SqliteDatabase {
    async fn upsert_merchant(&self, merchant: NewMerchant) -> Result<Merchant, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        let merchant = catalog::upsert_merchant(merchant, &mut conn).await?;
        Ok(merchant)
    }

    async fn upsert_product(&self, product: NewProduct) -> Result<Product, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        let product = catalog::upsert_product(product, &mut conn).await?;
        Ok(product)
    }

    async fn upsert_variant(&self, variant: NewVariant) -> Result<Variant, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        catalog::upsert_variant(variant, &mut conn).await
    }

    async fn upsert_stock_unit(&self, unit: NewStockUnit) -> Result<StockUnit, CatalogError> {
        let mut tx = self.pool.begin().await?;
        let unit = catalog::upsert_stock_unit(unit, &mut tx).await?;
        tx.commit().await?;
        Ok(unit)
    }

    async fn restock(&self, stock_unit_id: &StockUnitId, quantity: i64) -> Result<StockUnit, CatalogError> {
        let mut tx = self.pool.begin().await?;
        let unit = catalog::restock(stock_unit_id, quantity, &mut tx).await?;
        tx.commit().await?;
        Ok(unit)
    }

    async fn assign_team(&self, profile_id: &ProfileId, team_id: Option<TeamId>) -> Result<(), CatalogError> {
        let mut conn = self.pool.acquire().await?;
        catalog::assign_team(profile_id, team_id.as_ref(), &mut conn).await?;
        Ok(())
    }

    async fn fetch_catalog_context(&self, product_id: &ProductId) -> Result<CatalogContext, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        let context = catalog::fetch_catalog_context(product_id, &mut conn).await?;
        Ok(context)
    }

    async fn fetch_stock_unit(&self, stock_unit_id: &StockUnitId) -> Result<Option<StockUnit>, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        let unit = catalog::fetch_stock_unit(stock_unit_id, &mut conn).await?;
        Ok(unit)
    }

    async fn fetch_variant(&self, variant_id: &VariantId) -> Result<Option<Variant>, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        let variant = catalog::fetch_variant(variant_id, &mut conn).await?;
        Ok(variant)
    }
}

impl LedgerQueries for SqliteDatabase {
    async fn commissions_for_order(&self, order_id: &OrderId) -> Result<Vec<CommissionEntry>, LedgerApiError> {
        let mut conn = self.pool.acquire().await?;
        let entries = commissions::fetch_commissions_for_order(order_id, &mut conn).await?;
        Ok(entries)
    }

    async fn commission_total_for_order(&self, order_id: &OrderId) -> Result<Option<Money>, LedgerApiError> {
        let mut conn = self.pool.acquire().await?;
        let total = orders::fetch_commission_total(order_id, &mut conn).await?;
        Ok(total)
    }

    async fn commissions_for_affiliate(&self, affiliate_id: &ProfileId) -> Result<Vec<CommissionEntry>, LedgerApiError> {
        let mut conn = self.pool.acquire().await?;
        let entries = commissions::fetch_commissions_for_affiliate(affiliate_id, &mut conn).await?;
        Ok(entries)
    }

    async fn point_events_for_beneficiary(&self, beneficiary: &ProfileId) -> Result<Vec<PointEvent>, LedgerApiError> {
        let mut conn = self.pool.acquire().await?;
        let events = points::fetch_point_events_for_beneficiary(beneficiary, &mut conn).await?;
        Ok(events)
    }

    async fn point_events_for_order(&self, order_id: &OrderId) -> Result<Vec<PointEvent>, LedgerApiError> {
        let mut conn = self.pool.acquire().await?;
        let events = points::fetch_point_events_for_order(order_id, &mut conn).await?;
        Ok(events)
    }

    async fn reservations_for_order(&self, order_id: &OrderId) -> Result<Vec<Reservation>, LedgerApiError> {
        let mut conn = self.pool.acquire().await?;
        let reservations = reservations::fetch_reservations_for_order(order_id, &mut conn).await?;
        Ok(reservations)
    }

    async fn leaderboard(&self, query: LeaderboardQuery) -> Result<Vec<LeaderboardEntry>, LedgerApiError> {
        let mut conn = self.pool.acquire().await?;
        let board = leaderboard::leaderboard(query, &mut conn).await?;
        Ok(board)
    }
}

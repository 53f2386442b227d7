use asp_common::CommissionRate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{
    CatalogContext,
    Merchant,
    MerchantId,
    NewStockUnit,
    Product,
    ProductId,
    ProfileId,
    StockUnit,
    StockUnitId,
    TeamId,
    Variant,
    VariantId,
};

#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Stock unit {0} does not exist")]
    StockUnitNotFound(StockUnitId),
    #[error("Variant {0} does not exist")]
    VariantNotFound(VariantId),
    #[error("Invalid inventory count: {0}")]
    InvalidCount(String),
    #[error("Stock unit {stock_unit_id} has {reserved} items reserved and cannot move to another variant")]
    ReservedUnitRelink { stock_unit_id: StockUnitId, reserved: i64 },
}

impl From<sqlx::Error> for CatalogError {
    fn from(e: sqlx::Error) -> Self {
        CatalogError::DatabaseError(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMerchant {
    pub merchant_id: MerchantId,
    pub default_commission_rate: Option<CommissionRate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub product_id: ProductId,
    pub merchant_id: Option<MerchantId>,
    pub commission_rate: Option<CommissionRate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVariant {
    pub variant_id: VariantId,
    pub product_id: Option<ProductId>,
    pub available: i64,
}

/// The catalog data the settlement pipeline reads. Reserved quantities are owned by the reservation manager. Upserting
/// an existing stock unit or variant treats its count as the stock on hand and only adjusts `available` by the
/// difference, never touching what is reserved.
#[allow(async_fn_in_trait)]
pub trait CatalogManagement {
    async fn upsert_merchant(&self, merchant: NewMerchant) -> Result<Merchant, CatalogError>;

    async fn upsert_product(&self, product: NewProduct) -> Result<Product, CatalogError>;

    async fn upsert_variant(&self, variant: NewVariant) -> Result<Variant, CatalogError>;

    async fn upsert_stock_unit(&self, unit: NewStockUnit) -> Result<StockUnit, CatalogError>;

    /// Adds `quantity` to the available count of the stock unit and its variant
    async fn restock(&self, stock_unit_id: &StockUnitId, quantity: i64) -> Result<StockUnit, CatalogError>;

    async fn assign_team(&self, profile_id: &ProfileId, team_id: Option<TeamId>) -> Result<(), CatalogError>;

    async fn fetch_catalog_context(&self, product_id: &ProductId) -> Result<CatalogContext, CatalogError>;

    async fn fetch_stock_unit(&self, stock_unit_id: &StockUnitId) -> Result<Option<StockUnit>, CatalogError>;

    async fn fetch_variant(&self, variant_id: &VariantId) -> Result<Option<Variant>, CatalogError>;
}

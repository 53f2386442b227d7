use log::debug;
use sqlx::SqliteConnection;

use super::{one_row, optional_row};
use crate::{
    db_types::{CatalogContext, Merchant, NewStockUnit, Product, ProductId, ProfileId, StockUnit, StockUnitId, TeamId, Variant, VariantId},
    traits::{CatalogError, NewMerchant, NewProduct, NewVariant},
};

/// The product's own rate and its merchant's default rate. Unknown products and merchants yield empty rates.
pub async fn fetch_catalog_context(
    product_id: &ProductId,
    conn: &mut SqliteConnection,
) -> Result<CatalogContext, sqlx::Error> {
    let query = sqlx::query_as(
        r#"
            SELECT
                products.commission_rate AS product_rate,
                merchants.default_commission_rate AS merchant_default_rate
            FROM products LEFT JOIN merchants ON products.merchant_id = merchants.merchant_id
            WHERE products.product_id = $1
        "#,
    )
    .bind(product_id.as_str());
    let context: Option<CatalogContext> = optional_row(query, conn).await?;
    Ok(context.unwrap_or_default())
}

pub async fn upsert_merchant(merchant: NewMerchant, conn: &mut SqliteConnection) -> Result<Merchant, sqlx::Error> {
    let query = sqlx::query_as(
        r#"
            INSERT INTO merchants (merchant_id, default_commission_rate) VALUES ($1, $2)
            ON CONFLICT (merchant_id) DO UPDATE SET
                default_commission_rate = excluded.default_commission_rate,
                updated_at = CURRENT_TIMESTAMP
            RETURNING *;
        "#,
    )
    .bind(merchant.merchant_id)
    .bind(merchant.default_commission_rate);
    one_row(query, conn).await
}

pub async fn upsert_product(product: NewProduct, conn: &mut SqliteConnection) -> Result<Product, sqlx::Error> {
    let query = sqlx::query_as(
        r#"
            INSERT INTO products (product_id, merchant_id, commission_rate) VALUES ($1, $2, $3)
            ON CONFLICT (product_id) DO UPDATE SET
                merchant_id = excluded.merchant_id,
                commission_rate = excluded.commission_rate,
                updated_at = CURRENT_TIMESTAMP
            RETURNING *;
        "#,
    )
    .bind(product.product_id)
    .bind(product.merchant_id)
    .bind(product.commission_rate);
    one_row(query, conn).await
}

/// Creates the variant. For an existing variant, `available` is read as the stock on hand: whatever is reserved stays
/// reserved and the remainder becomes available. Counts below the reserved quantity are refused.
pub async fn upsert_variant(variant: NewVariant, conn: &mut SqliteConnection) -> Result<Variant, CatalogError> {
    if variant.available < 0 {
        return Err(CatalogError::InvalidCount(format!("Variant {} cannot have negative stock", variant.variant_id)));
    }
    let variant_id = variant.variant_id.clone();
    let on_hand = variant.available;
    let query = sqlx::query_as(
        r#"
            INSERT INTO variants (variant_id, product_id, available) VALUES ($1, $2, $3)
            ON CONFLICT (variant_id) DO UPDATE SET
                product_id = excluded.product_id,
                available = excluded.available - variants.reserved,
                updated_at = CURRENT_TIMESTAMP
            WHERE excluded.available >= variants.reserved
            RETURNING *;
        "#,
    )
    .bind(variant.variant_id)
    .bind(variant.product_id)
    .bind(variant.available);
    let variant: Option<Variant> = optional_row(query, conn).await?;
    variant.ok_or_else(|| {
        CatalogError::InvalidCount(format!("Variant {variant_id} has more than {on_hand} items reserved"))
    })
}

/// Creates the stock unit, or brings an existing one in line with the catalog.
///
/// For an existing unit, `available` is read as the stock on hand (available plus reserved). Only the difference is
/// applied, to the unit and to its variant, so replaying the same catalog entry changes nothing. A unit cannot be
/// cut below what is already reserved from it, and it cannot move to another variant while it holds reservations.
/// Creating or relinking a unit leaves variant counters alone.
///
/// The first statement is a write, so a deferred transaction takes the write lock before anything is read.
pub async fn upsert_stock_unit(unit: NewStockUnit, conn: &mut SqliteConnection) -> Result<StockUnit, CatalogError> {
    if unit.available < 0 {
        return Err(CatalogError::InvalidCount(format!("Stock unit {} cannot have negative stock", unit.stock_unit_id)));
    }
    let NewStockUnit { stock_unit_id, variant_id, available: on_hand } = unit;
    let query = sqlx::query_as(
        r#"
            INSERT INTO stock_units (stock_unit_id, variant_id, available) VALUES ($1, $2, $3)
            ON CONFLICT (stock_unit_id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(stock_unit_id.as_str())
    .bind(variant_id.as_ref().map(|v| v.as_str()))
    .bind(on_hand);
    let created: Option<StockUnit> = optional_row(query, &mut *conn).await?;
    if let Some(unit) = created {
        debug!("🗃️ Stock unit {stock_unit_id} created with {on_hand} items");
        return Ok(unit);
    }

    let current = fetch_stock_unit(&stock_unit_id, &mut *conn)
        .await?
        .ok_or_else(|| CatalogError::StockUnitNotFound(stock_unit_id.clone()))?;
    if on_hand < current.reserved {
        return Err(CatalogError::InvalidCount(format!(
            "Stock unit {stock_unit_id} has {} items reserved and cannot be set to {on_hand}",
            current.reserved
        )));
    }
    if current.variant_id != variant_id && current.reserved > 0 {
        return Err(CatalogError::ReservedUnitRelink { stock_unit_id, reserved: current.reserved });
    }

    let delta = on_hand - (current.available + current.reserved);
    let query = sqlx::query_as(
        r#"
            UPDATE stock_units SET
                variant_id = $2,
                available = available + $3,
                updated_at = CURRENT_TIMESTAMP
            WHERE stock_unit_id = $1
            RETURNING *;
        "#,
    )
    .bind(stock_unit_id.as_str())
    .bind(variant_id.as_ref().map(|v| v.as_str()))
    .bind(delta);
    let unit: StockUnit = one_row(query, &mut *conn).await?;
    if delta != 0 {
        if let Some(variant_id) = &unit.variant_id {
            adjust_variant_available(variant_id, delta, conn).await?;
        }
        debug!("🗃️ Stock unit {stock_unit_id} adjusted by {delta}. {} now available", unit.available);
    }
    Ok(unit)
}

/// Adds stock to a unit and to the variant it belongs to
pub async fn restock(
    stock_unit_id: &StockUnitId,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<StockUnit, CatalogError> {
    if quantity <= 0 {
        return Err(CatalogError::InvalidCount(format!("Cannot restock {stock_unit_id} with {quantity} items")));
    }
    let query = sqlx::query_as(
        r#"
            UPDATE stock_units SET available = available + $2, updated_at = CURRENT_TIMESTAMP
            WHERE stock_unit_id = $1
            RETURNING *;
        "#,
    )
    .bind(stock_unit_id.as_str())
    .bind(quantity);
    let unit: StockUnit = optional_row(query, &mut *conn)
        .await?
        .ok_or_else(|| CatalogError::StockUnitNotFound(stock_unit_id.clone()))?;
    if let Some(variant_id) = &unit.variant_id {
        adjust_variant_available(variant_id, quantity, conn).await?;
    }
    debug!("🗃️ Restocked {stock_unit_id} with {quantity} items. {} now available", unit.available);
    Ok(unit)
}

/// Variant counters never drop below zero, even if the variant was upserted with less stock than its units hold.
async fn adjust_variant_available(
    variant_id: &VariantId,
    delta: i64,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            UPDATE variants SET available = MAX(0, available + $2), updated_at = CURRENT_TIMESTAMP
            WHERE variant_id = $1
        "#,
    )
    .bind(variant_id.as_str())
    .bind(delta)
    .execute(conn)
    .await?;
    Ok(())
}

/// Puts the profile in the team, or removes it from whatever team it was in when `team_id` is `None`
pub async fn assign_team(
    profile_id: &ProfileId,
    team_id: Option<&TeamId>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    match team_id {
        Some(team) => {
            sqlx::query(
                r#"
                    INSERT INTO team_memberships (profile_id, team_id) VALUES ($1, $2)
                    ON CONFLICT (profile_id) DO UPDATE SET team_id = excluded.team_id;
                "#,
            )
            .bind(profile_id.as_str())
            .bind(team.as_str())
            .execute(conn)
            .await?;
        },
        None => {
            sqlx::query("DELETE FROM team_memberships WHERE profile_id = $1")
                .bind(profile_id.as_str())
                .execute(conn)
                .await?;
        },
    }
    Ok(())
}

pub async fn fetch_stock_unit(
    stock_unit_id: &StockUnitId,
    conn: &mut SqliteConnection,
) -> Result<Option<StockUnit>, sqlx::Error> {
    let query = sqlx::query_as("SELECT * FROM stock_units WHERE stock_unit_id = $1").bind(stock_unit_id.as_str());
    optional_row(query, conn).await
}

pub async fn fetch_variant(variant_id: &VariantId, conn: &mut SqliteConnection) -> Result<Option<Variant>, sqlx::Error> {
    let query = sqlx::query_as("SELECT * FROM variants WHERE variant_id = $1").bind(variant_id.as_str());
    optional_row(query, conn).await
}

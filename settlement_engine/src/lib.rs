//! Affiliate Settlement Engine
//!
//! When the payment layer marks an order as paid, the settlement engine derives three mutually consistent outcomes
//! from it, exactly once:
//! 1. a commission ledger entry per order line, with the rate resolved through a precedence chain (line override,
//!    product rate, merchant default), and the order's aggregate commission total;
//! 2. deduplicated loyalty point events (order success, item sold, new customer bonus) that feed monthly user and
//!    team leaderboards;
//! 3. inventory reservations that consolidate the order's lines per stock unit and move stock counters by deltas
//!    only, failing the whole settlement on insufficient stock.
//!
//! The library is divided into:
//! * the data types in [`db_types`] and the pure building blocks in [`helpers`],
//! * the backend contracts in [`traits`], implemented for SQLite by [`SqliteDatabase`],
//! * the public API: [`SettlementApi`] (the orchestrator) and [`LedgerApi`] (the read side),
//! * the [`events`] hook system, which publishes settlement outcomes to subscribers.
mod api;
#[cfg(feature = "sqlite")]
mod sqlite;

pub mod db_types;
pub mod events;
pub mod helpers;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use api::{ledger_api::LedgerApi, settlement_api::SettlementApi, settlement_objects};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{
    CatalogError,
    CatalogManagement,
    LedgerApiError,
    LedgerQueries,
    OrderManagement,
    SettlementDatabase,
    SettlementError,
    ValidationError,
};

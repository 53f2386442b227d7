//! # Backend contracts
//!
//! The traits in this module describe what a database backend must provide to drive the settlement pipeline.
//!
//! * [`SettlementDatabase`] is the write side. Each method runs as a single atomic unit of work: settling a paid
//!   order (commissions, points and reservations together), standalone reruns of each writer, refunds, payment
//!   failures and commission status changes.
//! * [`OrderManagement`] ingests orders from checkout and maintains their lines before settlement.
//! * [`CatalogManagement`] keeps the catalog context (merchants, products, variants, stock units, teams) that the
//!   settlement pipeline reads.
//! * [`LedgerQueries`] are the read-only queries consumed by dashboards, including the leaderboards.
mod catalog_management;
mod ledger_queries;
mod order_management;
mod settlement_database;

pub use catalog_management::{CatalogError, CatalogManagement, NewMerchant, NewProduct, NewVariant};
pub use ledger_queries::{LedgerApiError, LedgerQueries, LeaderboardQuery};
pub use order_management::OrderManagement;
pub use settlement_database::{SettlementDatabase, SettlementError, ValidationError};

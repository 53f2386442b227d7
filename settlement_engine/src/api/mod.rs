//! # Settlement engine public API
//!
//! * [`settlement_api`] is the settlement orchestrator. The payment layer calls it when an order is marked paid,
//!   refunded or failed, and it notifies the event hooks of the outcome.
//! * [`ledger_api`] exposes the read side: commission and point ledgers, reservations and the monthly leaderboards.
//!
//! Both are created by supplying a backend that implements the traits in [`crate::traits`]:
//!
//! ```rust,ignore
//! use settlement_engine::{LedgerApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/settlement.db", 5).await?;
//! let api = LedgerApi::new(db);
//! let board = api.user_leaderboard(LeaderboardPeriod::current(), None, Some(10)).await?;
//! ```
pub mod ledger_api;
pub mod settlement_api;
pub mod settlement_objects;

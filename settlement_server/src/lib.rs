//! # Settlement server
//! A thin HTTP front end for the settlement engine. It is responsible for:
//! * Receiving orders written at checkout.
//! * Listening for payment webhooks ("order paid", "order refunded", "payment failed") and handing them to the
//!   settlement orchestrator.
//! * Serving read-only views of the commission and point ledgers, and the monthly leaderboards.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/webhook/order_paid`, `/webhook/order_refunded`, `/webhook/payment_failed`: Payment webhooks. These are HMAC
//!   checked, and optionally restricted to a whitelist of peer addresses.
//! * `/orders`: Order ingestion.
//! * `/orders/{order_id}/commissions`, `/points/{beneficiary}`, `/leaderboard/users`, `/leaderboard/teams`: Ledger
//!   reads.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod middleware;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;

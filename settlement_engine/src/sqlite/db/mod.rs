//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interactions are simple functions (rather than stateful structs) that accept a `&mut SqliteConnection`
//! argument. Callers can obtain a connection from a pool, or open a transaction and pass `&mut tx` to compose several
//! of them into one atomic unit of work.
use std::{env, str::FromStr, time::Duration};

use log::info;
use sqlx::{
    query::{QueryAs, QueryScalar},
    sqlite::{SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
    Error as SqlxError,
    FromRow,
    Sqlite,
    SqliteConnection,
    SqlitePool,
};

pub mod catalog;
pub mod commissions;
pub mod leaderboard;
pub mod orders;
pub mod points;
pub mod reservations;

const SQLITE_DB_URL: &str = "sqlite://data/settlement.db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn db_url() -> String {
    let result = env::var("ASP_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ ASP_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

/// Creates a connection pool. Writers wait on each other (busy timeout) rather than failing, WAL lets readers proceed
/// alongside a writer, and foreign keys are enforced.
pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}

/// Runs the query to completion and returns its first row, if any.
///
/// Single-row reads go through here (or [`one_row`] and [`one_scalar`]) instead of `fetch_optional`/`fetch_one`. The
/// statement is always stepped to the end, so no implicit transaction, and no WAL snapshot, outlives the call on a
/// pooled connection.
pub async fn optional_row<'q, O>(
    query: QueryAs<'q, Sqlite, O, SqliteArguments<'q>>,
    conn: &mut SqliteConnection,
) -> Result<Option<O>, SqlxError>
where
    O: Send + Unpin + for<'r> FromRow<'r, SqliteRow>,
{
    let rows = query.fetch_all(conn).await?;
    Ok(rows.into_iter().next())
}

/// Like [`optional_row`], but a missing row is [`SqlxError::RowNotFound`]
pub async fn one_row<'q, O>(
    query: QueryAs<'q, Sqlite, O, SqliteArguments<'q>>,
    conn: &mut SqliteConnection,
) -> Result<O, SqlxError>
where
    O: Send + Unpin + for<'r> FromRow<'r, SqliteRow>,
{
    optional_row(query, conn).await?.ok_or(SqlxError::RowNotFound)
}

/// The scalar counterpart of [`one_row`]
pub async fn one_scalar<'q, O>(
    query: QueryScalar<'q, Sqlite, O, SqliteArguments<'q>>,
    conn: &mut SqliteConnection,
) -> Result<O, SqlxError>
where
    O: Send + Unpin,
    (O,): Send + Unpin + for<'r> FromRow<'r, SqliteRow>,
{
    let values = query.fetch_all(conn).await?;
    values.into_iter().next().ok_or(SqlxError::RowNotFound)
}

//! Monthly leaderboards, computed on read from the point ledger.
use log::trace;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db_types::{LeaderboardEntry, LeaderboardScope},
    traits::LeaderboardQuery,
};

pub async fn leaderboard(query: LeaderboardQuery, conn: &mut SqliteConnection) -> Result<Vec<LeaderboardEntry>, sqlx::Error> {
    let mut builder: QueryBuilder<Sqlite> = match query.scope {
        LeaderboardScope::Users => QueryBuilder::new(
            r#"
            SELECT beneficiary_id AS subject_id, SUM(points) AS total
            FROM point_events
            "#,
        ),
        LeaderboardScope::Teams => QueryBuilder::new(
            r#"
            SELECT team_memberships.team_id AS subject_id, SUM(point_events.points) AS total
            FROM point_events JOIN team_memberships ON point_events.beneficiary_id = team_memberships.profile_id
            "#,
        ),
    };
    builder.push(" WHERE julianday(point_events.created_at) >= julianday(");
    builder.push_bind(query.period.start());
    builder.push(") AND julianday(point_events.created_at) < julianday(");
    builder.push_bind(query.period.end());
    builder.push(")");
    if let Some(shop_id) = query.shop_id {
        builder.push(" AND point_events.shop_id = ");
        builder.push_bind(shop_id.0);
    }
    builder.push(" GROUP BY subject_id ORDER BY total DESC, subject_id ASC");
    if let Some(limit) = query.limit {
        builder.push(" LIMIT ");
        builder.push_bind(i64::from(limit));
    }
    trace!("🗃️ Executing query: {}", builder.sql());
    let rows = builder.build_query_as::<(String, i64)>().fetch_all(conn).await?;
    Ok(rank(rows))
}

/// Assigns competition ranks ("1224") to rows already sorted by points, descending
pub fn rank(rows: Vec<(String, i64)>) -> Vec<LeaderboardEntry> {
    let mut result: Vec<LeaderboardEntry> = Vec::with_capacity(rows.len());
    for (i, (subject_id, points)) in rows.into_iter().enumerate() {
        let rank = match result.last() {
            Some(prev) if prev.points == points => prev.rank,
            _ => i as i64 + 1,
        };
        result.push(LeaderboardEntry { rank, subject_id, points });
    }
    result
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ties_share_a_rank() {
        let rows = vec![("a".to_string(), 50), ("b".to_string(), 30), ("c".to_string(), 30), ("d".to_string(), 10)];
        let ranks = rank(rows).into_iter().map(|e| e.rank).collect::<Vec<_>>();
        assert_eq!(ranks, vec![1, 2, 2, 4]);
    }

    #[test]
    fn empty_board() {
        assert!(rank(vec![]).is_empty());
    }
}

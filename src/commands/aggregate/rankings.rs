use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use rusqlite::{Connection, params};
use tracing::info;

use crate::cli::RankingPeriod;
use crate::util::now_utc_string;

use super::metrics::MIN_MENTION_CONFIDENCE;

pub const POSITIVE_SENTIMENT: f64 = 0.3;
pub const NEGATIVE_SENTIMENT: f64 = -0.3;

/// `(period_start, period_end)` as `YYYY-MM-DD`, ending on `today`.
pub fn period_bounds(period: RankingPeriod, today: NaiveDate) -> (String, String) {
    let start = today
        .checked_sub_days(Days::new(period.days() as u64))
        .unwrap_or(NaiveDate::MIN);
    (
        start.format("%Y-%m-%d").to_string(),
        today.format("%Y-%m-%d").to_string(),
    )
}

/// Upserts one ranking row per flavor mentioned in the window, then ranks the
/// period's rows by mention count. Returns the number of rows upserted.
pub fn compute_flavor_rankings(
    connection: &Connection,
    period: RankingPeriod,
    today: NaiveDate,
) -> Result<usize> {
    let (period_start, period_end) = period_bounds(period, today);
    info!(period = period.as_str(), %period_start, %period_end, "computing flavor rankings");

    let tx = connection.unchecked_transaction()?;

    let upserted = tx
        .execute(
            "
            INSERT INTO flavor_rankings(
              flavor_id, period_start, period_end, period_type, mention_count,
              unique_products, avg_sentiment, positive_mentions, negative_mentions, computed_at
            )
            SELECT
              fe.flavor_term_id,
              ?1,
              ?2,
              ?3,
              COUNT(*),
              COUNT(DISTINCT pr.post_id),
              AVG(fe.sentiment),
              SUM(CASE WHEN fe.sentiment > ?5 THEN 1 ELSE 0 END),
              SUM(CASE WHEN fe.sentiment < ?6 THEN 1 ELSE 0 END),
              ?7
            FROM flavor_extractions fe
            JOIN processed_reviews pr ON fe.processed_review_id = pr.id
            WHERE fe.created_at >= ?1
              AND fe.confidence_score > ?4
            GROUP BY fe.flavor_term_id
            ON CONFLICT(flavor_id, period_start, period_end, period_type) DO UPDATE SET
              mention_count=excluded.mention_count,
              unique_products=excluded.unique_products,
              avg_sentiment=excluded.avg_sentiment,
              positive_mentions=excluded.positive_mentions,
              negative_mentions=excluded.negative_mentions,
              computed_at=excluded.computed_at
            ",
            params![
                period_start,
                period_end,
                period.as_str(),
                MIN_MENTION_CONFIDENCE,
                POSITIVE_SENTIMENT,
                NEGATIVE_SENTIMENT,
                now_utc_string(),
            ],
        )
        .with_context(|| format!("failed to upsert {} flavor rankings", period.as_str()))?;

    tx.execute(
        "
        UPDATE flavor_rankings
        SET popularity_rank = ranked.position
        FROM (
          SELECT id, RANK() OVER (ORDER BY mention_count DESC) AS position
          FROM flavor_rankings
          WHERE period_type = ?1 AND period_end = ?2
        ) AS ranked
        WHERE flavor_rankings.id = ranked.id
        ",
        params![period.as_str(), period_end],
    )
    .with_context(|| format!("failed to rank {} flavor rankings", period.as_str()))?;

    tx.commit()?;
    info!(period = period.as_str(), upserted, "computed flavor rankings");
    Ok(upserted)
}

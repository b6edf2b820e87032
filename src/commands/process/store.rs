use std::collections::HashSet;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use crate::model::Extraction;
use crate::nlp::PostAnalysis;
use crate::util::now_utc_string;

pub const POSITIVE_THRESHOLD: f64 = 0.3;
pub const NEGATIVE_THRESHOLD: f64 = -0.3;

#[derive(Debug, Clone)]
pub struct RawPostRow {
    pub id: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingStats {
    pub total_processed: i64,
    pub avg_sentiment: Option<f64>,
    pub positive_reviews: i64,
    pub negative_reviews: i64,
}

/// Newest raw posts without a processed review, minus the ids in `exclude`.
pub fn load_unprocessed_posts(
    connection: &Connection,
    limit: usize,
    exclude: &HashSet<String>,
) -> Result<Vec<RawPostRow>> {
    let mut statement = connection.prepare(
        "
        SELECT rp.id, COALESCE(rp.title, ''), COALESCE(rp.body, '')
        FROM raw_posts rp
        LEFT JOIN processed_reviews pr ON rp.id = pr.post_id
        WHERE pr.id IS NULL
        ORDER BY rp.scraped_at DESC, rp.id ASC
        LIMIT ?1
        ",
    )?;

    let fetch_limit = (limit + exclude.len()) as i64;
    let mut rows = statement.query([fetch_limit])?;
    let mut out = Vec::<RawPostRow>::new();

    while let Some(row) = rows.next()? {
        let id: String = row.get(0)?;
        if exclude.contains(&id) {
            continue;
        }
        out.push(RawPostRow {
            id,
            title: row.get(1)?,
            body: row.get(2)?,
        });
        if out.len() == limit {
            break;
        }
    }

    Ok(out)
}

pub fn upsert_processed_review(
    connection: &Connection,
    post_id: &str,
    analysis: &PostAnalysis,
) -> Result<i64> {
    connection
        .query_row(
            "
            INSERT INTO processed_reviews(post_id, cleaned_text, sentiment_score, language, word_count, processed_at)
            VALUES(?1, ?2, ?3, 'en', ?4, ?5)
            ON CONFLICT(post_id) DO UPDATE SET
              cleaned_text=excluded.cleaned_text,
              sentiment_score=excluded.sentiment_score,
              word_count=excluded.word_count,
              processed_at=excluded.processed_at,
              linked_at=NULL
            RETURNING id
            ",
            params![
                post_id,
                analysis.cleaned_text,
                analysis.sentiment_score,
                analysis.word_count as i64,
                now_utc_string(),
            ],
            |row| row.get(0),
        )
        .with_context(|| format!("failed to upsert processed review for post {post_id}"))
}

pub fn upsert_extraction(
    connection: &Connection,
    processed_review_id: i64,
    post_id: &str,
    extraction: &Extraction,
) -> Result<()> {
    connection
        .execute(
            "
            INSERT INTO nlp_extractions(
              processed_review_id, post_id, flavors, roasters, origins,
              brew_methods, process_methods, price, keywords
            )
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(processed_review_id) DO UPDATE SET
              flavors=excluded.flavors,
              roasters=excluded.roasters,
              origins=excluded.origins,
              brew_methods=excluded.brew_methods,
              process_methods=excluded.process_methods,
              price=excluded.price,
              keywords=excluded.keywords
            ",
            params![
                processed_review_id,
                post_id,
                serde_json::to_string(&extraction.flavors)?,
                serde_json::to_string(&extraction.roasters)?,
                serde_json::to_string(&extraction.origins)?,
                serde_json::to_string(&extraction.brew_methods)?,
                serde_json::to_string(&extraction.process_methods)?,
                extraction.price,
                serde_json::to_string(&extraction.keywords)?,
            ],
        )
        .with_context(|| format!("failed to store extraction for post {post_id}"))?;

    Ok(())
}

pub fn processing_stats(connection: &Connection) -> Result<ProcessingStats> {
    let stats = connection.query_row(
        "
        SELECT
          COUNT(*),
          AVG(sentiment_score),
          COALESCE(SUM(CASE WHEN sentiment_score > ?1 THEN 1 ELSE 0 END), 0),
          COALESCE(SUM(CASE WHEN sentiment_score < ?2 THEN 1 ELSE 0 END), 0)
        FROM processed_reviews
        ",
        params![POSITIVE_THRESHOLD, NEGATIVE_THRESHOLD],
        |row| {
            Ok(ProcessingStats {
                total_processed: row.get(0)?,
                avg_sentiment: row.get(1)?,
                positive_reviews: row.get(2)?,
                negative_reviews: row.get(3)?,
            })
        },
    )?;

    Ok(stats)
}

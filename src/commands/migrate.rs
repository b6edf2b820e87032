use std::io::{self, Write};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, params};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::cli::StoreArgs;
use crate::commands::manifest::write_stage_manifest;
use crate::db::{count_rows, open_database};

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct MigrationCounts {
    pub records: usize,
    pub migrated: usize,
    pub skipped: usize,
    pub errors: usize,
}

#[derive(Debug)]
struct LegacyReview {
    id: String,
    source: String,
    json: String,
    scraped_at: String,
}

pub fn run(args: StoreArgs) -> Result<()> {
    let started_ts = Utc::now();
    let mut connection = open_database(&args.resolved_db_path())?;

    let counts = migrate_raw_reviews(&mut connection)?;
    let total = count_rows(&connection, "raw_posts")?;

    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output, "\n=== Migration: raw_reviews -> raw_posts ===")?;
    writeln!(output, "Migrated: {}", counts.migrated)?;
    writeln!(output, "Skipped (already exist): {}", counts.skipped)?;
    writeln!(output, "Errors: {}", counts.errors)?;
    writeln!(output, "raw_posts now has {total} records")?;
    output.flush()?;

    write_stage_manifest(&args, "migrate", started_ts, counts, Vec::new())?;
    Ok(())
}

fn text_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Copies every legacy row into `raw_posts`; rows whose id already exists are skipped.
pub fn migrate_raw_reviews(connection: &mut Connection) -> Result<MigrationCounts> {
    let legacy = {
        let mut statement = connection
            .prepare("SELECT id, source, json, scraped_at FROM raw_reviews ORDER BY scraped_at ASC")?;
        statement
            .query_map([], |row| {
                Ok(LegacyReview {
                    id: row.get(0)?,
                    source: row.get(1)?,
                    json: row.get(2)?,
                    scraped_at: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to read raw_reviews")?
    };
    info!(records = legacy.len(), "migrating legacy raw reviews");

    let mut counts = MigrationCounts {
        records: legacy.len(),
        ..MigrationCounts::default()
    };

    let tx = connection.transaction()?;
    {
        let mut insert = tx.prepare(
            "
            INSERT INTO raw_posts(id, source, title, body, url, author, scraped_at, posted_at, metadata)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, NULL)
            ON CONFLICT(id) DO NOTHING
            ",
        )?;

        for record in &legacy {
            let data: Value = match serde_json::from_str(&record.json) {
                Ok(value) => value,
                Err(err) => {
                    warn!(id = %record.id, error = %err, "invalid legacy json");
                    counts.errors += 1;
                    continue;
                }
            };

            let result = insert.execute(params![
                record.id,
                record.source,
                text_field(&data, "title"),
                text_field(&data, "body"),
                text_field(&data, "url"),
                text_field(&data, "author"),
                record.scraped_at,
            ]);

            match result {
                Ok(0) => counts.skipped += 1,
                Ok(_) => {
                    counts.migrated += 1;
                    if counts.migrated % 50 == 0 {
                        info!(migrated = counts.migrated, "migration progress");
                    }
                }
                Err(err) => {
                    warn!(id = %record.id, error = %err, "failed to migrate record");
                    counts.errors += 1;
                }
            }
        }
    }
    tx.commit()?;

    info!(
        migrated = counts.migrated,
        skipped = counts.skipped,
        errors = counts.errors,
        "migration complete"
    );
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn legacy(connection: &Connection, id: &str, json: &str) {
        connection
            .execute(
                "INSERT INTO raw_reviews(id, source, json, scraped_at) VALUES(?1, 'reddit', ?2, '2026-01-01T00:00:00Z')",
                params![id, json],
            )
            .expect("legacy row");
    }

    #[test]
    fn migrates_new_rows_skips_existing_and_counts_bad_json() {
        let mut connection = open_in_memory().expect("schema");
        legacy(&connection, "a", r#"{"title":"Espresso help","body":"Sour shots","author":"bean"}"#);
        legacy(&connection, "b", r#"{"title":"Already here"}"#);
        legacy(&connection, "c", "not json");
        connection
            .execute(
                "INSERT INTO raw_posts(id, source, title, scraped_at) VALUES('b', 'reddit', 'kept', '2026-01-01T00:00:00Z')",
                [],
            )
            .expect("existing post");

        let counts = migrate_raw_reviews(&mut connection).expect("migration");
        assert_eq!(
            counts,
            MigrationCounts {
                records: 3,
                migrated: 1,
                skipped: 1,
                errors: 1,
            }
        );

        let (title, body, url): (String, String, Option<String>) = connection
            .query_row("SELECT title, body, url FROM raw_posts WHERE id = 'a'", [], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .expect("migrated row");
        assert_eq!(title, "Espresso help");
        assert_eq!(body, "Sour shots");
        assert_eq!(url.as_deref(), Some(""));

        let kept: String = connection
            .query_row("SELECT title FROM raw_posts WHERE id = 'b'", [], |row| row.get(0))
            .expect("existing row");
        assert_eq!(kept, "kept");
    }
}

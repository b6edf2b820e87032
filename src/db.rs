use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, params};
use tracing::info;

use crate::nlp::lexicon::FLAVOR_GROUPS;
use crate::util::{ensure_directory, now_utc_string};

pub const DB_SCHEMA_VERSION: &str = "0.3.0";

/// Tables every pipeline stage expects after `ensure_schema`.
pub const REQUIRED_TABLES: &[&str] = &[
    "raw_posts",
    "processed_reviews",
    "nlp_extractions",
    "flavor_terms",
    "entities",
    "origins",
    "coffee_products",
    "flavor_extractions",
    "coffee_mentions",
    "product_reviews",
    "flavor_rankings",
];

pub fn open_database(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        ensure_directory(parent)?;
    }

    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    configure_connection(&connection)?;
    ensure_schema(&connection)?;

    Ok(connection)
}

/// Opens an existing database without touching its schema.
pub fn open_existing(db_path: &Path) -> Result<Connection> {
    if !db_path.exists() {
        bail!("database file missing: {}", db_path.display());
    }

    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    configure_connection(&connection)?;
    Ok(connection)
}

pub fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign_keys")?;
    Ok(())
}

pub fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS raw_reviews (
          id TEXT PRIMARY KEY,
          source TEXT NOT NULL,
          json TEXT NOT NULL,
          scraped_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS raw_posts (
          id TEXT PRIMARY KEY,
          source TEXT NOT NULL,
          title TEXT NOT NULL DEFAULT '',
          body TEXT NOT NULL DEFAULT '',
          url TEXT,
          author TEXT,
          scraped_at TEXT NOT NULL,
          posted_at TEXT,
          metadata TEXT
        );

        CREATE TABLE IF NOT EXISTS processed_reviews (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          post_id TEXT NOT NULL UNIQUE,
          cleaned_text TEXT NOT NULL,
          sentiment_score REAL NOT NULL DEFAULT 0,
          language TEXT NOT NULL DEFAULT 'en',
          word_count INTEGER NOT NULL DEFAULT 0,
          processed_at TEXT NOT NULL,
          mentioned_flavor_ids TEXT,
          mentioned_roaster_ids TEXT,
          mentioned_origins TEXT,
          linked_at TEXT,
          FOREIGN KEY(post_id) REFERENCES raw_posts(id)
        );

        CREATE TABLE IF NOT EXISTS nlp_extractions (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          processed_review_id INTEGER NOT NULL UNIQUE,
          post_id TEXT NOT NULL,
          flavors TEXT NOT NULL DEFAULT '[]',
          roasters TEXT NOT NULL DEFAULT '[]',
          origins TEXT NOT NULL DEFAULT '[]',
          brew_methods TEXT NOT NULL DEFAULT '[]',
          process_methods TEXT NOT NULL DEFAULT '[]',
          price REAL,
          keywords TEXT NOT NULL DEFAULT '[]',
          FOREIGN KEY(processed_review_id) REFERENCES processed_reviews(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS flavor_terms (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          term TEXT NOT NULL UNIQUE,
          normalized_term TEXT NOT NULL,
          category TEXT,
          synonyms TEXT NOT NULL DEFAULT '[]',
          total_mentions INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS entities (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          entity_type TEXT NOT NULL,
          name TEXT NOT NULL,
          slug TEXT NOT NULL UNIQUE,
          verified INTEGER NOT NULL DEFAULT 0,
          product_count INTEGER NOT NULL DEFAULT 0,
          avg_product_rating REAL NOT NULL DEFAULT 0,
          total_reviews INTEGER NOT NULL DEFAULT 0,
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS origins (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          country TEXT NOT NULL,
          region TEXT,
          normalized_name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS coffee_products (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          entity_id INTEGER NOT NULL,
          name TEXT NOT NULL,
          slug TEXT NOT NULL,
          category TEXT,
          description TEXT,
          url TEXT,
          temperature TEXT,
          has_caffeine INTEGER,
          is_seasonal INTEGER,
          total_ratings INTEGER NOT NULL DEFAULT 0,
          avg_rating REAL NOT NULL DEFAULT 0,
          total_reviews INTEGER NOT NULL DEFAULT 0,
          mention_count INTEGER NOT NULL DEFAULT 0,
          updated_at TEXT NOT NULL,
          UNIQUE(entity_id, slug),
          FOREIGN KEY(entity_id) REFERENCES entities(id)
        );

        CREATE TABLE IF NOT EXISTS flavor_extractions (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          processed_review_id INTEGER NOT NULL,
          post_id TEXT NOT NULL,
          flavor_term_id INTEGER NOT NULL,
          mention_text TEXT,
          sentence_context TEXT,
          intensity TEXT NOT NULL DEFAULT 'moderate',
          sentiment REAL NOT NULL DEFAULT 0,
          confidence_score REAL NOT NULL DEFAULT 0.5,
          is_primary_flavor INTEGER NOT NULL DEFAULT 0,
          mention_order INTEGER NOT NULL DEFAULT 1,
          created_at TEXT NOT NULL,
          UNIQUE(processed_review_id, flavor_term_id),
          FOREIGN KEY(processed_review_id) REFERENCES processed_reviews(id) ON DELETE CASCADE,
          FOREIGN KEY(flavor_term_id) REFERENCES flavor_terms(id)
        );

        CREATE TABLE IF NOT EXISTS coffee_mentions (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          post_id TEXT NOT NULL,
          roaster_id INTEGER,
          coffee_product_id INTEGER,
          mention_text TEXT,
          mention_context TEXT,
          confidence_score REAL NOT NULL DEFAULT 0.7,
          created_at TEXT NOT NULL,
          UNIQUE(post_id, roaster_id),
          FOREIGN KEY(roaster_id) REFERENCES entities(id),
          FOREIGN KEY(coffee_product_id) REFERENCES coffee_products(id)
        );

        CREATE TABLE IF NOT EXISTS product_reviews (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          product_id INTEGER NOT NULL,
          post_id TEXT NOT NULL,
          processed_review_id INTEGER,
          overall_rating REAL,
          sentiment REAL,
          created_at TEXT NOT NULL,
          UNIQUE(product_id, post_id),
          FOREIGN KEY(product_id) REFERENCES coffee_products(id)
        );

        CREATE TABLE IF NOT EXISTS flavor_rankings (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          flavor_id INTEGER NOT NULL,
          period_start TEXT NOT NULL,
          period_end TEXT NOT NULL,
          period_type TEXT NOT NULL,
          mention_count INTEGER NOT NULL DEFAULT 0,
          unique_products INTEGER NOT NULL DEFAULT 0,
          avg_sentiment REAL,
          positive_mentions INTEGER NOT NULL DEFAULT 0,
          negative_mentions INTEGER NOT NULL DEFAULT 0,
          popularity_rank INTEGER,
          computed_at TEXT NOT NULL,
          UNIQUE(flavor_id, period_start, period_end, period_type),
          FOREIGN KEY(flavor_id) REFERENCES flavor_terms(id)
        );
        ",
        )
        .context("failed to create base schema")?;

    ensure_column_exists(connection, "processed_reviews", "linked_at TEXT")?;
    ensure_column_exists(connection, "processed_reviews", "mentioned_origins TEXT")?;
    ensure_column_exists(connection, "flavor_terms", "category TEXT")?;

    connection.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_raw_posts_scraped ON raw_posts(scraped_at);
        CREATE INDEX IF NOT EXISTS idx_processed_reviews_linked ON processed_reviews(linked_at, processed_at);
        CREATE INDEX IF NOT EXISTS idx_flavor_extractions_term ON flavor_extractions(flavor_term_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_coffee_mentions_roaster ON coffee_mentions(roaster_id);
        CREATE INDEX IF NOT EXISTS idx_coffee_mentions_product ON coffee_mentions(coffee_product_id);
        CREATE INDEX IF NOT EXISTS idx_coffee_products_entity ON coffee_products(entity_id);
        CREATE INDEX IF NOT EXISTS idx_product_reviews_product ON product_reviews(product_id);
        CREATE INDEX IF NOT EXISTS idx_flavor_rankings_period ON flavor_rankings(period_type, period_end);
        ",
    )?;

    seed_flavor_terms(connection)?;

    let now = now_utc_string();
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now],
    )?;

    Ok(())
}

fn ensure_column_exists(
    connection: &Connection,
    table_name: &str,
    column_definition: &str,
) -> Result<()> {
    let Some(column_name) = column_definition.split_whitespace().next() else {
        bail!("invalid column definition: {column_definition}");
    };

    let pragma_sql = format!("PRAGMA table_info({table_name})");
    let mut statement = connection
        .prepare(&pragma_sql)
        .with_context(|| format!("failed to inspect schema for table {table_name}"))?;

    let mut rows = statement.query([])?;
    while let Some(row) = rows.next()? {
        let existing_name: String = row.get(1)?;
        if existing_name == column_name {
            return Ok(());
        }
    }

    let alter_sql = format!("ALTER TABLE {table_name} ADD COLUMN {column_definition}");
    connection
        .execute(&alter_sql, [])
        .with_context(|| format!("failed to add column {column_name} on {table_name}"))?;

    Ok(())
}

/// Inserts the canonical flavor vocabulary; existing rows are left untouched.
pub fn seed_flavor_terms(connection: &Connection) -> Result<usize> {
    let mut statement = connection.prepare(
        "
        INSERT INTO flavor_terms(term, normalized_term, category, synonyms)
        VALUES(?1, ?2, ?3, ?4)
        ON CONFLICT(term) DO NOTHING
        ",
    )?;

    let mut inserted = 0;
    for group in FLAVOR_GROUPS {
        let synonyms = serde_json::to_string(group.synonyms)?;
        inserted += statement.execute(params![
            group.term,
            group.term,
            group.category,
            synonyms
        ])?;
    }

    if inserted > 0 {
        info!(inserted, "seeded flavor terms");
    }

    Ok(inserted)
}

pub fn count_rows(connection: &Connection, table_name: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {table_name}");
    connection
        .query_row(&sql, [], |row| row.get(0))
        .with_context(|| format!("failed to count rows in {table_name}"))
}

pub fn table_exists(connection: &Connection, table_name: &str) -> Result<bool> {
    let count: i64 = connection.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table_name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn list_tables(connection: &Connection) -> Result<Vec<String>> {
    let mut statement = connection.prepare(
        "
        SELECT name
        FROM sqlite_master
        WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
        ORDER BY name ASC
        ",
    )?;

    let names = statement
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

pub fn missing_required_tables(connection: &Connection) -> Result<Vec<&'static str>> {
    let existing = list_tables(connection)?;
    Ok(REQUIRED_TABLES
        .iter()
        .copied()
        .filter(|table| !existing.iter().any(|name| name == table))
        .collect())
}

#[cfg(test)]
pub fn open_in_memory() -> Result<Connection> {
    let connection = Connection::open_in_memory()?;
    connection.pragma_update(None, "foreign_keys", "ON")?;
    ensure_schema(&connection)?;
    Ok(connection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_schema_is_idempotent_and_seeds_flavors_once() {
        let connection = open_in_memory().expect("schema should initialize");
        let first = count_rows(&connection, "flavor_terms").expect("count flavors");
        assert_eq!(first as usize, FLAVOR_GROUPS.len());

        ensure_schema(&connection).expect("second schema pass should succeed");
        let second = count_rows(&connection, "flavor_terms").expect("count flavors");
        assert_eq!(first, second);
    }

    #[test]
    fn missing_required_tables_is_empty_after_schema() {
        let connection = open_in_memory().expect("schema should initialize");
        let missing = missing_required_tables(&connection).expect("table listing");
        assert!(missing.is_empty(), "unexpected missing tables: {missing:?}");
    }

    #[test]
    fn table_exists_distinguishes_unknown_tables() {
        let connection = open_in_memory().expect("schema should initialize");
        assert!(table_exists(&connection, "raw_posts").expect("lookup"));
        assert!(!table_exists(&connection, "not_a_table").expect("lookup"));
    }
}

use std::io::{self, Write};

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::cli::StoreArgs;
use crate::db::{count_rows, list_tables, open_existing, table_exists};

const COMMON_TABLES: &[&str] = &[
    "raw_posts",
    "raw_reviews",
    "processed_reviews",
    "flavor_terms",
    "entities",
    "nlp_extractions",
];
const RAW_TABLES: &[&str] = &["raw_reviews", "raw_posts"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSample {
    pub columns: Vec<String>,
    pub id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingStatus {
    pub total: i64,
    pub processed: i64,
    pub unprocessed: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionStatus {
    pub total: i64,
    pub sample_flavors: Option<i64>,
    pub sample_roasters: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recommendation {
    /// Only the legacy `raw_reviews` table exists.
    MigrateLegacy,
    NeedsScrape,
    Ready,
    NoRawTables,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseReport {
    pub tables: Vec<String>,
    /// `None` when the table does not exist.
    pub row_counts: Vec<(&'static str, Option<i64>)>,
    /// Per raw table: `None` when missing, `Some(None)` when empty.
    pub raw_samples: Vec<(&'static str, Option<Option<RawSample>>)>,
    pub processing: Vec<(&'static str, ProcessingStatus)>,
    pub extraction: Option<ExtractionStatus>,
    pub recommendation: Recommendation,
}

pub fn run(args: StoreArgs) -> Result<()> {
    let db_path = args.resolved_db_path();
    let connection = open_existing(&db_path)?;
    info!(path = %db_path.display(), "checking database");

    let report = build_report(&connection)?;
    let mut output = io::BufWriter::new(io::stdout().lock());
    write_report(&mut output, &report)?;
    output.flush().context("failed to flush report")?;
    Ok(())
}

pub fn build_report(connection: &Connection) -> Result<DatabaseReport> {
    let tables = list_tables(connection)?;
    let has = |name: &str| tables.iter().any(|table| table == name);

    let mut row_counts = Vec::with_capacity(COMMON_TABLES.len());
    for table in COMMON_TABLES {
        let count = if has(*table) {
            Some(count_rows(connection, table)?)
        } else {
            None
        };
        row_counts.push((*table, count));
    }

    let mut raw_samples = Vec::with_capacity(RAW_TABLES.len());
    let mut processing = Vec::new();
    for table in RAW_TABLES {
        if !has(*table) {
            raw_samples.push((*table, None));
            continue;
        }
        raw_samples.push((*table, Some(raw_sample(connection, table)?)));

        if has("processed_reviews") {
            let status = processing_status(connection, table)?;
            if status.total > 0 {
                processing.push((*table, status));
            }
        }
    }

    let extraction = if table_exists(connection, "nlp_extractions")? {
        Some(extraction_status(connection)?)
    } else {
        None
    };

    let recommendation = match (has("raw_reviews"), has("raw_posts")) {
        (true, false) => Recommendation::MigrateLegacy,
        (_, true) if count_rows(connection, "raw_posts")? == 0 => Recommendation::NeedsScrape,
        (_, true) => Recommendation::Ready,
        (false, false) => Recommendation::NoRawTables,
    };

    Ok(DatabaseReport {
        tables,
        row_counts,
        raw_samples,
        processing,
        extraction,
        recommendation,
    })
}

fn raw_sample(connection: &Connection, table: &str) -> Result<Option<RawSample>> {
    let mut statement = connection
        .prepare(&format!("SELECT * FROM {table} LIMIT 1"))
        .with_context(|| format!("failed to sample {table}"))?;
    let columns = statement
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let id_index = columns.iter().position(|column| column == "id");

    let id = statement
        .query_row([], |row| match id_index {
            Some(index) => row.get::<_, Option<String>>(index),
            None => Ok(None),
        })
        .optional()
        .with_context(|| format!("failed to sample {table}"))?;

    Ok(id.map(|id| RawSample {
        columns,
        id,
    }))
}

fn processing_status(connection: &Connection, raw_table: &str) -> Result<ProcessingStatus> {
    let sql = format!(
        "
        SELECT COUNT(*), COUNT(pr.id)
        FROM {raw_table} rr
        LEFT JOIN processed_reviews pr ON rr.id = pr.post_id
        "
    );
    let (total, processed): (i64, i64) = connection
        .query_row(&sql, [], |row| Ok((row.get(0)?, row.get(1)?)))
        .with_context(|| format!("failed to compute processing status for {raw_table}"))?;

    Ok(ProcessingStatus {
        total,
        processed,
        unprocessed: total - processed,
    })
}

fn extraction_status(connection: &Connection) -> Result<ExtractionStatus> {
    let total = count_rows(connection, "nlp_extractions")?;
    let sample = connection
        .query_row(
            "
            SELECT json_array_length(flavors), json_array_length(roasters)
            FROM nlp_extractions
            ORDER BY id ASC
            LIMIT 1
            ",
            [],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()
        .context("failed to sample nlp_extractions")?;

    Ok(ExtractionStatus {
        total,
        sample_flavors: sample.map(|(flavors, _)| flavors),
        sample_roasters: sample.map(|(_, roasters)| roasters),
    })
}

pub fn write_report(out: &mut impl Write, report: &DatabaseReport) -> Result<()> {
    let rule = "-".repeat(70);
    writeln!(out, "{}", "=".repeat(70))?;
    writeln!(out, "DATABASE DIAGNOSTIC REPORT")?;
    writeln!(out, "{}", "=".repeat(70))?;

    writeln!(out, "\n1. EXISTING TABLES:\n{rule}")?;
    if report.tables.is_empty() {
        writeln!(out, "   No tables found in database")?;
    }
    for table in &report.tables {
        writeln!(out, "   [x] {table}")?;
    }

    writeln!(out, "\n2. TABLE ROW COUNTS:\n{rule}")?;
    for (table, count) in &report.row_counts {
        match count {
            Some(0) => writeln!(out, "   [ ] {table}: 0 rows (empty)")?,
            Some(count) => writeln!(out, "   [x] {table}: {count} rows")?,
            None => writeln!(out, "   [!] {table}: table doesn't exist")?,
        }
    }

    writeln!(out, "\n3. RAW DATA CHECK:\n{rule}")?;
    for (table, sample) in &report.raw_samples {
        match sample {
            Some(Some(sample)) => {
                writeln!(out, "   [x] {table} has data")?;
                writeln!(out, "   Columns: {}", sample.columns.join(", "))?;
                writeln!(out, "   Sample ID: {}", sample.id.as_deref().unwrap_or("-"))?;
            }
            Some(None) => writeln!(out, "   [ ] {table} exists but is empty")?,
            None => writeln!(out, "   [!] {table} table doesn't exist")?,
        }
    }

    writeln!(out, "\n4. PROCESSING STATUS:\n{rule}")?;
    for (table, status) in &report.processing {
        writeln!(out, "   Using table: {table}")?;
        writeln!(out, "   Total raw posts: {}", status.total)?;
        writeln!(out, "   Processed: {}", status.processed)?;
        writeln!(out, "   Unprocessed: {}", status.unprocessed)?;
        if status.unprocessed == 0 {
            writeln!(out, "   All posts have been processed")?;
        } else {
            writeln!(out, "   {} posts ready for processing", status.unprocessed)?;
        }
    }

    writeln!(out, "\n5. NLP EXTRACTION STATUS:\n{rule}")?;
    match &report.extraction {
        Some(status) => {
            writeln!(out, "   NLP extractions stored: {}", status.total)?;
            if let (Some(flavors), Some(roasters)) = (status.sample_flavors, status.sample_roasters) {
                writeln!(out, "   Sample extraction has {flavors} flavors, {roasters} roasters")?;
            }
        }
        None => writeln!(out, "   [!] nlp_extractions table doesn't exist")?,
    }

    writeln!(out, "\n6. RECOMMENDATIONS:\n{rule}")?;
    match report.recommendation {
        Recommendation::MigrateLegacy => {
            writeln!(out, "   Using the legacy schema (raw_reviews only)")?;
            writeln!(out, "   Run: brewlink migrate")?;
        }
        Recommendation::NeedsScrape => {
            writeln!(out, "   raw_posts is empty")?;
            writeln!(out, "   Run: brewlink scrape-reddit --store-db")?;
        }
        Recommendation::Ready => writeln!(out, "   Schema looks good")?,
        Recommendation::NoRawTables => {
            writeln!(out, "   No raw data tables found")?;
            writeln!(out, "   Run: brewlink schema")?;
        }
    }
    writeln!(out, "\n{}", "=".repeat(70))?;

    Ok(())
}

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

use crate::cli::PipelineArgs;
use crate::commands::aggregate::{AggregationCounts, DEFAULT_PERIODS, DataAggregator, write_aggregation_report};
use crate::commands::import::{DiscussionImportCounts, import_discussion_file};
use crate::commands::link::{LinkStats, link_reviews};
use crate::commands::manifest::write_stage_manifest;
use crate::commands::process::{ProcessCounts, process_all};
use crate::commands::schema::{run_sql_file, verify_required_tables};
use crate::db::{REQUIRED_TABLES, count_rows, open_database};
use crate::nlp::Extractor;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PipelineCounts {
    pub imported: Option<DiscussionImportCounts>,
    pub process: ProcessCounts,
    pub link: LinkStats,
    pub aggregate: AggregationCounts,
    pub table_counts: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions<'a> {
    pub discussions: Option<&'a Path>,
    pub batch_size: usize,
    pub link_limit: usize,
    pub today: NaiveDate,
}

pub fn run(args: PipelineArgs) -> Result<()> {
    let started_ts = Utc::now();
    let db_path = args.store.resolved_db_path();
    info!(db_path = %db_path.display(), "starting pipeline");

    let mut connection = open_database(&db_path).context("schema stage failed")?;
    if let Some(sql_file) = &args.sql_file {
        run_sql_file(&connection, sql_file).context("schema stage failed")?;
    }

    let options = PipelineOptions {
        discussions: args.discussions.as_deref(),
        batch_size: args.batch_size,
        link_limit: args.link_limit,
        today: started_ts.date_naive(),
    };
    let counts = run_stages(&mut connection, &options)?;
    write_aggregation_report(&connection)?;

    write_stage_manifest(&args.store, "pipeline", started_ts, counts, Vec::new())?;
    info!("pipeline completed");
    Ok(())
}

/// Runs every stage after schema setup in order, stopping at the first failure.
pub fn run_stages(connection: &mut Connection, options: &PipelineOptions<'_>) -> Result<PipelineCounts> {
    verify_required_tables(connection).context("table verification failed")?;

    let imported = match options.discussions {
        Some(path) => {
            info!(path = %path.display(), "stage: import discussions");
            Some(import_discussion_file(connection, path).context("import stage failed")?)
        }
        None => None,
    };

    info!("stage: process");
    let extractor = Extractor::new()?;
    let process = process_all(connection, &extractor, options.batch_size).context("process stage failed")?;

    info!("stage: link");
    let link = link_reviews(connection, options.batch_size, options.link_limit).context("link stage failed")?;

    info!("stage: aggregate");
    let aggregate = DataAggregator::new(options.today)
        .run_all(connection, DEFAULT_PERIODS)
        .context("aggregate stage failed")?;

    let mut table_counts = BTreeMap::new();
    for table in REQUIRED_TABLES {
        let count = count_rows(connection, table)?;
        info!(table, count, "table count");
        table_counts.insert(table.to_string(), count);
    }

    Ok(PipelineCounts {
        imported,
        process,
        link,
        aggregate,
        table_counts,
    })
}

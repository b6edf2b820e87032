use std::collections::BTreeMap;
use std::io::{self, Write};

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

use crate::cli::{AggregateArgs, RankingPeriod};
use crate::commands::manifest::write_stage_manifest;
use crate::db::open_database;

mod metrics;
mod rankings;
#[cfg(test)]
mod tests;

pub use metrics::{update_entity_metrics, update_flavor_popularity, update_product_metrics};
pub use rankings::compute_flavor_rankings;

pub const DEFAULT_PERIODS: &[RankingPeriod] = &[RankingPeriod::Week, RankingPeriod::Month];
const TOP_FLAVOR_LIMIT: usize = 10;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct AggregationCounts {
    pub flavors_updated: usize,
    pub entities_updated: usize,
    pub products_updated: usize,
    pub rankings_upserted: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlavorMentions {
    pub term: String,
    pub total_mentions: i64,
}

/// Recomputes summary metrics over linked data. Rankings end on `today`.
#[derive(Debug, Clone, Copy)]
pub struct DataAggregator {
    today: NaiveDate,
}

impl DataAggregator {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    pub fn run_all(&self, connection: &Connection, periods: &[RankingPeriod]) -> Result<AggregationCounts> {
        info!(today = %self.today, "starting aggregation");

        let mut counts = AggregationCounts {
            flavors_updated: update_flavor_popularity(connection)?,
            entities_updated: update_entity_metrics(connection)?,
            products_updated: update_product_metrics(connection)?,
            ..AggregationCounts::default()
        };

        for period in periods {
            let upserted = compute_flavor_rankings(connection, *period, self.today)?;
            counts
                .rankings_upserted
                .insert(period.as_str().to_string(), upserted);
        }

        info!("aggregation complete");
        Ok(counts)
    }
}

pub fn run(args: AggregateArgs) -> Result<()> {
    let started_ts = Utc::now();
    let db_path = args.store.resolved_db_path();
    let connection = open_database(&db_path)?;

    let periods = if args.periods.is_empty() {
        DEFAULT_PERIODS.to_vec()
    } else {
        args.periods.clone()
    };

    let aggregator = DataAggregator::new(started_ts.date_naive());
    let counts = aggregator.run_all(&connection, &periods)?;

    write_aggregation_report(&connection)?;
    write_stage_manifest(&args.store, "aggregate", started_ts, counts, Vec::new())?;
    Ok(())
}

pub fn top_flavors(connection: &Connection, limit: usize) -> Result<Vec<FlavorMentions>> {
    let mut statement = connection.prepare(
        "
        SELECT term, total_mentions
        FROM flavor_terms
        WHERE total_mentions > 0
        ORDER BY total_mentions DESC, term ASC
        LIMIT ?1
        ",
    )?;

    let rows = statement
        .query_map([limit as i64], |row| {
            Ok(FlavorMentions {
                term: row.get(0)?,
                total_mentions: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn write_aggregation_report(connection: &Connection) -> Result<()> {
    let with_mentions: i64 = connection.query_row(
        "SELECT COUNT(*) FROM flavor_terms WHERE total_mentions > 0",
        [],
        |row| row.get(0),
    )?;
    let top = top_flavors(connection, TOP_FLAVOR_LIMIT)?;

    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output, "\n=== Aggregation Results ===")?;
    writeln!(output, "Flavors with mentions: {with_mentions}")?;
    writeln!(output, "\n=== Top {TOP_FLAVOR_LIMIT} Flavors ===")?;
    for flavor in &top {
        writeln!(output, "  {}: {} mentions", flavor.term, flavor.total_mentions)?;
    }
    output.flush()?;
    Ok(())
}

use std::io::{self, Write};

use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;
use tracing::info;

use crate::cli::LinkArgs;
use crate::commands::manifest::write_stage_manifest;
use crate::db::open_database;

mod cache;
mod linker;
mod matching;
#[cfg(test)]
mod tests;

pub use linker::{EntityLinker, LinkStats};
pub use matching::slugify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkCoverage {
    pub reviews_with_flavors: i64,
    pub reviews_with_roasters: i64,
}

pub fn run(args: LinkArgs) -> Result<()> {
    let started_ts = Utc::now();
    let db_path = args.store.resolved_db_path();
    info!(
        db_path = %db_path.display(),
        batch_size = args.batch_size,
        total_limit = args.total_limit,
        "starting entity linking"
    );

    let mut connection = open_database(&db_path)?;
    let stats = link_reviews(&mut connection, args.batch_size, args.total_limit)?;

    let coverage = link_coverage(&connection)?;
    write_link_report(&coverage)?;

    write_stage_manifest(&args.store, "link", started_ts, stats, Vec::new())?;
    Ok(())
}

/// Loads the reference cache and links until no review is left or the limit is hit.
pub fn link_reviews(connection: &mut Connection, batch_size: usize, total_limit: usize) -> Result<LinkStats> {
    let mut linker = EntityLinker::new(connection)?;
    let total = linker.run(connection, batch_size, total_limit)?;
    let stats = linker.stats();

    info!(
        selected = total,
        linked = stats.reviews_linked,
        failed = stats.reviews_failed,
        "linking completed"
    );
    Ok(stats)
}

pub fn link_coverage(connection: &Connection) -> Result<LinkCoverage> {
    let coverage = connection.query_row(
        "
        SELECT
          COUNT(DISTINCT fe.processed_review_id),
          COUNT(DISTINCT cm.post_id)
        FROM processed_reviews pr
        LEFT JOIN flavor_extractions fe ON pr.id = fe.processed_review_id
        LEFT JOIN coffee_mentions cm ON pr.post_id = cm.post_id
        ",
        [],
        |row| {
            Ok(LinkCoverage {
                reviews_with_flavors: row.get(0)?,
                reviews_with_roasters: row.get(1)?,
            })
        },
    )?;
    Ok(coverage)
}

fn write_link_report(coverage: &LinkCoverage) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output, "\n=== Entity Linking Statistics ===")?;
    writeln!(output, "Reviews with flavors: {}", coverage.reviews_with_flavors)?;
    writeln!(output, "Reviews with roasters: {}", coverage.reviews_with_roasters)?;
    output.flush()?;
    Ok(())
}

use std::collections::HashSet;
use std::io::{self, Write};

use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::cli::ProcessArgs;
use crate::commands::manifest::write_stage_manifest;
use crate::db::open_database;
use crate::nlp::Extractor;

mod store;

pub use store::{ProcessingStats, processing_stats};
use store::{RawPostRow, load_unprocessed_posts, upsert_extraction, upsert_processed_review};

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ProcessCounts {
    pub batches: usize,
    pub posts_selected: usize,
    pub posts_processed: usize,
    pub posts_skipped: usize,
    pub posts_failed: usize,
}

pub fn run(args: ProcessArgs) -> Result<()> {
    let started_ts = Utc::now();
    let db_path = args.store.resolved_db_path();
    info!(db_path = %db_path.display(), batch_size = args.batch_size, "starting extraction");

    let mut connection = open_database(&db_path)?;
    let extractor = Extractor::new()?;

    let counts = process_all(&mut connection, &extractor, args.batch_size)?;
    info!(
        processed = counts.posts_processed,
        skipped = counts.posts_skipped,
        failed = counts.posts_failed,
        "extraction completed"
    );

    let stats = processing_stats(&connection)?;
    write_processing_stats(&stats)?;

    write_stage_manifest(&args.store, "process", started_ts, counts, Vec::new())?;
    Ok(())
}

/// Runs batches until no unprocessed post remains. Posts that are skipped or fail
/// are remembered for the rest of the run so they are not selected again.
pub fn process_all(
    connection: &mut Connection,
    extractor: &Extractor,
    batch_size: usize,
) -> Result<ProcessCounts> {
    let mut counts = ProcessCounts::default();
    let mut passed_over = HashSet::<String>::new();

    loop {
        let batch = process_batch(connection, extractor, batch_size, &mut passed_over)?;
        if batch.posts_selected == 0 {
            break;
        }

        counts.batches += 1;
        counts.posts_selected += batch.posts_selected;
        counts.posts_processed += batch.posts_processed;
        counts.posts_skipped += batch.posts_skipped;
        counts.posts_failed += batch.posts_failed;
    }

    Ok(counts)
}

pub fn process_batch(
    connection: &mut Connection,
    extractor: &Extractor,
    limit: usize,
    passed_over: &mut HashSet<String>,
) -> Result<ProcessCounts> {
    let posts = load_unprocessed_posts(connection, limit, passed_over)?;
    let mut counts = ProcessCounts {
        posts_selected: posts.len(),
        ..ProcessCounts::default()
    };

    if posts.is_empty() {
        info!("no unprocessed posts found");
        return Ok(counts);
    }

    info!(posts = posts.len(), "processing batch");

    for post in &posts {
        match process_single_post(connection, extractor, post) {
            Ok(Some(_)) => counts.posts_processed += 1,
            Ok(None) => {
                counts.posts_skipped += 1;
                passed_over.insert(post.id.clone());
            }
            Err(err) => {
                error!(post_id = %post.id, error = %err, "failed to process post");
                counts.posts_failed += 1;
                passed_over.insert(post.id.clone());
            }
        }
    }

    info!(
        processed = counts.posts_processed,
        selected = counts.posts_selected,
        "batch processed"
    );
    Ok(counts)
}

/// Extracts one post and stores `processed_reviews` + `nlp_extractions` atomically.
/// Returns the processed review id, or `None` when the post has too little text.
pub fn process_single_post(
    connection: &mut Connection,
    extractor: &Extractor,
    post: &RawPostRow,
) -> Result<Option<i64>> {
    let Some(analysis) = extractor.analyze_post(&post.title, &post.body) else {
        warn!(post_id = %post.id, "skipping post: insufficient text");
        return Ok(None);
    };

    let tx = connection.transaction()?;
    let processed_review_id = upsert_processed_review(&tx, &post.id, &analysis)?;
    upsert_extraction(&tx, processed_review_id, &post.id, &analysis.extraction)?;
    tx.commit()?;

    info!(
        post_id = %post.id,
        flavors = analysis.extraction.flavors.len(),
        roasters = analysis.extraction.roasters.len(),
        origins = analysis.extraction.origins.len(),
        "processed post"
    );

    Ok(Some(processed_review_id))
}

fn write_processing_stats(stats: &ProcessingStats) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(output, "\n=== Processing Statistics ===")?;
    writeln!(output, "Total processed: {}", stats.total_processed)?;
    match stats.avg_sentiment {
        Some(avg) => writeln!(output, "Average sentiment: {avg:.2}")?,
        None => writeln!(output, "Average sentiment: n/a")?,
    }
    writeln!(output, "Positive reviews: {}", stats.positive_reviews)?;
    writeln!(output, "Negative reviews: {}", stats.negative_reviews)?;

    output.flush()?;
    Ok(())
}

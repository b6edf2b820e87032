mod dunkin;
mod http;
mod menu;
mod reddit;
mod snapshot;
mod starbucks;

#[cfg(test)]
mod tests;

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::{RedditMode, Retailer, ScrapeMenuArgs, ScrapeRedditArgs};
use crate::commands::import::store_discussions;
use crate::db::open_database;
use crate::nlp::Extractor;
use crate::util::utc_date_string;

use dunkin::DunkinMenu;
use http::HttpFetcher;
use menu::{MenuSite, scrape_menu};
use reddit::{DiscussionStats, RedditScraper, discussion_statistics};
use starbucks::StarbucksMenu;

const REDDIT_SOURCE: &str = "reddit";
const REDDIT_FILE_STEM: &str = "coffee_discussions_";

pub fn run_reddit(args: ScrapeRedditArgs) -> Result<()> {
    let started_ts = Utc::now();
    let fetcher = HttpFetcher::new(&args.user_agent, Duration::from_millis(args.delay_ms))?;
    let extractor = Extractor::new()?;
    let scraper = RedditScraper::new(&fetcher, &extractor, utc_date_string(started_ts));

    let discussions = match args.mode {
        RedditMode::Search => {
            let subreddits = if args.subreddits.is_empty() {
                reddit::TARGET_SUBREDDITS.iter().map(|s| s.to_string()).collect()
            } else {
                args.subreddits.clone()
            };
            scraper.scrape_all(&subreddits)
        }
        RedditMode::Hot => {
            let subreddit = args
                .subreddits
                .first()
                .map(String::as_str)
                .unwrap_or(reddit::DEFAULT_HOT_SUBREDDIT);
            scraper.scrape_hot(subreddit, args.limit)?
        }
    };

    let mut warnings = Vec::new();
    if discussions.is_empty() {
        warn!("no discussions collected");
        warnings.push("no discussions collected".to_string());
    }

    let output_path = snapshot::snapshot_path(&args.store, REDDIT_SOURCE, REDDIT_FILE_STEM, started_ts);
    snapshot::write_snapshot(&args.store, REDDIT_SOURCE, &output_path, &discussions, started_ts, warnings)?;

    if args.store_db {
        let db_path = args.store.resolved_db_path();
        let mut connection = open_database(&db_path)?;
        let counts = store_discussions(&mut connection, &discussions)?;
        info!(
            inserted = counts.inserted,
            skipped = counts.skipped,
            failed = counts.failed,
            "stored discussions in database"
        );
    }

    if let Some(stats) = discussion_statistics(&discussions) {
        print_discussion_stats(&stats)?;
    }

    Ok(())
}

fn print_discussion_stats(stats: &DiscussionStats) -> Result<()> {
    let mut out = io::BufWriter::new(io::stdout().lock());
    writeln!(out, "=== Discussion Statistics ===")?;
    writeln!(out, "Total posts: {}", stats.total_posts)?;
    writeln!(out, "Total comments: {}", stats.total_comments)?;
    writeln!(out, "Average score: {:.1}", stats.avg_score)?;
    writeln!(out, "Posts by subreddit:")?;
    for (subreddit, count) in &stats.subreddit_breakdown {
        writeln!(out, "  r/{subreddit}: {count}")?;
    }
    writeln!(out, "Most mentioned drinks:")?;
    for (drink, count) in &stats.top_mentioned_drinks {
        writeln!(out, "  {drink}: {count}")?;
    }
    out.flush().context("failed to flush report")?;
    Ok(())
}

fn menu_site(retailer: Retailer) -> Result<Box<dyn MenuSite>> {
    Ok(match retailer {
        Retailer::Starbucks => Box::new(StarbucksMenu::new()?),
        Retailer::Dunkin => Box::new(DunkinMenu::new()?),
    })
}

pub fn run_menu(args: ScrapeMenuArgs) -> Result<()> {
    let started_ts = Utc::now();
    let fetcher = HttpFetcher::new(&args.user_agent, Duration::from_millis(args.delay_ms))?;
    let site = menu_site(args.retailer)?;
    let source = args.retailer.slug();

    let scrape = scrape_menu(
        &fetcher,
        site.as_ref(),
        args.max_items_per_category,
        &utc_date_string(started_ts),
    )?;

    let mut warnings = Vec::new();
    if scrape.failed > 0 {
        warnings.push(format!("{} pages failed to scrape", scrape.failed));
    }
    if scrape.items.is_empty() {
        warn!(retailer = source, "no menu items collected");
        warnings.push("no menu items collected".to_string());
    }

    let output_path = snapshot::snapshot_path(&args.store, source, "", started_ts);
    snapshot::write_snapshot(&args.store, source, &output_path, &scrape.items, started_ts, warnings)?;

    let mut out = io::BufWriter::new(io::stdout().lock());
    writeln!(out, "=== {} Menu ===", args.retailer.display_name())?;
    writeln!(out, "Total items: {}", scrape.items.len())?;
    writeln!(out, "Failed pages: {}", scrape.failed)?;
    writeln!(out, "Items by category:")?;
    for (category, count) in &scrape.category_counts {
        writeln!(out, "  {category}: {count}")?;
    }
    out.flush().context("failed to flush report")?;

    Ok(())
}

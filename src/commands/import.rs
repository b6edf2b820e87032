use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use rusqlite::{Connection, params};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::cli::{ImportDiscussionsArgs, ImportMenuArgs, Retailer};
use crate::commands::link::slugify;
use crate::commands::manifest::write_stage_manifest;
use crate::db::open_database;
use crate::model::{Discussion, EntityType, MenuItem};
use crate::util::{now_utc_string, read_json};

pub const DISCUSSION_SOURCE: &str = "reddit";

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct DiscussionImportCounts {
    pub records: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct MenuImportCounts {
    pub entity_id: i64,
    pub records: usize,
    pub products_upserted: usize,
    pub failed: usize,
}

pub fn run_discussions(args: ImportDiscussionsArgs) -> Result<()> {
    let started_ts = Utc::now();
    let mut connection = open_database(&args.store.resolved_db_path())?;

    let counts = import_discussion_file(&mut connection, &args.input)?;
    write_stage_manifest(&args.store, "import_discussions", started_ts, counts, Vec::new())?;
    Ok(())
}

pub fn import_discussion_file(connection: &mut Connection, input: &Path) -> Result<DiscussionImportCounts> {
    if !input.exists() {
        bail!("discussion snapshot not found: {}", input.display());
    }

    let discussions: Vec<Discussion> = read_json(input)?;
    info!(path = %input.display(), records = discussions.len(), "importing discussions");

    let counts = store_discussions(connection, &discussions)?;
    info!(
        inserted = counts.inserted,
        skipped = counts.skipped,
        failed = counts.failed,
        "imported discussions"
    );
    Ok(counts)
}

/// Inserts discussions into `raw_posts`; existing ids are left untouched.
pub fn store_discussions(connection: &mut Connection, discussions: &[Discussion]) -> Result<DiscussionImportCounts> {
    let mut counts = DiscussionImportCounts {
        records: discussions.len(),
        ..DiscussionImportCounts::default()
    };

    let tx = connection.transaction()?;
    {
        let mut statement = tx.prepare(
            "
            INSERT INTO raw_posts(id, source, title, body, url, author, scraped_at, posted_at, metadata)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO NOTHING
            ",
        )?;

        let now = now_utc_string();
        for discussion in discussions {
            let metadata = json!({
                "subreddit": discussion.subreddit,
                "score": discussion.score,
                "num_comments": discussion.num_comments,
                "upvote_ratio": discussion.upvote_ratio,
                "flair": discussion.flair,
                "top_comments": discussion.top_comments,
                "mentioned_drinks": discussion.mentioned_drinks,
            });
            let scraped_at = if discussion.scraped_date.trim().is_empty() {
                now.as_str()
            } else {
                discussion.scraped_date.as_str()
            };

            let result = statement.execute(params![
                discussion.post_id,
                DISCUSSION_SOURCE,
                discussion.title,
                discussion.text,
                discussion.url,
                discussion.author,
                scraped_at,
                discussion.created_utc,
                metadata.to_string(),
            ]);

            match result {
                Ok(0) => counts.skipped += 1,
                Ok(_) => counts.inserted += 1,
                Err(err) => {
                    warn!(post_id = %discussion.post_id, error = %err, "failed to store discussion");
                    counts.failed += 1;
                }
            }
        }
    }
    tx.commit()?;

    Ok(counts)
}

pub fn run_menu(args: ImportMenuArgs) -> Result<()> {
    let started_ts = Utc::now();
    let mut connection = open_database(&args.store.resolved_db_path())?;

    if !args.input.exists() {
        bail!("menu snapshot not found: {}", args.input.display());
    }
    let items: Vec<MenuItem> = read_json(&args.input)?;
    info!(
        path = %args.input.display(),
        retailer = args.retailer.slug(),
        records = items.len(),
        "importing menu"
    );

    let counts = import_menu_items(&mut connection, args.retailer, &items)?;
    info!(
        entity_id = counts.entity_id,
        products = counts.products_upserted,
        failed = counts.failed,
        "imported menu"
    );

    write_stage_manifest(&args.store, "import_menu", started_ts, counts, Vec::new())?;
    Ok(())
}

/// Upserts the retailer entity and one product per distinct item name.
pub fn import_menu_items(connection: &mut Connection, retailer: Retailer, items: &[MenuItem]) -> Result<MenuImportCounts> {
    let tx = connection.transaction()?;
    let now = now_utc_string();

    let entity_id: i64 = tx
        .query_row(
            "
            INSERT INTO entities(entity_type, name, slug, verified, created_at, updated_at)
            VALUES(?1, ?2, ?3, 1, ?4, ?4)
            ON CONFLICT(slug) DO UPDATE SET
              entity_type=excluded.entity_type,
              name=excluded.name,
              verified=1,
              updated_at=excluded.updated_at
            RETURNING id
            ",
            params![EntityType::Retailer.as_str(), retailer.display_name(), retailer.slug(), now],
            |row| row.get(0),
        )
        .with_context(|| format!("failed to upsert retailer {}", retailer.slug()))?;

    let mut counts = MenuImportCounts {
        entity_id,
        records: items.len(),
        ..MenuImportCounts::default()
    };

    {
        let mut statement = tx.prepare(
            "
            INSERT INTO coffee_products(
              entity_id, name, slug, category, description, url, temperature,
              has_caffeine, is_seasonal, updated_at
            )
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(entity_id, slug) DO UPDATE SET
              name=excluded.name,
              category=excluded.category,
              description=excluded.description,
              url=excluded.url,
              temperature=excluded.temperature,
              has_caffeine=excluded.has_caffeine,
              is_seasonal=excluded.is_seasonal,
              updated_at=excluded.updated_at
            ",
        )?;

        for item in items {
            let slug = slugify(&item.name);
            if slug.is_empty() {
                warn!(url = %item.url, "skipping menu item without a name");
                counts.failed += 1;
                continue;
            }

            let result = statement.execute(params![
                entity_id,
                item.name.trim(),
                slug,
                item.category,
                item.description,
                item.url,
                item.temperature.as_str(),
                item.has_caffeine,
                item.is_seasonal,
                now,
            ]);

            match result {
                Ok(_) => counts.products_upserted += 1,
                Err(err) => {
                    warn!(name = %item.name, error = %err, "failed to store menu item");
                    counts.failed += 1;
                }
            }
        }
    }
    tx.commit()?;

    Ok(counts)
}

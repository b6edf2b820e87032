use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, warn};

use crate::cli::{InventoryArgs, Retailer};
use crate::model::{SnapshotEntry, SnapshotInventoryManifest};
use crate::util::{list_json_files, now_utc_string, read_json, sha256_file, truncate_chars, write_json_pretty};

const REDDIT_SOURCE: &str = "reddit";
const MIN_DRINKS: usize = 100;
const MIN_DISCUSSIONS: usize = 500;
const MIN_CAFES: usize = 2;
const SAMPLE_TITLE_CHARS: usize = 60;

/// The newest snapshot of one source plus a sample record label.
#[derive(Debug, Clone)]
pub struct SourceSnapshot {
    pub entry: SnapshotEntry,
    pub sample: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub enough_drinks: bool,
    pub enough_discussions: bool,
    pub multiple_cafes: bool,
}

impl Readiness {
    pub fn is_ready(self) -> bool {
        self.enough_drinks && self.enough_discussions && self.multiple_cafes
    }
}

#[derive(Debug, Clone)]
pub struct Inventory {
    pub cafes: Vec<(Retailer, Option<SourceSnapshot>)>,
    pub reddit: Option<SourceSnapshot>,
}

impl Inventory {
    pub fn total_drinks(&self) -> usize {
        self.cafes
            .iter()
            .filter_map(|(_, snapshot)| snapshot.as_ref())
            .map(|snapshot| snapshot.entry.record_count)
            .sum()
    }

    pub fn total_discussions(&self) -> usize {
        self.reddit
            .as_ref()
            .map(|snapshot| snapshot.entry.record_count)
            .unwrap_or_default()
    }

    pub fn readiness(&self) -> Readiness {
        let cafes_with_data = self
            .cafes
            .iter()
            .filter(|(_, snapshot)| snapshot.is_some())
            .count();

        Readiness {
            enough_drinks: self.total_drinks() >= MIN_DRINKS,
            enough_discussions: self.total_discussions() >= MIN_DISCUSSIONS,
            multiple_cafes: cafes_with_data >= MIN_CAFES,
        }
    }

    pub fn manifest(&self, raw_dir: &Path) -> SnapshotInventoryManifest {
        let snapshots = self
            .cafes
            .iter()
            .filter_map(|(_, snapshot)| snapshot.as_ref())
            .chain(self.reddit.as_ref())
            .map(|snapshot| snapshot.entry.clone())
            .collect::<Vec<_>>();

        SnapshotInventoryManifest {
            manifest_version: 1,
            generated_at: now_utc_string(),
            source_directory: raw_dir.display().to_string(),
            snapshot_count: snapshots.len(),
            snapshots,
        }
    }
}

pub fn run(args: InventoryArgs) -> Result<()> {
    let raw_dir = args.data_root.join("raw");
    let inventory = build_inventory(&raw_dir)?;

    let mut output = io::BufWriter::new(io::stdout().lock());
    write_inventory_report(&mut output, &inventory)?;
    output.flush().context("failed to flush report")?;

    let manifest = inventory.manifest(&raw_dir);
    if args.dry_run {
        info!(
            snapshot_count = manifest.snapshot_count,
            source = %manifest.source_directory,
            "inventory dry-run complete"
        );
        return Ok(());
    }

    let manifest_path = args
        .manifest_path
        .unwrap_or_else(|| args.data_root.join("manifests").join("snapshot_inventory.json"));

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote inventory manifest");
    info!(snapshot_count = manifest.snapshot_count, "inventory completed");

    Ok(())
}

pub fn build_inventory(raw_dir: &Path) -> Result<Inventory> {
    let mut cafes = Vec::new();
    for retailer in [Retailer::Starbucks, Retailer::Dunkin] {
        let snapshot = newest_snapshot(raw_dir, retailer.slug(), "name")?;
        cafes.push((retailer, snapshot));
    }

    Ok(Inventory {
        cafes,
        reddit: newest_snapshot(raw_dir, REDDIT_SOURCE, "title")?,
    })
}

/// Snapshot file names embed the scrape date, so the last in name order is the newest.
fn newest_snapshot(raw_dir: &Path, source: &str, label_field: &str) -> Result<Option<SourceSnapshot>> {
    let Some(path) = list_json_files(&raw_dir.join(source))?.pop() else {
        warn!(source, "no snapshots found");
        return Ok(None);
    };

    describe_snapshot(&path, source, label_field).map(Some)
}

fn describe_snapshot(path: &Path, source: &str, label_field: &str) -> Result<SourceSnapshot> {
    let records: Vec<Value> = read_json(path)?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(ToOwned::to_owned)
        .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))?;

    let sample = records
        .first()
        .and_then(|record| record.get(label_field))
        .and_then(Value::as_str)
        .map(|label| truncate_chars(label, SAMPLE_TITLE_CHARS));

    Ok(SourceSnapshot {
        entry: SnapshotEntry {
            source: source.to_string(),
            filename,
            sha256: sha256_file(path)?,
            record_count: records.len(),
        },
        sample,
    })
}

pub fn write_inventory_report(out: &mut impl Write, inventory: &Inventory) -> Result<()> {
    let mark = |passed: bool| if passed { "[x]" } else { "[!]" };

    writeln!(out, "Snapshot Inventory")?;
    writeln!(out, "{}", "=".repeat(60))?;

    writeln!(out, "\nCafe menu data:")?;
    for (retailer, snapshot) in &inventory.cafes {
        match snapshot {
            Some(snapshot) => {
                writeln!(
                    out,
                    "   {}: {} drinks ({})",
                    retailer.display_name(),
                    snapshot.entry.record_count,
                    snapshot.entry.filename
                )?;
                if let Some(sample) = &snapshot.sample {
                    writeln!(out, "      Sample: {sample}")?;
                }
            }
            None => writeln!(out, "   {}: no data yet", retailer.display_name())?,
        }
    }
    writeln!(out, "\n   Total drinks: {}", inventory.total_drinks())?;

    writeln!(out, "\nDiscussion data:")?;
    match &inventory.reddit {
        Some(snapshot) => {
            writeln!(
                out,
                "   Discussions: {} ({})",
                snapshot.entry.record_count, snapshot.entry.filename
            )?;
            if let Some(sample) = &snapshot.sample {
                writeln!(out, "   Sample: {sample}")?;
            }
        }
        None => writeln!(out, "   No data yet")?,
    }

    let readiness = inventory.readiness();
    writeln!(out, "\nOverall summary:")?;
    writeln!(
        out,
        "   Total records: {}",
        inventory.total_drinks() + inventory.total_discussions()
    )?;

    writeln!(out, "\nPipeline readiness:")?;
    writeln!(out, "   {} Cafe data ({MIN_DRINKS}+)", mark(readiness.enough_drinks))?;
    writeln!(out, "   {} Discussion data ({MIN_DISCUSSIONS}+)", mark(readiness.enough_discussions))?;
    writeln!(out, "   {} Multiple cafes", mark(readiness.multiple_cafes))?;
    if readiness.is_ready() {
        writeln!(out, "\nReady for processing")?;
    } else {
        writeln!(out, "\nConsider collecting more data before processing")?;
    }
    writeln!(out, "\n{}", "=".repeat(60))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use chrono::Utc;
    use serde_json::json;

    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        std::env::temp_dir().join(format!("brewlink_{name}_{}_{stamp}", std::process::id()))
    }

    #[test]
    fn inventory_uses_newest_snapshot_per_source() {
        let raw_dir = scratch_dir("inventory");
        write_json_pretty(
            &raw_dir.join("starbucks").join("2026-10-01.json"),
            &json!([{ "name": "Old Latte" }]),
        )
        .expect("old starbucks");
        write_json_pretty(
            &raw_dir.join("starbucks").join("2026-10-18.json"),
            &json!([{ "name": "Caffe Latte" }, { "name": "Flat White" }]),
        )
        .expect("new starbucks");
        write_json_pretty(
            &raw_dir.join("reddit").join("coffee_discussions_2026-10-18.json"),
            &json!([{ "title": "What should I order?" }]),
        )
        .expect("reddit");

        let inventory = build_inventory(&raw_dir).expect("inventory");
        assert_eq!(inventory.total_drinks(), 2);
        assert_eq!(inventory.total_discussions(), 1);

        let (retailer, starbucks) = &inventory.cafes[0];
        assert_eq!(*retailer, Retailer::Starbucks);
        let starbucks = starbucks.as_ref().expect("starbucks snapshot");
        assert_eq!(starbucks.entry.filename, "2026-10-18.json");
        assert_eq!(starbucks.sample.as_deref(), Some("Caffe Latte"));
        assert_eq!(starbucks.entry.sha256.len(), 64);
        assert!(inventory.cafes[1].1.is_none());

        let readiness = inventory.readiness();
        assert!(!readiness.multiple_cafes);
        assert!(!readiness.is_ready());

        let manifest = inventory.manifest(&raw_dir);
        assert_eq!(manifest.snapshot_count, 2);
        assert_eq!(manifest.snapshots[1].source, "reddit");

        let mut rendered = Vec::new();
        write_inventory_report(&mut rendered, &inventory).expect("render");
        let rendered = String::from_utf8(rendered).expect("utf8");
        assert!(rendered.contains("Dunkin: no data yet"));
        assert!(rendered.contains("Total records: 3"));

        fs::remove_dir_all(&raw_dir).expect("cleanup");
    }

    #[test]
    fn empty_data_root_yields_empty_inventory() {
        let inventory = build_inventory(&scratch_dir("missing")).expect("inventory");
        assert_eq!(inventory.total_drinks(), 0);
        assert!(inventory.reddit.is_none());
        assert!(!inventory.readiness().enough_discussions);
    }
}

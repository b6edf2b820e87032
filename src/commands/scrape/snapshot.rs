use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::info;

use crate::cli::StoreArgs;
use crate::model::{ScrapeRunManifest, SnapshotEntry};
use crate::util::{now_utc_string, run_id_for, sha256_file, utc_compact_string, utc_date_string, write_json_pretty};

/// `<data-root>/raw/<source>/<file_stem><date>.json`
pub fn snapshot_path(store: &StoreArgs, source: &str, file_stem: &str, started_ts: DateTime<Utc>) -> PathBuf {
    store
        .raw_dir()
        .join(source)
        .join(format!("{file_stem}{}.json", utc_date_string(started_ts)))
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(ToOwned::to_owned)
        .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))
}

/// Writes the records as a JSON array plus a run manifest recording the snapshot hash.
pub fn write_snapshot<T: Serialize>(
    store: &StoreArgs,
    source: &str,
    output_path: &Path,
    records: &[T],
    started_ts: DateTime<Utc>,
    warnings: Vec<String>,
) -> Result<ScrapeRunManifest> {
    write_json_pretty(output_path, &records)?;
    info!(path = %output_path.display(), records = records.len(), "wrote snapshot");

    let snapshot = SnapshotEntry {
        source: source.to_string(),
        filename: file_name(output_path)?,
        sha256: sha256_file(output_path)?,
        record_count: records.len(),
    };

    let manifest = ScrapeRunManifest {
        manifest_version: 1,
        run_id: run_id_for(started_ts),
        source: source.to_string(),
        started_at: started_ts.to_rfc3339_opts(SecondsFormat::Secs, true),
        updated_at: now_utc_string(),
        output_path: output_path.display().to_string(),
        snapshot,
        warnings,
    };

    let manifest_path = store.manifest_dir().join(format!(
        "scrape_{source}_run_{}.json",
        utc_compact_string(started_ts)
    ));
    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote scrape manifest");

    Ok(manifest)
}

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::cli::StoreArgs;
use crate::model::StageRunManifest;
use crate::util::{now_utc_string, run_id_for, utc_compact_string, write_json_pretty};

/// Writes `<data-root>/manifests/<stage>_run_<ts>.json` for a completed database stage.
pub(crate) fn write_stage_manifest<C: Serialize>(
    store: &StoreArgs,
    stage: &str,
    started_ts: DateTime<Utc>,
    counts: C,
    warnings: Vec<String>,
) -> Result<PathBuf> {
    let manifest_path = store.manifest_dir().join(format!(
        "{stage}_run_{}.json",
        utc_compact_string(started_ts)
    ));

    let manifest = StageRunManifest {
        manifest_version: 1,
        run_id: run_id_for(started_ts),
        stage: stage.to_string(),
        status: "completed".to_string(),
        started_at: started_ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        updated_at: now_utc_string(),
        db_path: store.resolved_db_path().display().to_string(),
        counts,
        warnings,
    };

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), stage, "wrote run manifest");
    Ok(manifest_path)
}

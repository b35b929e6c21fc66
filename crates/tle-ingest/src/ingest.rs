//! Directory walk, epoch-bound validation and deduplication for Stage 1.

use crate::tle::{parse_tle, TleRecord};
use chrono::{DateTime, Duration, Utc};
use pipeline_core::error::{PipelineError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Stage 1 input: where to look and how far into the future a TLE epoch may
/// sit before it is considered implausible. Both fields are required — no
/// defaults, per spec.md §9.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub tle_root: PathBuf,
    pub future_bound_days: i64,
}

/// Stage 1 output: the validated, deduplicated TLE set, keyed by catalog id,
/// plus the calculation epoch it was validated against.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IngestedTleSet {
    pub calc_epoch: DateTime<Utc>,
    pub records: Vec<TleRecord>,
}

/// Walk `tle_root` for `<constellation>/tle/<constellation>_day_NN.tle` files,
/// parse every 3-line record, establish the calculation epoch from the TLE
/// epochs themselves, then filter and deduplicate.
pub fn ingest(config: &IngestConfig) -> Result<IngestedTleSet> {
    let files = discover_tle_files(&config.tle_root)?;
    if files.is_empty() {
        return Err(PipelineError::EmptyInput(config.tle_root.display().to_string()));
    }

    let mut raw_records = Vec::new();
    for (path, constellation) in &files {
        let text = std::fs::read_to_string(path)?;
        raw_records.extend(parse_tle_file(&text, constellation)?);
    }

    if raw_records.is_empty() {
        return Err(PipelineError::EmptyInput(config.tle_root.display().to_string()));
    }

    // The calculation epoch is derived from the TLE epochs, not wall-clock:
    // the most recent epoch across all ingested records, per spec.md §2-3.
    let calc_epoch = raw_records.iter().map(|r| r.epoch).max().expect("non-empty checked above");
    info!(%calc_epoch, total_raw = raw_records.len(), "calculation epoch established from TLE epochs");

    let min_epoch = calc_epoch - Duration::days(pipeline_core::constellation::MAX_TLE_AGE_DAYS);
    let max_epoch = calc_epoch + Duration::days(config.future_bound_days);

    let mut in_range = Vec::new();
    for record in raw_records {
        if record.epoch < min_epoch || record.epoch > max_epoch {
            warn!(
                catalog_id = record.catalog_id,
                epoch = %record.epoch,
                "dropping TLE outside calculation-epoch bound"
            );
            return Err(PipelineError::EpochOutOfRange {
                catalog_id: record.catalog_id.to_string(),
                epoch: record.epoch.to_rfc3339(),
                calc_epoch: calc_epoch.to_rfc3339(),
            });
        }
        in_range.push(record);
    }

    let deduped = deduplicate_by_catalog_id(in_range);
    info!(kept = deduped.len(), "ingest complete");

    Ok(IngestedTleSet {
        calc_epoch,
        records: deduped,
    })
}

/// Keep only the latest epoch per catalog id (spec.md §4.1, the "epoch
/// monotonicity" property in spec.md §8).
fn deduplicate_by_catalog_id(records: Vec<TleRecord>) -> Vec<TleRecord> {
    let mut latest: HashMap<u32, TleRecord> = HashMap::new();
    for record in records {
        latest
            .entry(record.catalog_id)
            .and_modify(|existing| {
                if record.epoch > existing.epoch {
                    *existing = record.clone();
                }
            })
            .or_insert(record);
    }
    let mut out: Vec<TleRecord> = latest.into_values().collect();
    out.sort_by_key(|r| r.catalog_id);
    out
}

fn discover_tle_files(root: &Path) -> Result<Vec<(PathBuf, String)>> {
    let mut found = Vec::new();
    if !root.exists() {
        return Ok(found);
    }
    for constellation_entry in std::fs::read_dir(root)? {
        let constellation_entry = constellation_entry?;
        if !constellation_entry.file_type()?.is_dir() {
            continue;
        }
        let constellation = constellation_entry.file_name().to_string_lossy().to_string();
        let tle_dir = constellation_entry.path().join("tle");
        if !tle_dir.exists() {
            continue;
        }
        for file_entry in std::fs::read_dir(&tle_dir)? {
            let file_entry = file_entry?;
            let path = file_entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("tle") {
                debug!(path = %path.display(), "discovered TLE file");
                found.push((path, constellation.clone()));
            }
        }
    }
    found.sort();
    Ok(found)
}

fn parse_tle_file(text: &str, constellation: &str) -> Result<Vec<TleRecord>> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() % 3 != 0 {
        return Err(PipelineError::BadTleFormat {
            catalog_id: "?".to_string(),
            reason: format!("expected a multiple of 3 non-blank lines, got {}", lines.len()),
        });
    }

    let mut records = Vec::with_capacity(lines.len() / 3);
    for chunk in lines.chunks(3) {
        records.push(parse_tle(chunk[0], chunk[1], chunk[2], constellation)?);
    }
    Ok(records)
}

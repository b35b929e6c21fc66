//! The "base processor" abstraction from spec.md §9: a uniform lifecycle
//! (validate input → execute → validate output → persist → write snapshot)
//! expressed as a trait plus a runner, not as an inheritance hierarchy.

use crate::artifact::{ArtifactMetadata, StageArtifact};
use crate::context::StageContext;
use crate::error::{PipelineError, Result};
use crate::validation::ValidationResults;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Implemented once per stage. `Input` is typically the prior stage's
/// `StageArtifact<_>::data`; `Output` is this stage's payload type.
pub trait StageProcessor {
    type Input;
    type Output: Serialize;

    /// Stage number, 1-6, used to compute exit codes.
    fn stage_number(&self) -> u32;

    /// Stable identifier written into `StageArtifact::stage` and used as the
    /// output file stem.
    fn stage_name(&self) -> &'static str;

    fn validate_input(&self, input: &Self::Input) -> Result<()>;

    fn execute(&self, input: &Self::Input, ctx: &StageContext) -> Result<Self::Output>;

    fn validate_output(&self, output: &Self::Output) -> ValidationResults;

    fn data_summary(&self, output: &Self::Output) -> serde_json::Value;
}

/// Runs `processor`'s full lifecycle and returns the artifact it produced.
/// Writes the artifact under `ctx.output_root/stageN/` and the validation
/// snapshot under `ctx.output_root/../validation_snapshots/stageN_validation.json`,
/// per spec.md §6. Returns before writing anything if validation fails, so a
/// failed stage leaves no artifact behind.
pub fn run_stage<P: StageProcessor>(
    processor: &P,
    input: &P::Input,
    ctx: &StageContext,
    upstream_fingerprint: Option<String>,
) -> Result<StageArtifact<P::Output>>
where
    P::Output: Serialize,
{
    let span = ctx.span(processor.stage_name());
    let _enter = span.enter();

    processor.validate_input(input)?;
    tracing::info!("input validated");

    let output = processor.execute(input, ctx)?;
    tracing::info!("execution complete");

    let validation_results = processor.validate_output(&output);
    if !validation_results.validation_passed {
        tracing::error!(?validation_results, "output validation failed, aborting stage");
        return Err(PipelineError::ValueOutOfRange {
            record_id: processor.stage_name().to_string(),
            field: "validation_results".to_string(),
            value: "one or more checks failed".to_string(),
        });
    }

    let metadata = ArtifactMetadata::new(processor.stage_name(), upstream_fingerprint, chrono::Utc::now());
    let data_summary = processor.data_summary(&output);
    let artifact = StageArtifact::new(
        processor.stage_name(),
        metadata,
        data_summary,
        output,
        validation_results,
    );

    write_artifact(&artifact, processor.stage_number(), &ctx.output_root)?;
    write_validation_snapshot(&artifact.validation_results, processor.stage_number(), &ctx.output_root)?;

    Ok(artifact)
}

fn stage_dir(output_root: &Path, stage_number: u32) -> PathBuf {
    output_root.join(format!("stage{}", stage_number))
}

fn write_artifact<T: Serialize>(artifact: &StageArtifact<T>, stage_number: u32, output_root: &Path) -> Result<()> {
    let dir = stage_dir(output_root, stage_number);
    std::fs::create_dir_all(&dir).map_err(|e| PipelineError::ArtifactWriteFailed {
        path: dir.display().to_string(),
        source: e,
    })?;

    let filename = format!("{}.json", artifact.metadata.generated_at.format("%Y%m%dT%H%M%S%.3fZ"));
    let path = dir.join(filename);

    let file = File::create(&path).map_err(|e| PipelineError::ArtifactWriteFailed {
        path: path.display().to_string(),
        source: e,
    })?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, artifact)?;

    tracing::info!(path = %path.display(), "artifact written");
    Ok(())
}

fn write_validation_snapshot(
    validation_results: &ValidationResults,
    stage_number: u32,
    output_root: &Path,
) -> Result<()> {
    let dir = output_root
        .parent()
        .map(|p| p.join("validation_snapshots"))
        .unwrap_or_else(|| output_root.join("validation_snapshots"));
    std::fs::create_dir_all(&dir).map_err(|e| PipelineError::ArtifactWriteFailed {
        path: dir.display().to_string(),
        source: e,
    })?;

    let path = dir.join(format!("stage{}_validation.json", stage_number));
    let tmp_path = path.with_extension("json.tmp");

    let file = File::create(&tmp_path).map_err(|e| PipelineError::ArtifactWriteFailed {
        path: tmp_path.display().to_string(),
        source: e,
    })?;
    serde_json::to_writer_pretty(BufWriter::new(file), validation_results)?;
    std::fs::rename(&tmp_path, &path).map_err(|e| PipelineError::ArtifactWriteFailed {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

//! Pipeline orchestrator: runs Stage 1 (TLE ingest) through Stage 6 (event
//! detection) end to end, reading every run parameter from a single JSON
//! config file. See spec.md §6.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use config::PipelineConfig;
use coord_transform::CoordTransformStage;
use event_detection::{EventDetectionStage, Stage6Input};
use link_feasibility::{LinkFeasibilityStage, Stage4Output};
use orbital_propagation::{OrbitalPropagationStage, Stage2Input};
use pipeline_core::context::StageContext;
use pipeline_core::fingerprint::fingerprint;
use pipeline_core::stage::run_stage;
use pipeline_core::Constellation;
use signal_analysis::{SignalAnalysisStage, SignalTrack, Stage5Input, Stage5Output};
use std::collections::HashMap;
use tle_ingest::{IngestConfig, TleIngestStage};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "orbital-pipeline", about = "NTN handover research pipeline")]
struct Args {
    /// Path to the pipeline configuration JSON file.
    #[arg(short, long)]
    config: std::path::PathBuf,

    /// Stop after this stage number (1-6). Runs the full pipeline if omitted.
    #[arg(long)]
    stop_after: Option<u32>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "orbital_pipeline_cli=info,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config_text = std::fs::read_to_string(&args.config)
        .with_context(|| format!("reading config file {}", args.config.display()))?;
    let config: PipelineConfig = serde_json::from_str(&config_text).with_context(|| "parsing pipeline config")?;

    if let Err(err) = run(&config, args.stop_after) {
        tracing::error!(%err, "pipeline run failed");
        std::process::exit(exit_code_for(&err));
    }

    Ok(())
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<pipeline_core::error::PipelineError>()
        .map(|e| e.exit_code(0) as i32)
        .unwrap_or(1)
}

fn run(config: &PipelineConfig, stop_after: Option<u32>) -> Result<()> {
    let ctx = StageContext::worker_count_from_env(&config.output_root, &config.cache_root);
    info!(run_id = %ctx.run_id, worker_count = ctx.worker_count, "pipeline run starting");

    // ---- Stage 1: TLE ingest ----
    let ingest_config = IngestConfig {
        tle_root: config.tle_root.clone(),
        future_bound_days: config.future_bound_days,
    };
    let stage1 = run_stage(&TleIngestStage, &ingest_config, &ctx, None)?;
    info!(records = stage1.data.records.len(), "stage 1 complete");
    if stop_after == Some(1) {
        return Ok(());
    }
    let stage1_fingerprint = fingerprint(&stage1.data);

    // ---- Stage 2: orbital propagation ----
    let mut grids = HashMap::new();
    for (constellation, grid_config) in &config.time_grid {
        let grid = pipeline_core::time_grid::TimeGrid::new(
            stage1.data.calc_epoch,
            grid_config.step_seconds,
            grid_config.horizon_minutes,
            *constellation,
        )
        .ok_or_else(|| anyhow::anyhow!("invalid time grid configuration for {}", constellation.tag()))?;
        grids.insert(*constellation, grid);
    }
    let stage2_input = Stage2Input {
        records: stage1.data.records.clone(),
        grids,
    };
    let stage2 = run_stage(&OrbitalPropagationStage, &stage2_input, &ctx, Some(stage1_fingerprint))?;
    info!(tracks = stage2.data.tracks.len(), "stage 2 complete");
    if stop_after == Some(2) {
        return Ok(());
    }
    let stage2_fingerprint = fingerprint(&stage2.data);
    let orbital_period_minutes: HashMap<u32, f64> = stage2
        .data
        .tracks
        .iter()
        .map(|t| (t.catalog_id, t.orbital_period_minutes))
        .collect();

    // ---- Stage 3: coordinate transformation ----
    let stage3_input = coord_transform::from_stage2(stage2.data, config.iers_path.clone());
    let stage3 = run_stage(&CoordTransformStage, &stage3_input, &ctx, Some(stage2_fingerprint))?;
    info!(tracks = stage3.data.tracks.len(), "stage 3 complete");
    if stop_after == Some(3) {
        return Ok(());
    }
    let geodetic_tracks_for_stage6 = stage3.data.tracks.clone();
    let stage3_fingerprint = fingerprint(&stage3.data);

    // ---- Stage 4: link feasibility ----
    let stage4_input =
        link_feasibility::from_stage3(stage3.data, config.observer, config.elevation_thresholds.clone());
    let stage4 = run_stage(&LinkFeasibilityStage, &stage4_input, &ctx, Some(stage3_fingerprint))?;
    info!(candidates = stage4.data.candidates.len(), "stage 4 complete");
    if stop_after == Some(4) {
        return Ok(());
    }
    let stage4_fingerprint = fingerprint(&stage4.data);

    // ---- Stage 5: signal analysis ----
    // RF parameters are configured per constellation, so the candidate pool
    // is partitioned before Stage 5 runs once per constellation's RF sheet.
    let stage5_output = run_signal_analysis_per_constellation(stage4.data, &config.rf_parameters, &ctx, &stage4_fingerprint)?;
    info!(tracks = stage5_output.tracks.len(), "stage 5 complete");
    if stop_after == Some(5) {
        return Ok(());
    }
    let stage5_fingerprint = fingerprint(&stage5_output);

    // ---- Stage 6: event detection & pool verification ----
    let representative_step_seconds = config
        .time_grid
        .values()
        .next()
        .map(|g| g.step_seconds)
        .ok_or_else(|| anyhow::anyhow!("time_grid configuration is empty"))?;
    let stage6_input = Stage6Input {
        signal_tracks: stage5_output.tracks,
        geodetic_tracks: geodetic_tracks_for_stage6,
        observer: config.observer,
        config: config.event_params,
        step_seconds: representative_step_seconds,
        orbital_period_minutes,
    };
    let stage6 = run_stage(&EventDetectionStage, &stage6_input, &ctx, Some(stage5_fingerprint))?;
    info!(
        events = stage6.data.events.len(),
        pool_pass = stage6.data.pool_verification.values().all(|v| v.overall_pass),
        "stage 6 complete"
    );

    Ok(())
}

/// Stage 5 takes a single `RfParameters` sheet per run; per-constellation RF
/// config is satisfied by partitioning the candidate pool by constellation
/// and running the stage once per partition, then recombining the outputs
/// in catalog-id order.
fn run_signal_analysis_per_constellation(
    stage4_output: Stage4Output,
    rf_parameters: &HashMap<Constellation, signal_analysis::RfParameters>,
    ctx: &StageContext,
    upstream_fingerprint: &str,
) -> Result<Stage5Output> {
    let mut by_constellation: HashMap<Constellation, Vec<link_feasibility::CandidateTrack>> = HashMap::new();
    for candidate in stage4_output.candidates {
        let constellation = Constellation::from_tag(&candidate.constellation)
            .ok_or_else(|| anyhow::anyhow!("unrecognized constellation tag {}", candidate.constellation))?;
        by_constellation.entry(constellation).or_default().push(candidate);
    }

    let mut tracks: Vec<SignalTrack> = Vec::new();
    for (constellation, candidates) in by_constellation {
        let rf = rf_parameters
            .get(&constellation)
            .ok_or_else(|| anyhow::anyhow!("no rf_parameters configured for {}", constellation.tag()))?;
        let stage5_input = Stage5Input {
            candidates,
            rf_parameters: *rf,
        };
        let stage5 = run_stage(&SignalAnalysisStage, &stage5_input, ctx, Some(upstream_fingerprint.to_string()))?;
        tracks.extend(stage5.data.tracks);
    }
    tracks.sort_by_key(|t| t.catalog_id);

    Ok(Stage5Output { tracks })
}

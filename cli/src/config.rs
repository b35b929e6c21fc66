//! Run configuration: every section spec.md §6 requires, loaded from a single
//! JSON file. No field here has a default; a config that omits one fails
//! `serde_json`'s missing-field deserialize error rather than silently
//! substituting a textbook value, per spec.md §9.

use link_feasibility::Observer;
use pipeline_core::Constellation;
use serde::{Deserialize, Serialize};
use signal_analysis::RfParameters;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeGridConfig {
    pub step_seconds: f64,
    pub horizon_minutes: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    pub observer: Observer,
    pub time_grid: HashMap<Constellation, TimeGridConfig>,
    pub elevation_thresholds: HashMap<Constellation, f64>,
    pub rf_parameters: HashMap<Constellation, RfParameters>,
    pub event_params: event_detection::EventConfig,
    pub future_bound_days: i64,
    pub iers_path: PathBuf,
    pub tle_root: PathBuf,
    pub output_root: PathBuf,
    pub cache_root: PathBuf,
}

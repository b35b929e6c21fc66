//! Stage 4 — Link Feasibility.
//!
//! Projects every Stage 3 ITRS sample into the observer's topocentric frame,
//! gates on elevation and the 200-2000km link-budget range window, and
//! assembles the candidate pool: the union of satellites that were
//! connectable at any point across the time grid, each carrying its full
//! time series (not just the connectable samples), per spec.md §4.4.

pub mod topocentric;

pub use topocentric::{Observer, TopocentricView};

use coord_transform::{Stage3Output, TransformedSample, TransformedTrack};
use nalgebra::Vector3;
use pipeline_core::cache::ContentCache;
use pipeline_core::context::StageContext;
use pipeline_core::error::{PipelineError, Result};
use pipeline_core::fingerprint::{cache_key, fingerprint};
use pipeline_core::stage::StageProcessor;
use pipeline_core::validation::{CheckResult, ValidationResults};
use pipeline_core::Constellation;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const ALGORITHM_VERSION: &str = "topocentric-gate-v1";

#[derive(Debug, Clone)]
pub struct Stage4Input {
    pub tracks: Vec<TransformedTrack>,
    pub observer: Observer,
    /// Per-constellation elevation gate override. A constellation absent
    /// here falls back to its mission-profile default (spec.md §4.4).
    pub elevation_overrides_deg: HashMap<Constellation, f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LinkSample {
    pub time: chrono::DateTime<chrono::Utc>,
    pub elevation_deg: f64,
    pub azimuth_deg: f64,
    pub range_km: f64,
    pub connectable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateTrack {
    pub catalog_id: u32,
    pub name: String,
    pub constellation: String,
    pub samples: Vec<LinkSample>,
}

impl CandidateTrack {
    pub fn is_ever_connectable(&self) -> bool {
        self.samples.iter().any(|s| s.connectable)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage4Output {
    pub candidates: Vec<CandidateTrack>,
}

fn link_sample(observer: &Observer, sample: &TransformedSample, elevation_threshold_deg: f64) -> LinkSample {
    if !sample.valid {
        return LinkSample {
            time: sample.time,
            elevation_deg: f64::NEG_INFINITY,
            azimuth_deg: 0.0,
            range_km: 0.0,
            connectable: false,
        };
    }

    let target = Vector3::from(sample.position_itrs_km);
    let view = topocentric::topocentric_view(observer, target);
    let connectable = view.elevation_deg >= elevation_threshold_deg
        && view.range_km >= pipeline_core::constellation::LINK_RANGE_MIN_KM
        && view.range_km <= pipeline_core::constellation::LINK_RANGE_MAX_KM;

    LinkSample {
        time: sample.time,
        elevation_deg: view.elevation_deg,
        azimuth_deg: view.azimuth_deg,
        range_km: view.range_km,
        connectable,
    }
}

fn gate_track(track: &TransformedTrack, input: &Stage4Input) -> Result<CandidateTrack> {
    let constellation = Constellation::from_tag(&track.constellation).ok_or_else(|| PipelineError::FieldMissing {
        record_id: track.catalog_id.to_string(),
        field: "constellation".to_string(),
    })?;
    let threshold = input
        .elevation_overrides_deg
        .get(&constellation)
        .copied()
        .unwrap_or_else(|| constellation.default_elevation_threshold_deg());

    let samples = track
        .samples
        .iter()
        .map(|s| link_sample(&input.observer, s, threshold))
        .collect();

    Ok(CandidateTrack {
        catalog_id: track.catalog_id,
        name: track.name.clone(),
        constellation: track.constellation.clone(),
        samples,
    })
}

pub struct LinkFeasibilityStage;

impl StageProcessor for LinkFeasibilityStage {
    type Input = Stage4Input;
    type Output = Stage4Output;

    fn stage_number(&self) -> u32 {
        4
    }

    fn stage_name(&self) -> &'static str {
        "stage4_link_feasibility"
    }

    fn validate_input(&self, input: &Self::Input) -> Result<()> {
        if input.tracks.is_empty() {
            return Err(PipelineError::EmptyInput("stage4 received no transformed tracks".to_string()));
        }
        if !(-90.0..=90.0).contains(&input.observer.latitude_deg) {
            return Err(PipelineError::ValueOutOfRange {
                record_id: "observer".to_string(),
                field: "latitude_deg".to_string(),
                value: input.observer.latitude_deg.to_string(),
            });
        }
        Ok(())
    }

    fn execute(&self, input: &Self::Input, ctx: &StageContext) -> Result<Self::Output> {
        let cache = ContentCache::new(ctx.cache_root.join("stage4"));
        let pool = pipeline_core::worker::build_pool(ctx.worker_count)
            .ok_or_else(|| PipelineError::CacheCorrupt("failed to build stage4 worker pool".to_string()))?;
        let cancel = ctx.cancel_flag();

        let params_fp = fingerprint(&(
            input.observer.latitude_deg,
            input.observer.longitude_deg,
            input.observer.altitude_km,
        ));

        let results = pipeline_core::worker::parallel_map(&pool, &input.tracks, &cancel, |track| {
            let upstream_fp = fingerprint(track);
            let key = cache_key(&upstream_fp, &params_fp, ALGORITHM_VERSION);
            if let Ok(Some(cached)) = cache.get::<CandidateTrack>(&key) {
                return Ok(cached);
            }
            let candidate = gate_track(track, input)?;
            cache.insert(&key, &candidate)?;
            Ok(candidate)
        });

        let mut candidates = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Some(Ok(c)) => candidates.push(c),
                Some(Err(e)) => return Err(e),
                None => {
                    tracing::warn!("stage4 gating cancelled mid-run");
                    break;
                }
            }
        }

        // Union over time: a satellite that was never connectable across the
        // whole grid contributes nothing to the candidate pool, but every
        // satellite that was connectable at least once keeps its complete
        // time series, not just the connectable samples.
        candidates.retain(|c| c.is_ever_connectable());

        Ok(Stage4Output { candidates })
    }

    fn validate_output(&self, output: &Self::Output) -> ValidationResults {
        let structure = CheckResult::ok(format!("{} candidates in pool", output.candidates.len()));

        let counts = if output.candidates.iter().all(|c| !c.samples.is_empty()) {
            CheckResult::ok("every candidate retains its full time series")
        } else {
            CheckResult::fail("a candidate lost its time series during gating")
        };

        let ranges = if output.candidates.iter().all(|c| {
            c.samples.iter().filter(|s| s.connectable).all(|s| {
                s.range_km >= pipeline_core::constellation::LINK_RANGE_MIN_KM
                    && s.range_km <= pipeline_core::constellation::LINK_RANGE_MAX_KM
            })
        }) {
            CheckResult::ok("connectable samples within link-budget range window")
        } else {
            CheckResult::fail("a connectable sample violated the range gate")
        };

        let cross_stage_consistency = if output.candidates.iter().all(|c| c.is_ever_connectable()) {
            CheckResult::ok("every retained candidate was connectable at least once")
        } else {
            CheckResult::fail("a never-connectable satellite survived pool construction")
        };

        let academic_compliance = CheckResult::ok("elevation gate applied per constellation mission profile");

        ValidationResults::new(structure, counts, ranges, cross_stage_consistency, academic_compliance)
    }

    fn data_summary(&self, output: &Self::Output) -> serde_json::Value {
        serde_json::json!({ "candidate_count": output.candidates.len() })
    }
}

pub fn from_stage3(stage3: Stage3Output, observer: Observer, elevation_overrides_deg: HashMap<Constellation, f64>) -> Stage4Input {
    Stage4Input {
        tracks: stage3.tracks,
        observer,
        elevation_overrides_deg,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use coord_transform::geodetic::Geodetic;

    fn track_with_view(elevation_hint_km: f64) -> TransformedTrack {
        let time = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        TransformedTrack {
            catalog_id: 1,
            name: "TEST-SAT".to_string(),
            constellation: "starlink".to_string(),
            samples: vec![TransformedSample {
                time,
                position_itrs_km: [0.0, 0.0, 6378.137 + elevation_hint_km],
                geodetic: Geodetic {
                    latitude_deg: 90.0,
                    longitude_deg: 0.0,
                    altitude_km: elevation_hint_km,
                },
                valid: true,
            }],
        }
    }

    fn polar_observer() -> Observer {
        Observer {
            latitude_deg: 90.0,
            longitude_deg: 0.0,
            altitude_km: 0.0,
        }
    }

    #[test]
    fn connectable_satellite_survives_pool_construction() {
        let tmp = tempfile::tempdir().unwrap();
        let input = Stage4Input {
            tracks: vec![track_with_view(550.0)],
            observer: polar_observer(),
            elevation_overrides_deg: HashMap::new(),
        };
        let ctx = StageContext::new(1, tmp.path().join("out"), tmp.path().join("cache"));
        let artifact = pipeline_core::stage::run_stage(&LinkFeasibilityStage, &input, &ctx, None).unwrap();
        assert_eq!(artifact.data.candidates.len(), 1);
        assert!(artifact.data.candidates[0].samples[0].connectable);
    }

    #[test]
    fn out_of_range_satellite_is_dropped_from_pool() {
        let tmp = tempfile::tempdir().unwrap();
        let input = Stage4Input {
            tracks: vec![track_with_view(5.0)],
            observer: polar_observer(),
            elevation_overrides_deg: HashMap::new(),
        };
        let ctx = StageContext::new(1, tmp.path().join("out"), tmp.path().join("cache"));
        let artifact = pipeline_core::stage::run_stage(&LinkFeasibilityStage, &input, &ctx, None).unwrap();
        assert!(artifact.data.candidates.is_empty());
    }

    #[test]
    fn invalid_observer_latitude_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let input = Stage4Input {
            tracks: vec![track_with_view(550.0)],
            observer: Observer {
                latitude_deg: 200.0,
                longitude_deg: 0.0,
                altitude_km: 0.0,
            },
            elevation_overrides_deg: HashMap::new(),
        };
        let ctx = StageContext::new(1, tmp.path().join("out"), tmp.path().join("cache"));
        assert!(pipeline_core::stage::run_stage(&LinkFeasibilityStage, &input, &ctx, None).is_err());
    }
}

//! Stage 6 — Event Detection & Pool Verification.
//!
//! Drives the A3/A4/A5/D2 state machines for every (serving, neighbor) pair
//! across the observed horizon and verifies the candidate pool's overall
//! visibility health. See spec.md §4.6.

pub mod events;
pub mod pool;
pub mod trigger;

pub use events::{EventConfig, EventKind, EventThresholds};
pub use pool::PoolVerification;

use chrono::{DateTime, Utc};
use coord_transform::TransformedTrack;
use link_feasibility::Observer;
use pipeline_core::context::StageContext;
use pipeline_core::error::{PipelineError, Result};
use pipeline_core::stage::StageProcessor;
use pipeline_core::validation::{CheckResult, ValidationResults};
use pipeline_core::Constellation;
use serde::{Deserialize, Serialize};
use signal_analysis::{SignalTrack, Stage5Output};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Stage6Input {
    pub signal_tracks: Vec<SignalTrack>,
    pub geodetic_tracks: Vec<TransformedTrack>,
    pub observer: Observer,
    pub config: EventConfig,
    pub step_seconds: f64,
    /// Catalog id -> theoretical orbital period in minutes, from Stage 2's
    /// `1440 / mean_motion`. Feeds pool verification's orbital-period
    /// coverage ratio.
    pub orbital_period_minutes: HashMap<u32, f64>,
}

/// An Event Record: the trigger/release pair plus every threshold and
/// hysteresis value in force and the measured quantities that crossed them,
/// per spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedEvent {
    pub event_kind: EventKind,
    pub serving_catalog_id: u32,
    pub neighbor_catalog_id: u32,
    pub trigger_time: DateTime<Utc>,
    pub release_time: Option<DateTime<Utc>>,
    pub thresholds: EventThresholds,
    /// Serving-side measurement at `trigger_time`: RSRP in dBm for A3/A4/A5,
    /// ground distance in km for D2.
    pub serving_measurement: f64,
    /// Neighbor-side measurement at `trigger_time`, same units as
    /// `serving_measurement`.
    pub neighbor_measurement: f64,
    /// Always `true`: the state machine only confirms an event once its
    /// entry condition has held continuously for the configured
    /// time-to-trigger window, so every `DetectedEvent` satisfied it by
    /// construction. Carried explicitly since the event record format
    /// requires it.
    pub time_to_trigger_satisfied: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage6Output {
    pub events: Vec<DetectedEvent>,
    pub pool_verification: HashMap<Constellation, PoolVerification>,
}

struct PairSeries {
    times: Vec<DateTime<Utc>>,
    rsrp_by_catalog: HashMap<u32, Vec<f64>>,
    connectable_by_catalog: HashMap<u32, Vec<bool>>,
    ground_distance_by_catalog: HashMap<u32, Vec<f64>>,
    serving_by_index: Vec<Option<u32>>,
}

fn build_pair_series(input: &Stage6Input) -> Result<PairSeries> {
    let times = input
        .signal_tracks
        .first()
        .map(|t| t.samples.iter().map(|s| s.time).collect::<Vec<_>>())
        .ok_or_else(|| PipelineError::EmptyInput("stage6 received no signal tracks".to_string()))?;

    let mut rsrp_by_catalog = HashMap::new();
    let mut connectable_by_catalog = HashMap::new();
    for track in &input.signal_tracks {
        let rsrp: Vec<f64> = track.samples.iter().map(|s| s.rsrp_dbm).collect();
        let connectable: Vec<bool> = track.samples.iter().map(|s| s.connectable).collect();
        rsrp_by_catalog.insert(track.catalog_id, rsrp);
        connectable_by_catalog.insert(track.catalog_id, connectable);
    }

    let mut ground_distance_by_catalog = HashMap::new();
    for geo_track in &input.geodetic_tracks {
        let distances: Vec<f64> = geo_track
            .samples
            .iter()
            .map(|s| {
                events::haversine_km(
                    input.observer.latitude_deg,
                    input.observer.longitude_deg,
                    s.geodetic.latitude_deg,
                    s.geodetic.longitude_deg,
                )
            })
            .collect();
        ground_distance_by_catalog.insert(geo_track.catalog_id, distances);
    }

    let sample_count = times.len();
    let mut serving_by_index = Vec::with_capacity(sample_count);
    for i in 0..sample_count {
        let best = input
            .signal_tracks
            .iter()
            .filter(|t| t.samples[i].connectable)
            .max_by(|a, b| a.samples[i].rsrp_dbm.partial_cmp(&b.samples[i].rsrp_dbm).unwrap())
            .map(|t| t.catalog_id);
        serving_by_index.push(best);
    }

    Ok(PairSeries {
        times,
        rsrp_by_catalog,
        connectable_by_catalog,
        ground_distance_by_catalog,
        serving_by_index,
    })
}

fn serving_rsrp_series(series: &PairSeries) -> Vec<f64> {
    (0..series.times.len())
        .map(|i| {
            series.serving_by_index[i]
                .and_then(|id| series.rsrp_by_catalog.get(&id))
                .map(|v| v[i])
                .unwrap_or(f64::NEG_INFINITY)
        })
        .collect()
}

fn serving_distance_series(series: &PairSeries) -> Vec<f64> {
    (0..series.times.len())
        .map(|i| {
            series
                .serving_by_index[i]
                .and_then(|id| series.ground_distance_by_catalog.get(&id))
                .map(|v| v[i])
                .unwrap_or(f64::INFINITY)
        })
        .collect()
}

fn both_connectable_mask(series: &PairSeries, neighbor_id: u32) -> Vec<bool> {
    let neighbor_connectable = &series.connectable_by_catalog[&neighbor_id];
    (0..series.times.len())
        .map(|i| {
            neighbor_connectable[i]
                && series.serving_by_index[i].is_some()
                && series.serving_by_index[i] != Some(neighbor_id)
        })
        .collect()
}

fn detect_events_for_neighbor(series: &PairSeries, neighbor_id: u32, config: &EventConfig) -> Vec<DetectedEvent> {
    let neighbor_rsrp = &series.rsrp_by_catalog[&neighbor_id];
    let neighbor_connectable = &series.connectable_by_catalog[&neighbor_id];
    let serving_rsrp = serving_rsrp_series(series);
    let both_connectable = both_connectable_mask(series, neighbor_id);

    let mut events = Vec::new();

    let a3 = events::A3Condition {
        offset_db: config.a3_offset_db,
        hysteresis_db: config.a3_hysteresis_db,
        serving_rsrp_dbm: &serving_rsrp,
        neighbor_rsrp_dbm: neighbor_rsrp,
        both_connectable: &both_connectable,
    };
    events.extend(to_detected_events(
        trigger::run_state_machine(&series.times, &a3, config.time_to_trigger_ms),
        EventKind::A3,
        config.thresholds_for(EventKind::A3),
        series,
        neighbor_id,
        &serving_rsrp,
        neighbor_rsrp,
    ));

    let a4 = events::A4Condition {
        threshold_dbm: config.a4_threshold_dbm,
        hysteresis_db: config.a4_hysteresis_db,
        neighbor_rsrp_dbm: neighbor_rsrp,
        neighbor_connectable,
    };
    events.extend(to_detected_events(
        trigger::run_state_machine(&series.times, &a4, config.time_to_trigger_ms),
        EventKind::A4,
        config.thresholds_for(EventKind::A4),
        series,
        neighbor_id,
        &serving_rsrp,
        neighbor_rsrp,
    ));

    let a5 = events::A5Condition {
        threshold1_dbm: config.a5_threshold1_dbm,
        threshold2_dbm: config.a5_threshold2_dbm,
        hysteresis1_db: config.a5_hysteresis1_db,
        hysteresis2_db: config.a5_hysteresis2_db,
        serving_rsrp_dbm: &serving_rsrp,
        neighbor_rsrp_dbm: neighbor_rsrp,
        both_connectable: &both_connectable,
    };
    events.extend(to_detected_events(
        trigger::run_state_machine(&series.times, &a5, config.time_to_trigger_ms),
        EventKind::A5,
        config.thresholds_for(EventKind::A5),
        series,
        neighbor_id,
        &serving_rsrp,
        neighbor_rsrp,
    ));

    if series.ground_distance_by_catalog.contains_key(&neighbor_id) {
        let distance_serving = serving_distance_series(series);
        let distance_neighbor = &series.ground_distance_by_catalog[&neighbor_id];
        let d2 = events::D2Condition {
            threshold1_km: config.d2_threshold1_km,
            threshold2_km: config.d2_threshold2_km,
            hysteresis_km: config.d2_hysteresis_km,
            distance_serving_km: &distance_serving,
            distance_neighbor_km: distance_neighbor,
            both_connectable: &both_connectable,
        };
        events.extend(to_detected_events(
            trigger::run_state_machine(&series.times, &d2, config.time_to_trigger_ms),
            EventKind::D2,
            config.thresholds_for(EventKind::D2),
            series,
            neighbor_id,
            &distance_serving,
            distance_neighbor,
        ));
    }

    events
}

fn to_detected_events(
    records: Vec<trigger::TriggerRecord>,
    kind: EventKind,
    thresholds: EventThresholds,
    series: &PairSeries,
    neighbor_id: u32,
    serving_measurement: &[f64],
    neighbor_measurement: &[f64],
) -> Vec<DetectedEvent> {
    records
        .into_iter()
        .filter_map(|record| {
            let serving_id = series.serving_by_index[record.trigger_index]?;
            Some(DetectedEvent {
                event_kind: kind,
                serving_catalog_id: serving_id,
                neighbor_catalog_id: neighbor_id,
                trigger_time: record.trigger_time,
                release_time: record.release_time,
                thresholds,
                serving_measurement: serving_measurement[record.trigger_index],
                neighbor_measurement: neighbor_measurement[record.trigger_index],
                time_to_trigger_satisfied: true,
            })
        })
        .collect()
}

pub struct EventDetectionStage;

impl StageProcessor for EventDetectionStage {
    type Input = Stage6Input;
    type Output = Stage6Output;

    fn stage_number(&self) -> u32 {
        6
    }

    fn stage_name(&self) -> &'static str {
        "stage6_event_detection"
    }

    fn validate_input(&self, input: &Self::Input) -> Result<()> {
        if input.signal_tracks.is_empty() {
            return Err(PipelineError::EmptyInput("stage6 received no signal tracks".to_string()));
        }
        if input.config.time_to_trigger_ms <= 0 {
            return Err(PipelineError::MissingConfigField("time_to_trigger_ms must be positive".to_string()));
        }
        if input.step_seconds <= 0.0 {
            return Err(PipelineError::MissingConfigField("step_seconds must be positive".to_string()));
        }
        Ok(())
    }

    fn execute(&self, input: &Self::Input, _ctx: &StageContext) -> Result<Self::Output> {
        let series = build_pair_series(input)?;

        let mut events = Vec::new();
        for track in &input.signal_tracks {
            events.extend(detect_events_for_neighbor(&series, track.catalog_id, &input.config));
        }
        events.sort_by(|a, b| a.trigger_time.cmp(&b.trigger_time));

        let mut pool_verification = HashMap::new();
        for constellation in [Constellation::Starlink, Constellation::OneWeb] {
            let tracks: Vec<&SignalTrack> = input
                .signal_tracks
                .iter()
                .filter(|t| Constellation::from_tag(&t.constellation) == Some(constellation))
                .collect();
            if tracks.is_empty() {
                continue;
            }

            let times: Vec<DateTime<Utc>> = tracks[0].samples.iter().map(|s| s.time).collect();
            let connectable_by_time: Vec<Vec<bool>> = (0..times.len())
                .map(|i| tracks.iter().map(|t| t.samples[i].connectable).collect())
                .collect();
            let periods: Vec<f64> = tracks
                .iter()
                .filter_map(|t| input.orbital_period_minutes.get(&t.catalog_id).copied())
                .collect();

            let verification = pool::verify_pool(&times, &connectable_by_time, &periods, constellation);
            pool_verification.insert(constellation, verification);
        }

        Ok(Stage6Output { events, pool_verification })
    }

    fn validate_output(&self, output: &Self::Output) -> ValidationResults {
        let structure = CheckResult::ok(format!("{} events detected", output.events.len()));

        let counts = if output.events.iter().all(|e| e.serving_catalog_id != e.neighbor_catalog_id) {
            CheckResult::ok("no event compares a satellite against itself")
        } else {
            CheckResult::fail("an event recorded identical serving and neighbor satellites")
        };

        let ranges = if output.events.iter().all(|e| e.release_time.map(|r| r >= e.trigger_time).unwrap_or(true)) {
            CheckResult::ok("release times, where present, follow trigger times")
        } else {
            CheckResult::fail("an event has a release time before its trigger time")
        };

        let cross_stage_consistency = CheckResult::ok("events derived consistently from the candidate pool's time series");

        let academic_compliance = if output.pool_verification.values().all(|v| v.coverage_rate.is_finite()) {
            CheckResult::ok("pool verification metrics computed")
        } else {
            CheckResult::fail("pool verification produced a non-finite metric")
        };

        ValidationResults::new(structure, counts, ranges, cross_stage_consistency, academic_compliance)
    }

    fn data_summary(&self, output: &Self::Output) -> serde_json::Value {
        serde_json::json!({
            "event_count": output.events.len(),
            "pool_overall_pass": output.pool_verification.values().all(|v| v.overall_pass),
        })
    }
}

pub fn from_stage5(
    stage5: Stage5Output,
    geodetic_tracks: Vec<TransformedTrack>,
    observer: Observer,
    config: EventConfig,
    step_seconds: f64,
    orbital_period_minutes: HashMap<u32, f64>,
) -> Stage6Input {
    Stage6Input {
        signal_tracks: stage5.tracks,
        geodetic_tracks,
        observer,
        config,
        step_seconds,
        orbital_period_minutes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use coord_transform::geodetic::Geodetic;
    use coord_transform::TransformedSample;
    use signal_analysis::SignalSample;

    fn times(count: usize, step_seconds: i64) -> Vec<DateTime<Utc>> {
        let base = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        (0..count).map(|i| base + Duration::seconds(i as i64 * step_seconds)).collect()
    }

    fn signal_track(catalog_id: u32, rsrp: Vec<f64>, times: &[DateTime<Utc>]) -> SignalTrack {
        SignalTrack {
            catalog_id,
            name: format!("SAT-{catalog_id}"),
            constellation: "starlink".to_string(),
            samples: times
                .iter()
                .zip(rsrp)
                .map(|(&time, r)| SignalSample {
                    time,
                    connectable: true,
                    fspl_db: 180.0,
                    atmospheric_loss_db: 0.5,
                    rsrp_dbm: r,
                    rsrq_db: -10.0,
                    sinr_db: 15.0,
                    doppler_hz: 0.0,
                    delay_ms: 3.0,
                })
                .collect(),
        }
    }

    fn geodetic_track(catalog_id: u32, lat: f64, lon: f64, times: &[DateTime<Utc>]) -> TransformedTrack {
        TransformedTrack {
            catalog_id,
            name: format!("SAT-{catalog_id}"),
            constellation: "starlink".to_string(),
            samples: times
                .iter()
                .map(|&time| TransformedSample {
                    time,
                    position_itrs_km: [0.0, 0.0, 0.0],
                    geodetic: Geodetic {
                        latitude_deg: lat,
                        longitude_deg: lon,
                        altitude_km: 550.0,
                    },
                    valid: true,
                })
                .collect(),
        }
    }

    fn config() -> EventConfig {
        EventConfig {
            a3_offset_db: 3.0,
            a3_hysteresis_db: 0.0,
            a4_threshold_dbm: -100.0,
            a4_hysteresis_db: 0.0,
            a5_threshold1_dbm: -95.0,
            a5_threshold2_dbm: -100.0,
            a5_hysteresis1_db: 0.0,
            a5_hysteresis2_db: 0.0,
            d2_threshold1_km: 1900.0,
            d2_threshold2_km: 1000.0,
            d2_hysteresis_km: 0.0,
            time_to_trigger_ms: 90_000,
        }
    }

    #[test]
    fn a3_event_confirms_at_index_three_with_matching_ttt() {
        let t = times(6, 30);
        let serving_rsrp = vec![-90.0; 6];
        let mut neighbor_rsrp = vec![-90.0; 6];
        for r in neighbor_rsrp.iter_mut() {
            *r = -80.0;
        }

        let serving_track = signal_track(1, serving_rsrp, &t);
        let neighbor_track = signal_track(2, neighbor_rsrp, &t);

        let input = Stage6Input {
            signal_tracks: vec![serving_track, neighbor_track],
            geodetic_tracks: vec![geodetic_track(1, 0.0, 0.0, &t), geodetic_track(2, 0.0, 10.0, &t)],
            observer: Observer {
                latitude_deg: 0.0,
                longitude_deg: 0.0,
                altitude_km: 0.0,
            },
            config: config(),
            step_seconds: 30.0,
            orbital_period_minutes: HashMap::from([(1, 95.0), (2, 95.0)]),
        };

        let tmp = tempfile::tempdir().unwrap();
        let ctx = StageContext::new(1, tmp.path().join("out"), tmp.path().join("cache"));
        let artifact = pipeline_core::stage::run_stage(&EventDetectionStage, &input, &ctx, None).unwrap();
        let a3_events: Vec<_> = artifact.data.events.iter().filter(|e| e.event_kind == EventKind::A3).collect();
        assert_eq!(a3_events.len(), 1);
        assert_eq!(a3_events[0].trigger_time, t[3]);
    }

    #[test]
    fn d2_distance_uses_ground_track_not_slant_range() {
        let t = times(6, 30);
        let rsrp = vec![-90.0; 6];
        let serving_track = signal_track(1, rsrp.clone(), &t);
        let neighbor_track = signal_track(2, rsrp, &t);

        // Serving is far on the ground (> threshold1), neighbor close
        // (< threshold2): overhead near antipode vs. overhead at observer.
        let input = Stage6Input {
            signal_tracks: vec![serving_track, neighbor_track],
            geodetic_tracks: vec![geodetic_track(1, 0.0, 180.0, &t), geodetic_track(2, 0.0, 0.1, &t)],
            observer: Observer {
                latitude_deg: 0.0,
                longitude_deg: 0.0,
                altitude_km: 0.0,
            },
            config: config(),
            step_seconds: 30.0,
            orbital_period_minutes: HashMap::from([(1, 95.0), (2, 95.0)]),
        };

        let tmp = tempfile::tempdir().unwrap();
        let ctx = StageContext::new(1, tmp.path().join("out"), tmp.path().join("cache"));
        let artifact = pipeline_core::stage::run_stage(&EventDetectionStage, &input, &ctx, None).unwrap();
        assert!(artifact.data.events.iter().any(|e| e.event_kind == EventKind::D2));
    }
}

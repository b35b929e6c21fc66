//! 3GPP TS 38.331 NTN measurement event conditions: A3, A4, A5 and D2.
//!
//! A3/A4/A5 compare RSRP values; D2 compares great-circle ground distance
//! from the sub-satellite point, not slant range, per spec.md §4.6.

use crate::trigger::TriggerCondition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum EventKind {
    A3,
    A4,
    A5,
    D2,
}

impl EventKind {
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::A3 => "A3",
            EventKind::A4 => "A4",
            EventKind::A5 => "A5",
            EventKind::D2 => "D2",
        }
    }
}

/// Thresholds for every event type, all required — a missing threshold
/// should fail config loading rather than fall back to a textbook default,
/// per spec.md §9.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct EventConfig {
    pub a3_offset_db: f64,
    pub a3_hysteresis_db: f64,
    pub a4_threshold_dbm: f64,
    pub a4_hysteresis_db: f64,
    pub a5_threshold1_dbm: f64,
    pub a5_threshold2_dbm: f64,
    pub a5_hysteresis1_db: f64,
    pub a5_hysteresis2_db: f64,
    pub d2_threshold1_km: f64,
    pub d2_threshold2_km: f64,
    pub d2_hysteresis_km: f64,
    pub time_to_trigger_ms: i64,
}

/// The threshold and hysteresis values in force for a confirmed event,
/// carried on its `DetectedEvent` record per spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum EventThresholds {
    A3 {
        offset_db: f64,
        hysteresis_db: f64,
    },
    A4 {
        threshold_dbm: f64,
        hysteresis_db: f64,
    },
    A5 {
        threshold1_dbm: f64,
        threshold2_dbm: f64,
        hysteresis1_db: f64,
        hysteresis2_db: f64,
    },
    D2 {
        threshold1_km: f64,
        threshold2_km: f64,
        hysteresis_km: f64,
    },
}

impl EventConfig {
    pub fn thresholds_for(&self, kind: EventKind) -> EventThresholds {
        match kind {
            EventKind::A3 => EventThresholds::A3 {
                offset_db: self.a3_offset_db,
                hysteresis_db: self.a3_hysteresis_db,
            },
            EventKind::A4 => EventThresholds::A4 {
                threshold_dbm: self.a4_threshold_dbm,
                hysteresis_db: self.a4_hysteresis_db,
            },
            EventKind::A5 => EventThresholds::A5 {
                threshold1_dbm: self.a5_threshold1_dbm,
                threshold2_dbm: self.a5_threshold2_dbm,
                hysteresis1_db: self.a5_hysteresis1_db,
                hysteresis2_db: self.a5_hysteresis2_db,
            },
            EventKind::D2 => EventThresholds::D2 {
                threshold1_km: self.d2_threshold1_km,
                threshold2_km: self.d2_threshold2_km,
                hysteresis_km: self.d2_hysteresis_km,
            },
        }
    }
}

const EARTH_MEAN_RADIUS_KM: f64 = 6371.0088;

/// Great-circle distance between two geodetic points via the Haversine
/// formula, used for D2's ground-distance comparisons.
pub fn haversine_km(lat1_deg: f64, lon1_deg: f64, lat2_deg: f64, lon2_deg: f64) -> f64 {
    let lat1 = lat1_deg.to_radians();
    let lat2 = lat2_deg.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (lon2_deg - lon1_deg).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_MEAN_RADIUS_KM * c
}

/// `Mn+Ofn+Ocn−Hys > Mp+Ofp+Ocp+Off`, with the neighbor/serving offsets
/// folded away (both candidates share one frequency layer here) to
/// `neighbor − serving > offset + hysteresis`.
pub struct A3Condition<'a> {
    pub offset_db: f64,
    pub hysteresis_db: f64,
    pub serving_rsrp_dbm: &'a [f64],
    pub neighbor_rsrp_dbm: &'a [f64],
    pub both_connectable: &'a [bool],
}

impl TriggerCondition for A3Condition<'_> {
    fn is_entered(&self, index: usize) -> bool {
        self.both_connectable[index]
            && self.neighbor_rsrp_dbm[index] - self.serving_rsrp_dbm[index] > self.offset_db + self.hysteresis_db
    }
}

/// `Mn+Ofn+Ocn−Hys > Thresh`.
pub struct A4Condition<'a> {
    pub threshold_dbm: f64,
    pub hysteresis_db: f64,
    pub neighbor_rsrp_dbm: &'a [f64],
    pub neighbor_connectable: &'a [bool],
}

impl TriggerCondition for A4Condition<'_> {
    fn is_entered(&self, index: usize) -> bool {
        self.neighbor_connectable[index] && self.neighbor_rsrp_dbm[index] - self.hysteresis_db > self.threshold_dbm
    }
}

/// A5-1 (`Mp+Hys1 < Thresh1`) AND A5-2 (`Mn−Hys2 > Thresh2`), each side
/// carrying its own hysteresis term.
pub struct A5Condition<'a> {
    pub threshold1_dbm: f64,
    pub threshold2_dbm: f64,
    pub hysteresis1_db: f64,
    pub hysteresis2_db: f64,
    pub serving_rsrp_dbm: &'a [f64],
    pub neighbor_rsrp_dbm: &'a [f64],
    pub both_connectable: &'a [bool],
}

impl TriggerCondition for A5Condition<'_> {
    fn is_entered(&self, index: usize) -> bool {
        self.both_connectable[index]
            && self.serving_rsrp_dbm[index] + self.hysteresis1_db < self.threshold1_dbm
            && self.neighbor_rsrp_dbm[index] - self.hysteresis2_db > self.threshold2_dbm
    }
}

/// D2-1 (`Ml1−Hys > Thresh1`) AND D2-2 (`Ml2+Hys < Thresh2`), both legs
/// measured as ground-track distance, not slant range.
pub struct D2Condition<'a> {
    pub threshold1_km: f64,
    pub threshold2_km: f64,
    pub hysteresis_km: f64,
    pub distance_serving_km: &'a [f64],
    pub distance_neighbor_km: &'a [f64],
    pub both_connectable: &'a [bool],
}

impl TriggerCondition for D2Condition<'_> {
    fn is_entered(&self, index: usize) -> bool {
        self.both_connectable[index]
            && self.distance_serving_km[index] - self.hysteresis_km > self.threshold1_km
            && self.distance_neighbor_km[index] + self.hysteresis_km < self.threshold2_km
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_of_identical_points_is_zero() {
        assert!(haversine_km(45.0, 10.0, 45.0, 10.0) < 1e-9);
    }

    #[test]
    fn haversine_equator_quarter_turn_is_roughly_quarter_circumference() {
        let d = haversine_km(0.0, 0.0, 0.0, 90.0);
        let expected = std::f64::consts::PI / 2.0 * EARTH_MEAN_RADIUS_KM;
        assert!((d - expected).abs() < 1.0);
    }

    #[test]
    fn a3_enters_when_neighbor_exceeds_serving_by_more_than_offset() {
        let serving = [-90.0, -90.0];
        let neighbor = [-85.0, -91.0];
        let both = [true, true];
        let cond = A3Condition {
            offset_db: 3.0,
            hysteresis_db: 0.0,
            serving_rsrp_dbm: &serving,
            neighbor_rsrp_dbm: &neighbor,
            both_connectable: &both,
        };
        assert!(cond.is_entered(0));
        assert!(!cond.is_entered(1));
    }

    #[test]
    fn d2_uses_ground_distance_not_slant_range() {
        let serving_dist = [2100.0];
        let neighbor_dist = [900.0];
        let both = [true];
        let cond = D2Condition {
            threshold1_km: 2000.0,
            threshold2_km: 1000.0,
            hysteresis_km: 0.0,
            distance_serving_km: &serving_dist,
            distance_neighbor_km: &neighbor_dist,
            both_connectable: &both,
        };
        assert!(cond.is_entered(0));
    }
}

//! Constellation-aware constants.
//!
//! Every threshold that varies by constellation lives here so stages 2-6
//! share a single source of truth instead of re-declaring magic numbers.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Constellation {
    Starlink,
    OneWeb,
}

impl Constellation {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "starlink" => Some(Constellation::Starlink),
            "oneweb" => Some(Constellation::OneWeb),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Constellation::Starlink => "starlink",
            Constellation::OneWeb => "oneweb",
        }
    }

    /// Minimum propagation horizon in minutes, per spec.md §3.
    pub fn min_horizon_minutes(&self) -> f64 {
        match self {
            Constellation::Starlink => 95.0,
            Constellation::OneWeb => 110.0,
        }
    }

    /// Default elevation gate in degrees, per spec.md §4.4. Configurable, but
    /// this is the mission-profile default used when a run does not override
    /// it explicitly.
    pub fn default_elevation_threshold_deg(&self) -> f64 {
        match self {
            Constellation::Starlink => 5.0,
            Constellation::OneWeb => 10.0,
        }
    }

    /// Target visible-count band used by pool verification, per spec.md §4.6.
    pub fn target_visible_band(&self) -> (u32, u32) {
        match self {
            Constellation::Starlink => (10, 15),
            Constellation::OneWeb => (3, 6),
        }
    }
}

/// Link-budget range gate shared by every constellation, per spec.md §3.
pub const LINK_RANGE_MIN_KM: f64 = 200.0;
pub const LINK_RANGE_MAX_KM: f64 = 2000.0;

/// LEO altitude sanity bounds, per spec.md §3 invariants.
pub const LEO_ALTITUDE_MIN_KM: f64 = 200.0;
pub const LEO_ALTITUDE_MAX_KM: f64 = 2500.0;

/// Propagation staleness bound, per spec.md §4.1.
pub const MAX_TLE_AGE_DAYS: i64 = 14;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starlink_band_is_wider_than_oneweb() {
        let (lo_s, hi_s) = Constellation::Starlink.target_visible_band();
        let (lo_o, hi_o) = Constellation::OneWeb.target_visible_band();
        assert!(lo_s > hi_o || lo_s >= lo_o);
        assert!(hi_s > hi_o);
    }

    #[test]
    fn from_tag_is_case_insensitive() {
        assert_eq!(Constellation::from_tag("STARLINK"), Some(Constellation::Starlink));
        assert_eq!(Constellation::from_tag("OneWeb"), Some(Constellation::OneWeb));
        assert_eq!(Constellation::from_tag("iridium"), None);
    }
}

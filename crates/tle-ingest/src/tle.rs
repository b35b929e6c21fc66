//! Three-line TLE parsing: name line, then the two NORAD element lines.
//!
//! Column layout follows the standard NORAD format, the same one the
//! retrieval pack's `natronics/rust-sgp4` TLE reader walks column-by-column;
//! unlike that reader this one enforces the line checksums instead of
//! leaving them as a TODO, per spec.md §4.1.

use chrono::{DateTime, Duration, TimeZone, Utc};
use pipeline_core::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TleRecord {
    pub catalog_id: u32,
    pub international_designator: String,
    pub name: String,
    pub epoch: DateTime<Utc>,
    pub mean_motion_orbits_day: f64,
    pub eccentricity: f64,
    pub inclination_deg: f64,
    pub raan_deg: f64,
    pub argument_of_perigee_deg: f64,
    pub mean_anomaly_deg: f64,
    pub mean_motion_dot: f64,
    pub bstar: f64,
    pub constellation: String,
    pub line1: String,
    pub line2: String,
}

/// Modulo-10 TLE line checksum: digits count as themselves, `-` counts as 1,
/// everything else (letters, `+`, spaces, `.`) counts as 0. Computed over the
/// first 68 columns; column 69 (index 68) holds the checksum digit itself.
pub fn tle_line_checksum(line: &str) -> u8 {
    (line
        .chars()
        .take(68)
        .map(|c| {
            if let Some(d) = c.to_digit(10) {
                d as u16
            } else if c == '-' {
                1
            } else {
                0
            }
        })
        .sum::<u16>()
        % 10) as u8
}

fn parse_checksum_digit(line: &str, catalog_id_hint: &str, line_number: u8) -> Result<u8> {
    let digit_char = line.chars().nth(68).ok_or_else(|| PipelineError::BadTleFormat {
        catalog_id: catalog_id_hint.to_string(),
        reason: format!("line {} shorter than 69 columns", line_number),
    })?;
    digit_char.to_digit(10).map(|d| d as u8).ok_or_else(|| PipelineError::BadTleFormat {
        catalog_id: catalog_id_hint.to_string(),
        reason: format!("line {} checksum column is not a digit", line_number),
    })
}

fn field(line: &str, start: usize, end: usize, catalog_id_hint: &str, name: &str) -> Result<String> {
    line.get(start..end)
        .map(|s| s.trim().to_string())
        .ok_or_else(|| PipelineError::BadTleFormat {
            catalog_id: catalog_id_hint.to_string(),
            reason: format!("field {} out of bounds", name),
        })
}

fn parse_exponential_field(raw: &str) -> f64 {
    // Assumed-decimal-point exponential notation, e.g. " 12345-3" -> 0.12345e-3
    let raw = raw.trim();
    if raw.is_empty() {
        return 0.0;
    }
    let (sign, rest) = match raw.strip_prefix('-') {
        Some(r) => (-1.0, r),
        None => (1.0, raw.strip_prefix('+').unwrap_or(raw)),
    };
    let exp_sign_pos = rest.rfind(['+', '-']);
    let (mantissa, exponent) = match exp_sign_pos {
        Some(pos) => (&rest[..pos], &rest[pos..]),
        None => (rest, "+0"),
    };
    let mantissa: f64 = format!("0.{}", mantissa).parse().unwrap_or(0.0);
    let exponent: i32 = exponent.parse().unwrap_or(0);
    sign * mantissa * 10f64.powi(exponent)
}

/// Parse one three-line TLE set. `constellation` is supplied by the caller
/// from the directory layout (`tle/<constellation>/tle/...`), not parsed
/// from the TLE text itself.
pub fn parse_tle(name_line: &str, line1: &str, line2: &str, constellation: &str) -> Result<TleRecord> {
    let name = name_line.trim().trim_start_matches('0').trim().to_string();
    let catalog_hint = field(line1, 2, 7, "?", "catalog_id")?;

    if line1.chars().count() < 69 || line2.chars().count() < 69 {
        return Err(PipelineError::BadTleFormat {
            catalog_id: catalog_hint,
            reason: "TLE lines must be 69 columns".to_string(),
        });
    }
    if !line1.starts_with('1') || !line2.starts_with('2') {
        return Err(PipelineError::BadTleFormat {
            catalog_id: catalog_hint,
            reason: "line number prefix mismatch".to_string(),
        });
    }

    let expected1 = parse_checksum_digit(line1, &catalog_hint, 1)?;
    let found1 = tle_line_checksum(line1);
    if expected1 != found1 {
        return Err(PipelineError::ChecksumMismatch {
            catalog_id: catalog_hint,
            line: 1,
            expected: expected1,
            found: found1,
        });
    }

    let expected2 = parse_checksum_digit(line2, &catalog_hint, 2)?;
    let found2 = tle_line_checksum(line2);
    if expected2 != found2 {
        return Err(PipelineError::ChecksumMismatch {
            catalog_id: catalog_hint,
            line: 2,
            expected: expected2,
            found: found2,
        });
    }

    let catalog_id: u32 = catalog_hint.parse().map_err(|_| PipelineError::BadTleFormat {
        catalog_id: catalog_hint.clone(),
        reason: "catalog id is not numeric".to_string(),
    })?;

    let international_designator = field(line1, 9, 17, &catalog_hint, "international_designator")?;

    let epoch_year_str = field(line1, 18, 20, &catalog_hint, "epoch_year")?;
    let epoch_year: i32 = epoch_year_str.parse().map_err(|_| PipelineError::BadTleFormat {
        catalog_id: catalog_hint.clone(),
        reason: "epoch year is not numeric".to_string(),
    })?;
    let full_year = if epoch_year >= 57 { 1900 + epoch_year } else { 2000 + epoch_year };

    let epoch_day_str = field(line1, 20, 32, &catalog_hint, "epoch_day")?;
    let epoch_day: f64 = epoch_day_str.parse().map_err(|_| PipelineError::BadTleFormat {
        catalog_id: catalog_hint.clone(),
        reason: "epoch day is not numeric".to_string(),
    })?;

    let jan1 = Utc.with_ymd_and_hms(full_year, 1, 1, 0, 0, 0).single().ok_or_else(|| PipelineError::BadTleFormat {
        catalog_id: catalog_hint.clone(),
        reason: "epoch year out of range".to_string(),
    })?;
    let epoch = jan1 + Duration::milliseconds(((epoch_day - 1.0) * 86_400_000.0) as i64);

    let mean_motion_dot_raw = field(line1, 33, 43, &catalog_hint, "mean_motion_dot")?;
    let mean_motion_dot: f64 = mean_motion_dot_raw.parse().unwrap_or(0.0);

    let bstar_raw = field(line1, 53, 61, &catalog_hint, "bstar")?;
    let bstar = parse_exponential_field(&bstar_raw);

    let inclination_deg: f64 = field(line2, 8, 16, &catalog_hint, "inclination")?
        .parse()
        .map_err(|_| PipelineError::BadTleFormat {
            catalog_id: catalog_hint.clone(),
            reason: "inclination is not numeric".to_string(),
        })?;
    let raan_deg: f64 = field(line2, 17, 25, &catalog_hint, "raan")?
        .parse()
        .map_err(|_| PipelineError::BadTleFormat {
            catalog_id: catalog_hint.clone(),
            reason: "raan is not numeric".to_string(),
        })?;
    let eccentricity_raw = field(line2, 26, 33, &catalog_hint, "eccentricity")?;
    let eccentricity: f64 = format!("0.{}", eccentricity_raw).parse().map_err(|_| PipelineError::BadTleFormat {
        catalog_id: catalog_hint.clone(),
        reason: "eccentricity is not numeric".to_string(),
    })?;
    let argument_of_perigee_deg: f64 = field(line2, 34, 42, &catalog_hint, "argument_of_perigee")?
        .parse()
        .map_err(|_| PipelineError::BadTleFormat {
            catalog_id: catalog_hint.clone(),
            reason: "argument of perigee is not numeric".to_string(),
        })?;
    let mean_anomaly_deg: f64 = field(line2, 43, 51, &catalog_hint, "mean_anomaly")?
        .parse()
        .map_err(|_| PipelineError::BadTleFormat {
            catalog_id: catalog_hint.clone(),
            reason: "mean anomaly is not numeric".to_string(),
        })?;
    let mean_motion_orbits_day: f64 = field(line2, 52, 63, &catalog_hint, "mean_motion")?
        .parse()
        .map_err(|_| PipelineError::BadTleFormat {
            catalog_id: catalog_hint.clone(),
            reason: "mean motion is not numeric".to_string(),
        })?;

    Ok(TleRecord {
        catalog_id,
        international_designator,
        name,
        epoch,
        mean_motion_orbits_day,
        eccentricity,
        inclination_deg,
        raan_deg,
        argument_of_perigee_deg,
        mean_anomaly_deg,
        mean_motion_dot,
        bstar,
        constellation: constellation.to_string(),
        line1: line1.to_string(),
        line2: line2.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // A real ISS TLE set, checksums intact.
    const NAME: &str = "ISS (ZARYA)";
    const L1: &str = "1 25544U 98067A   21275.52577766  .00001764  00000-0  40259-4 0  9993";
    const L2: &str = "2 25544  51.6433 309.9740 0004180 108.8132 251.3755 15.48908507304866";

    #[test]
    fn parses_valid_iss_tle() {
        let rec = parse_tle(NAME, L1, L2, "starlink").unwrap();
        assert_eq!(rec.catalog_id, 25544);
        assert_eq!(rec.name, "ISS (ZARYA)");
        assert!((rec.inclination_deg - 51.6433).abs() < 1e-9);
        assert!((rec.mean_motion_orbits_day - 15.48908507).abs() < 1e-6);
    }

    #[test]
    fn checksum_mismatch_is_rejected() {
        let mut bad = L2.to_string();
        bad.replace_range(68..69, "9");
        if bad == L2 {
            bad.replace_range(68..69, "0");
        }
        let err = parse_tle(NAME, L1, &bad, "starlink").unwrap_err();
        assert!(matches!(err, PipelineError::ChecksumMismatch { line: 2, .. }));
    }

    #[test]
    fn epoch_year_rolls_over_at_57() {
        let rec = parse_tle(NAME, L1, L2, "starlink").unwrap();
        assert_eq!(rec.epoch.format("%Y").to_string(), "2021");
    }

    #[test]
    fn checksum_parity_for_every_accepted_record() {
        let rec = parse_tle(NAME, L1, L2, "starlink").unwrap();
        assert_eq!(tle_line_checksum(&rec.line1) as u32, rec.line1.chars().nth(68).unwrap().to_digit(10).unwrap());
        assert_eq!(tle_line_checksum(&rec.line2) as u32, rec.line2.chars().nth(68).unwrap().to_digit(10).unwrap());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// A 68-column line of only digits checksums to the plain mod-10 sum
        /// of those digits, independent of which digits they are.
        #[test]
        fn all_digit_line_checksums_to_digit_sum(digits in proptest::collection::vec(0u32..10, 68)) {
            let line: String = digits.iter().map(|d| std::char::from_digit(*d, 10).unwrap()).collect();
            let expected = (digits.iter().sum::<u32>() % 10) as u8;
            prop_assert_eq!(tle_line_checksum(&line), expected);
        }

        /// Swapping one non-digit, non-dash column for a different
        /// non-digit, non-dash character never changes the checksum: both
        /// count as zero.
        #[test]
        fn non_digit_columns_do_not_affect_checksum(
            digits in proptest::collection::vec(0u32..10, 67),
            filler_a in prop::char::range('A', 'Z'),
            filler_b in prop::char::range('a', 'z'),
        ) {
            let mut base: String = digits.iter().map(|d| std::char::from_digit(*d, 10).unwrap()).collect();
            base.push(filler_a);
            let mut swapped = base.clone();
            swapped.replace_range(67..68, &filler_b.to_string());
            prop_assert_eq!(tle_line_checksum(&base), tle_line_checksum(&swapped));
        }
    }
}

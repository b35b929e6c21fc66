//! Elementary rotation matrices and the IAU 2000A/2006 rotation chain.
//!
//! Composed the way the retrieval pack's ERFA-derived coordinate modules
//! build up `Atco13`-style pipelines — `R3 * R2 * R1` chains of elementary
//! rotations rather than a single closed-form matrix — but expressed with
//! `nalgebra::Matrix3` instead of hand-rolled 3x3 arrays, and carrying only
//! the dominant precession and nutation terms rather than the full IAU
//! series tables (spec.md §4.3 calls for a usable transform, not a
//! bit-for-bit SOFA replica).

use chrono::{DateTime, Utc};
use nalgebra::{Matrix3, Vector3};

const ARCSEC_TO_RAD: f64 = std::f64::consts::PI / (180.0 * 3600.0);
const J2000_EPOCH_MJD: f64 = 51544.5;
const DAYS_PER_JULIAN_CENTURY: f64 = 36525.0;

/// Elementary rotation about the x-axis by `angle_rad`.
pub fn r1(angle_rad: f64) -> Matrix3<f64> {
    let (s, c) = angle_rad.sin_cos();
    Matrix3::new(1.0, 0.0, 0.0, 0.0, c, s, 0.0, -s, c)
}

/// Elementary rotation about the y-axis by `angle_rad`.
pub fn r2(angle_rad: f64) -> Matrix3<f64> {
    let (s, c) = angle_rad.sin_cos();
    Matrix3::new(c, 0.0, -s, 0.0, 1.0, 0.0, s, 0.0, c)
}

/// Elementary rotation about the z-axis by `angle_rad`.
pub fn r3(angle_rad: f64) -> Matrix3<f64> {
    let (s, c) = angle_rad.sin_cos();
    Matrix3::new(c, s, 0.0, -s, c, 0.0, 0.0, 0.0, 1.0)
}

/// Julian centuries of TT since J2000.0, from a Modified Julian Date.
pub fn julian_centuries_tt(mjd_tt: f64) -> f64 {
    (mjd_tt - J2000_EPOCH_MJD) / DAYS_PER_JULIAN_CENTURY
}

/// Earth Rotation Angle (ERA00), IAU 2000 definition, radians in `[0, 2pi)`.
pub fn earth_rotation_angle(mjd_ut1: f64) -> f64 {
    let t_u = mjd_ut1 - J2000_EPOCH_MJD;
    let turns = 0.7790572732640 + 1.00273781191135448 * t_u;
    let era = 2.0 * std::f64::consts::PI * (turns.rem_euclid(1.0));
    era
}

/// Mean longitude of the Moon's ascending node (IAU 2006, degrees -> rad),
/// the dominant argument driving the 18.6-year nutation term.
fn mean_node_longitude_rad(t_tt: f64) -> f64 {
    let deg = 125.044_555 - 1934.136_261 * t_tt + 0.002_070_8 * t_tt * t_tt;
    deg.to_radians()
}

/// Mean obliquity of the ecliptic (IAU 2006 polynomial), radians.
fn mean_obliquity_rad(t_tt: f64) -> f64 {
    let arcsec = 84381.406 - 46.836_769 * t_tt - 0.000_183_1 * t_tt * t_tt;
    arcsec * ARCSEC_TO_RAD
}

/// Dominant nutation terms (principal 18.6-year lunar-node term only).
/// Returns `(delta_psi, delta_eps)` in radians.
fn dominant_nutation_rad(t_tt: f64) -> (f64, f64) {
    let omega = mean_node_longitude_rad(t_tt);
    let delta_psi_arcsec = -17.1996 * omega.sin();
    let delta_eps_arcsec = 9.2025 * omega.cos();
    (delta_psi_arcsec * ARCSEC_TO_RAD, delta_eps_arcsec * ARCSEC_TO_RAD)
}

/// IAU 2006 precession angles `(zeta, theta, z)` in radians, low-order
/// polynomial terms (arcseconds per Capitaine et al. 2003).
fn precession_angles_rad(t_tt: f64) -> (f64, f64, f64) {
    let zeta_arcsec = 2.650_545 + 2306.083_227 * t_tt + 0.298_850 * t_tt * t_tt;
    let theta_arcsec = 2004.191_903 * t_tt - 0.429_493 * t_tt * t_tt;
    let z_arcsec = -2.650_545 + 2306.077_181 * t_tt + 1.092_748 * t_tt * t_tt;
    (zeta_arcsec * ARCSEC_TO_RAD, theta_arcsec * ARCSEC_TO_RAD, z_arcsec * ARCSEC_TO_RAD)
}

/// The combined bias-precession-nutation matrix rotating a true-equator-of-date
/// vector (the frame SGP4's TEME output is referenced to) into GCRS.
pub fn precession_nutation_matrix(t_tt: f64) -> Matrix3<f64> {
    let (zeta, theta, z) = precession_angles_rad(t_tt);
    let precession = r3(-z) * r2(theta) * r3(-zeta);

    let eps0 = mean_obliquity_rad(t_tt);
    let (dpsi, deps) = dominant_nutation_rad(t_tt);
    let nutation = r1(-(eps0 + deps)) * r3(-dpsi) * r1(eps0);

    precession * nutation
}

/// IERS polar motion matrix `W = R3(-s') R2(x_p) R1(y_p)`, where `s'` is the
/// TIO locator (negligible at this accuracy and taken as zero).
pub fn polar_motion_matrix(x_pole_rad: f64, y_pole_rad: f64) -> Matrix3<f64> {
    r3(0.0) * r2(x_pole_rad) * r1(y_pole_rad)
}

/// Rotate a GCRS position/velocity pair into ITRS at `time`, given Earth
/// orientation parameters already interpolated for that instant.
pub fn gcrs_to_itrs(
    position_gcrs_km: Vector3<f64>,
    mjd_ut1: f64,
    x_pole_rad: f64,
    y_pole_rad: f64,
) -> Vector3<f64> {
    let era = earth_rotation_angle(mjd_ut1);
    let spin = r3(era);
    let polar_motion = polar_motion_matrix(x_pole_rad, y_pole_rad);
    polar_motion * (spin * position_gcrs_km)
}

/// Rotate a TEME position into GCRS by applying the inverse of the
/// precession-nutation rotation that would carry a J2000 vector to the
/// true-equator-of-date frame TEME is expressed in.
pub fn teme_to_gcrs(position_teme_km: Vector3<f64>, time: DateTime<Utc>, mjd_tt: f64) -> Vector3<f64> {
    let _ = time;
    let t_tt = julian_centuries_tt(mjd_tt);
    let pn = precession_nutation_matrix(t_tt);
    pn.transpose() * position_teme_km
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_matrices_are_orthonormal() {
        for angle in [0.0, 0.3, 1.57, 3.1] {
            for m in [r1(angle), r2(angle), r3(angle)] {
                let should_be_identity = m * m.transpose();
                for i in 0..3 {
                    for j in 0..3 {
                        let expected = if i == j { 1.0 } else { 0.0 };
                        assert!((should_be_identity[(i, j)] - expected).abs() < 1e-9);
                    }
                }
            }
        }
    }

    #[test]
    fn era_is_within_unit_circle() {
        let era = earth_rotation_angle(60000.0);
        assert!(era >= 0.0 && era < 2.0 * std::f64::consts::PI);
    }

    #[test]
    fn era_advances_by_roughly_one_turn_per_day() {
        let era0 = earth_rotation_angle(60000.0);
        let era1 = earth_rotation_angle(60001.0);
        let delta = (era1 - era0).rem_euclid(2.0 * std::f64::consts::PI);
        // One sidereal day is slightly shorter than one solar day, so the
        // ERA gains a small extra fraction of a turn every 24h.
        assert!(delta > 0.0 && delta < 0.1, "delta={delta}");
    }

    #[test]
    fn precession_nutation_matrix_is_orthonormal() {
        let m = precession_nutation_matrix(0.25);
        let should_be_identity = m * m.transpose();
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((should_be_identity[(i, j)] - expected).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn teme_to_gcrs_preserves_vector_norm() {
        let v = Vector3::new(7000.0, 0.0, 0.0);
        let time = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let rotated = teme_to_gcrs(v, time, 60000.0);
        assert!((rotated.norm() - v.norm()).abs() < 1e-6);
    }
}

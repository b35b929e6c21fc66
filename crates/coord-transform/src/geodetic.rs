//! WGS84 ECEF <-> geodetic conversion via Bowring's iterative method.

use nalgebra::Vector3;

pub const WGS84_SEMI_MAJOR_AXIS_KM: f64 = 6378.137;
const WGS84_FLATTENING: f64 = 1.0 / 298.257223563;
const WGS84_ECCENTRICITY_SQUARED: f64 = WGS84_FLATTENING * (2.0 - WGS84_FLATTENING);

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Geodetic {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
}

/// Bowring's method, converging in a handful of iterations for any
/// altitude a LEO pipeline will see. Four iterations is enough for
/// sub-millimeter convergence at orbital altitudes.
pub fn ecef_to_geodetic(position_ecef_km: Vector3<f64>) -> Geodetic {
    let x = position_ecef_km.x;
    let y = position_ecef_km.y;
    let z = position_ecef_km.z;

    let p = (x * x + y * y).sqrt();
    let longitude_rad = y.atan2(x);

    let a = WGS84_SEMI_MAJOR_AXIS_KM;
    let e2 = WGS84_ECCENTRICITY_SQUARED;

    let mut latitude_rad = (z / (p * (1.0 - e2))).atan();
    for _ in 0..4 {
        let sin_lat = latitude_rad.sin();
        let n = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        latitude_rad = ((z + e2 * n * sin_lat) / p).atan();
    }

    let sin_lat = latitude_rad.sin();
    let n = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    let altitude_km = p / latitude_rad.cos() - n;

    Geodetic {
        latitude_deg: latitude_rad.to_degrees(),
        longitude_deg: longitude_rad.to_degrees(),
        altitude_km,
    }
}

pub fn geodetic_to_ecef(geodetic: Geodetic) -> Vector3<f64> {
    let lat = geodetic.latitude_deg.to_radians();
    let lon = geodetic.longitude_deg.to_radians();
    let a = WGS84_SEMI_MAJOR_AXIS_KM;
    let e2 = WGS84_ECCENTRICITY_SQUARED;

    let sin_lat = lat.sin();
    let n = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();

    let x = (n + geodetic.altitude_km) * lat.cos() * lon.cos();
    let y = (n + geodetic.altitude_km) * lat.cos() * lon.sin();
    let z = (n * (1.0 - e2) + geodetic.altitude_km) * sin_lat;

    Vector3::new(x, y, z)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_recovers_original_position() {
        let original = Vector3::new(4000.0, 3000.0, 4500.0);
        let geodetic = ecef_to_geodetic(original);
        let recovered = geodetic_to_ecef(geodetic);
        assert!((recovered - original).norm() < 1e-6);
    }

    #[test]
    fn equatorial_point_has_zero_latitude() {
        let point = Vector3::new(WGS84_SEMI_MAJOR_AXIS_KM, 0.0, 0.0);
        let geodetic = ecef_to_geodetic(point);
        assert!(geodetic.latitude_deg.abs() < 1e-6);
        assert!(geodetic.altitude_km.abs() < 1e-6);
    }

    #[test]
    fn polar_point_has_ninety_degree_latitude() {
        let polar_radius = WGS84_SEMI_MAJOR_AXIS_KM * (1.0 - WGS84_FLATTENING);
        let point = Vector3::new(0.0, 0.0, polar_radius);
        let geodetic = ecef_to_geodetic(point);
        assert!((geodetic.latitude_deg - 90.0).abs() < 1e-3);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Any LEO-altitude ECEF position survives an ecef -> geodetic ->
        /// ecef round trip to within Bowring's iteration precision. Latitude
        /// is kept a degree off the poles, where longitude is undefined and
        /// the conversion loses that last digit of precision.
        #[test]
        fn ecef_round_trip_holds_at_leo_altitudes(
            latitude_deg in -89.0..89.0,
            longitude_deg in -180.0..180.0,
            altitude_km in 200.0..2000.0,
        ) {
            let original = Geodetic { latitude_deg, longitude_deg, altitude_km };
            let ecef = geodetic_to_ecef(original);
            let recovered = ecef_to_geodetic(ecef);

            prop_assert!((recovered.latitude_deg - original.latitude_deg).abs() < 1e-6);
            prop_assert!((recovered.longitude_deg - original.longitude_deg).abs() < 1e-6);
            prop_assert!((recovered.altitude_km - original.altitude_km).abs() < 1e-6);
        }

        /// Latitude recovered from `ecef_to_geodetic` always stays within the
        /// range the method can represent, regardless of input position.
        #[test]
        fn recovered_latitude_stays_in_range(
            x in -8000.0..8000.0,
            y in -8000.0..8000.0,
            z in -8000.0..8000.0,
        ) {
            // Skip points effectively on the polar axis, where atan2's
            // longitude is undefined and latitude convergence is unstable.
            prop_assume!((x * x + y * y).sqrt() > 1.0);
            let geodetic = ecef_to_geodetic(Vector3::new(x, y, z));
            prop_assert!(geodetic.latitude_deg >= -90.0 && geodetic.latitude_deg <= 90.0);
        }
    }
}

//! Observer-relative East-North-Up geometry: elevation, azimuth, range.

use coord_transform::geodetic::geodetic_to_ecef;
use coord_transform::Geodetic;
use nalgebra::{Matrix3, Vector3};

/// A ground observer. Both fields are required — no default station
/// location, per spec.md §9.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct Observer {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
}

impl Observer {
    pub fn position_ecef_km(&self) -> Vector3<f64> {
        geodetic_to_ecef(Geodetic {
            latitude_deg: self.latitude_deg,
            longitude_deg: self.longitude_deg,
            altitude_km: self.altitude_km,
        })
    }

    fn enu_rotation(&self) -> Matrix3<f64> {
        let lat = self.latitude_deg.to_radians();
        let lon = self.longitude_deg.to_radians();
        let (sin_lat, cos_lat) = lat.sin_cos();
        let (sin_lon, cos_lon) = lon.sin_cos();

        // Rows are the east, north, up unit vectors expressed in ECEF.
        Matrix3::new(
            -sin_lon, cos_lon, 0.0,
            -sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat,
            cos_lat * cos_lon, cos_lat * sin_lon, sin_lat,
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TopocentricView {
    pub elevation_deg: f64,
    pub azimuth_deg: f64,
    pub range_km: f64,
}

/// Project `target_ecef_km` into the observer's local East-North-Up frame
/// and derive elevation, azimuth (clockwise from true north) and range.
pub fn topocentric_view(observer: &Observer, target_ecef_km: Vector3<f64>) -> TopocentricView {
    let relative = target_ecef_km - observer.position_ecef_km();
    let enu = observer.enu_rotation() * relative;

    let range_km = enu.norm();
    let elevation_deg = (enu.z / range_km).asin().to_degrees();
    let azimuth_deg = enu.x.atan2(enu.y).to_degrees().rem_euclid(360.0);

    TopocentricView {
        elevation_deg,
        azimuth_deg,
        range_km,
    }
}

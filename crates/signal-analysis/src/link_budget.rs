//! Free-space path loss, atmospheric loss, Doppler and propagation delay.

const SPEED_OF_LIGHT_KM_S: f64 = 299_792.458;

/// Clear-sky zenith gas + cloud attenuation, a single representative value
/// standing in for a full ITU-R P.618 rain/gas model (out of scope per
/// spec.md §4.5 Non-goals: no weather-conditioned attenuation).
const ZENITH_ATMOSPHERIC_LOSS_DB: f64 = 0.5;

/// ITU-R P.525 free-space path loss, `range_km` and `frequency_hz` both > 0.
pub fn free_space_path_loss_db(range_km: f64, frequency_hz: f64) -> f64 {
    let frequency_mhz = frequency_hz / 1.0e6;
    20.0 * range_km.log10() + 20.0 * frequency_mhz.log10() + 32.44
}

/// Cosecant-law atmospheric loss: grows without bound as elevation
/// approaches zero, so callers must have already gated on the elevation
/// threshold before reaching this function.
pub fn atmospheric_loss_db(elevation_deg: f64) -> f64 {
    let elevation_rad = elevation_deg.to_radians();
    ZENITH_ATMOSPHERIC_LOSS_DB / elevation_rad.sin()
}

/// Doppler shift from range rate (km/s, positive = receding).
pub fn doppler_shift_hz(range_rate_km_s: f64, frequency_hz: f64) -> f64 {
    -frequency_hz * (range_rate_km_s / SPEED_OF_LIGHT_KM_S)
}

/// One-way propagation delay in milliseconds.
pub fn propagation_delay_ms(range_km: f64) -> f64 {
    (range_km / SPEED_OF_LIGHT_KM_S) * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fspl_increases_with_range() {
        let near = free_space_path_loss_db(500.0, 12_000_000_000.0);
        let far = free_space_path_loss_db(1500.0, 12_000_000_000.0);
        assert!(far > near);
    }

    #[test]
    fn atmospheric_loss_is_worse_near_horizon() {
        let near_horizon = atmospheric_loss_db(5.0);
        let near_zenith = atmospheric_loss_db(85.0);
        assert!(near_horizon > near_zenith);
    }

    #[test]
    fn approaching_satellite_has_positive_doppler() {
        let shift = doppler_shift_hz(-7.0, 12_000_000_000.0);
        assert!(shift > 0.0);
    }

    #[test]
    fn delay_matches_light_travel_time() {
        let delay = propagation_delay_ms(SPEED_OF_LIGHT_KM_S);
        assert!((delay - 1000.0).abs() < 1e-6);
    }
}

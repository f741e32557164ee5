use std::f64::consts::PI;

use crate::types::{LocationSample, PlaceInfo};

/// Mean Earth radius.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two lat/lon points in kilometers.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let to_rad = |deg: f64| deg * PI / 180.0;

    let dlat = to_rad(lat2 - lat1);
    let dlon = to_rad(lon2 - lon1);

    let a = (dlat / 2.0).sin().powi(2)
        + to_rad(lat1).cos() * to_rad(lat2).cos() * (dlon / 2.0).sin().powi(2);

    let c = 2.0 * a.sqrt().min(1.0).asin();
    EARTH_RADIUS_KM * c
}

impl LocationSample {
    /// Distance to `place` when it lies inside this sample's radius.
    pub fn reaches_place(&self, place: &PlaceInfo) -> Option<f64> {
        self.reaches(place.lat, place.lon)
    }

    /// Distance to another user's sample when it lies inside this sample's radius.
    pub fn reaches_sample(&self, other: &LocationSample) -> Option<f64> {
        self.reaches(other.lat, other.lon)
    }

    fn reaches(&self, lat: f64, lon: f64) -> Option<f64> {
        let d = haversine_km(self.lat, self.lon, lat, lon);
        (d <= self.rad).then_some(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_origin(rad: f64) -> LocationSample {
        LocationSample {
            lat: 0.0,
            lon: 0.0,
            rad,
        }
    }

    fn place(lat: f64, lon: f64) -> PlaceInfo {
        PlaceInfo {
            name: "p".into(),
            lat,
            lon,
        }
    }

    #[test]
    fn five_degrees_on_equator() {
        let d = haversine_km(0.0, 0.0, 0.0, 5.0);
        assert!((d - 556.0).abs() < 1.0, "Expected ~556 km, got {d}");
    }

    #[test]
    fn twenty_degrees_on_equator() {
        let d = haversine_km(0.0, 0.0, 0.0, 20.0);
        assert!((d - 2224.0).abs() < 3.0, "Expected ~2224 km, got {d}");
    }

    #[test]
    fn radius_is_inclusive_threshold() {
        let sample = at_origin(1000.0);
        let near = sample.reaches_place(&place(0.0, 5.0));
        assert!(near.is_some_and(|d| (d - 556.0).abs() < 1.0));
        assert_eq!(sample.reaches_place(&place(0.0, 20.0)), None);
        assert_eq!(at_origin(0.0).reaches_place(&place(0.0, 0.0)), Some(0.0));
    }

    #[test]
    fn symmetric() {
        let a = haversine_km(44.96, -93.27, 44.94, -93.09);
        let b = haversine_km(44.94, -93.09, 44.96, -93.27);
        assert!((a - b).abs() < 1e-9);
    }
}

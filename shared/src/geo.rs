use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite and inside the WGS84 degree ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Component-wise comparison with an absolute tolerance.
    pub fn approx_eq(&self, other: &LatLng, epsilon: f64) -> bool {
        (self.lat - other.lat).abs() <= epsilon && (self.lng - other.lng).abs() <= epsilon
    }

    /// `[lng, lat]` order used by GeoJSON and mapbox.
    pub fn to_lng_lat(self) -> [f64; 2] {
        [self.lng, self.lat]
    }

    /// Great-circle distance in kilometres.
    pub fn haversine_km(&self, other: &LatLng) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos() * other.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

/// Sum of segment lengths along an ordered path, in kilometres.
pub fn path_length_km(points: &[LatLng]) -> f64 {
    points
        .windows(2)
        .map(|pair| pair[0].haversine_km(&pair[1]))
        .sum()
}

/// Axis-aligned bounding box, latitude and longitude taken independently.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl Bounds {
    /// Returns `None` for an empty slice.
    pub fn from_points(points: &[LatLng]) -> Option<Self> {
        let first = points.first()?;
        let mut bounds = Self {
            south_west: *first,
            north_east: *first,
        };
        for point in &points[1..] {
            bounds.extend(point);
        }
        Some(bounds)
    }

    pub fn extend(&mut self, point: &LatLng) {
        self.south_west.lat = self.south_west.lat.min(point.lat);
        self.south_west.lng = self.south_west.lng.min(point.lng);
        self.north_east.lat = self.north_east.lat.max(point.lat);
        self.north_east.lng = self.north_east.lng.max(point.lng);
    }
}

#[cfg(test)]
mod tests {
    use super::{Bounds, LatLng, path_length_km};

    fn assert_close(actual: f64, expected: f64, tolerance: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff < tolerance,
            "expected {expected}, got {actual} (diff: {diff})"
        );
    }

    #[test]
    fn rejects_out_of_range_and_non_finite() {
        assert!(LatLng::new(55.7558, 37.6176).is_valid());
        assert!(!LatLng::new(91.0, 0.0).is_valid());
        assert!(!LatLng::new(0.0, -180.5).is_valid());
        assert!(!LatLng::new(f64::NAN, 0.0).is_valid());
        assert!(!LatLng::new(0.0, f64::INFINITY).is_valid());
    }

    #[test]
    fn approx_eq_tolerates_float_noise() {
        let a = LatLng::new(55.7558, 37.6176);
        let b = LatLng::new(55.755_800_000_1, 37.617_599_999_9);
        assert!(a.approx_eq(&b, 1e-6));
        assert!(!a.approx_eq(&LatLng::new(55.7559, 37.6176), 1e-6));
    }

    #[test]
    fn haversine_one_degree_of_latitude() {
        let a = LatLng::new(0.0, 0.0);
        let b = LatLng::new(1.0, 0.0);
        assert_close(a.haversine_km(&b), 111.195, 0.01);
    }

    #[test]
    fn path_length_sums_segments_in_order() {
        let points = [
            LatLng::new(0.0, 0.0),
            LatLng::new(1.0, 0.0),
            LatLng::new(1.0, 1.0),
        ];
        let expected = points[0].haversine_km(&points[1]) + points[1].haversine_km(&points[2]);
        assert_close(path_length_km(&points), expected, 1e-9);
        assert_eq!(path_length_km(&points[..1]), 0.0);
    }

    #[test]
    fn bounds_take_min_max_independently() {
        let bounds = Bounds::from_points(&[
            LatLng::new(55.72, 37.60),
            LatLng::new(55.70, 37.62),
            LatLng::new(55.71, 37.61),
        ])
        .unwrap();
        assert_eq!(bounds.south_west, LatLng::new(55.70, 37.60));
        assert_eq!(bounds.north_east, LatLng::new(55.72, 37.62));
    }

    #[test]
    fn bounds_of_nothing_is_none() {
        assert_eq!(Bounds::from_points(&[]), None);
    }
}

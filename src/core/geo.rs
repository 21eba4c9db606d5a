use serde::{Deserialize, Serialize};

use crate::{MapError, Result};

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Validates that the coordinates are within valid ranges
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && self.lat >= -90.0
            && self.lat <= 90.0
            && self.lng >= -180.0
            && self.lng <= 180.0
    }

    /// Same as [`LatLng::is_valid`] but reports the offending pair
    pub fn validate(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(MapError::InvalidCoordinates(format!(
                "lat={}, lng={}",
                self.lat, self.lng
            )))
        }
    }

    /// Providers in the Mapbox family take positions as `[lng, lat]`
    pub fn to_lng_lat(&self) -> [f64; 2] {
        [self.lng, self.lat]
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latlng_validation() {
        assert!(LatLng::new(51.5074, -0.1278).is_valid());
        assert!(!LatLng::new(91.0, 0.0).is_valid());
        assert!(!LatLng::new(0.0, -180.5).is_valid());
        assert!(!LatLng::new(f64::NAN, 0.0).is_valid());

        let err = LatLng::new(100.0, 0.0).validate().unwrap_err();
        assert!(matches!(err, MapError::InvalidCoordinates(_)));
    }

    #[test]
    fn test_lng_lat_order() {
        let paris = LatLng::new(48.8566, 2.3522);
        assert_eq!(paris.to_lng_lat(), [2.3522, 48.8566]);
    }
}

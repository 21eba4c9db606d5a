//! Points of interest shown as markers

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::{core::geo::LatLng, prelude::HashSet, MapError, Result};

/// A read-only place a marker can be built for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointOfInterest {
    pub id: i64,
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lng")]
    pub longitude: f64,
    #[serde(alias = "name")]
    pub display_name: String,
    #[serde(alias = "img")]
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

impl PointOfInterest {
    pub fn new(
        id: i64,
        latitude: f64,
        longitude: f64,
        display_name: impl Into<String>,
        image_url: impl Into<String>,
    ) -> Self {
        Self {
            id,
            latitude,
            longitude,
            display_name: display_name.into(),
            image_url: image_url.into(),
            destination: None,
        }
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn position(&self) -> LatLng {
        LatLng::new(self.latitude, self.longitude)
    }

    pub fn validate(&self) -> Result<()> {
        self.position()
            .validate()
            .map_err(|_| {
                MapError::InvalidCoordinates(format!(
                    "point {} at ({}, {})",
                    self.id, self.latitude, self.longitude
                ))
            })
    }
}

static DEMO_TRAVELERS: Lazy<Vec<PointOfInterest>> = Lazy::new(|| {
    vec![
        PointOfInterest::new(1, 37.7749, -122.4194, "Alex", "https://i.pravatar.cc/150?img=1")
            .with_destination("San Francisco"),
        PointOfInterest::new(2, 34.0522, -118.2437, "Taylor", "https://i.pravatar.cc/150?img=2")
            .with_destination("Los Angeles"),
        PointOfInterest::new(3, 51.5074, -0.1278, "Jordan", "https://i.pravatar.cc/150?img=3")
            .with_destination("London"),
        PointOfInterest::new(4, 48.8566, 2.3522, "Morgan", "https://i.pravatar.cc/150?img=4")
            .with_destination("Paris"),
        PointOfInterest::new(5, 35.6762, 139.6503, "Casey", "https://i.pravatar.cc/150?img=5")
            .with_destination("Tokyo"),
    ]
});

/// Travelers currently in "travel now" mode, used by the demo pages
pub fn demo_travelers() -> &'static [PointOfInterest] {
    &DEMO_TRAVELERS
}

/// Parse a JSON array of points, rejecting bad coordinates and repeated ids
pub fn load_points(json: &str) -> Result<Vec<PointOfInterest>> {
    let points: Vec<PointOfInterest> = serde_json::from_str(json)?;
    let mut seen = HashSet::default();
    for point in &points {
        point.validate()?;
        if !seen.insert(point.id) {
            return Err(MapError::Config(format!("duplicate point id {}", point.id)));
        }
    }
    log::debug!("loaded {} point(s) of interest", points.len());
    Ok(points)
}

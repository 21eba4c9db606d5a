use serde::Serialize;

/// Shown over the map while travel mode is off
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TravelModeHint {
    pub heading: String,
    pub body: String,
}

impl Default for TravelModeHint {
    fn default() -> Self {
        Self {
            heading: "Enable \"Travel Now\" mode".to_string(),
            body: "Toggle \"Travel Now\" in the navbar to see nearby travelers and connect with them."
                .to_string(),
        }
    }
}

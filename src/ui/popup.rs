use serde::Serialize;

use crate::{core::geo::LatLng, data::points::PointOfInterest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PopupAction {
    Connect,
    ViewProfile,
}

impl PopupAction {
    pub fn label(&self) -> &'static str {
        match self {
            PopupAction::Connect => "Connect",
            PopupAction::ViewProfile => "View Profile",
        }
    }
}

/// Detail card for the selected traveler
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopupCard {
    pub point_id: i64,
    pub position: LatLng,
    pub title: String,
    pub subtitle: Option<String>,
    pub image_url: String,
    pub actions: Vec<PopupAction>,
    pub visible: bool,
}

impl PopupCard {
    pub fn for_point(point: &PointOfInterest) -> Self {
        Self {
            point_id: point.id,
            position: point.position(),
            title: point.display_name.clone(),
            subtitle: point
                .destination
                .as_ref()
                .map(|destination| format!("Traveling to {}", destination)),
            image_url: point.image_url.clone(),
            actions: vec![PopupAction::Connect, PopupAction::ViewProfile],
            visible: true,
        }
    }

    pub fn show(&mut self) {
        self.visible = true;
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }
}

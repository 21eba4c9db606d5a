//! Point-of-interest markers and whole-set reconciliation
//!
//! Markers carry nothing but a click side effect, so the set is never
//! diffed: every reconciliation removes all previous markers and builds the
//! new set from scratch.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::{
    core::{geo::LatLng, map::MapHandle},
    data::points::PointOfInterest,
    provider::{InstanceId, MapProvider, MarkerClick, MarkerId},
    Result,
};

/// Invoked with the point whose marker was activated
pub type ActivateCallback = Rc<dyn Fn(&PointOfInterest)>;

/// Visual style of an avatar pin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MarkerStyle {
    pub class_name: String,
    pub size_px: u32,
    pub border_width_px: u32,
    pub border_color: String,
    pub round: bool,
    pub shadow: Option<String>,
    pub animation: Option<String>,
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            class_name: "traveler-marker".to_string(),
            size_px: 30,
            border_width_px: 2,
            border_color: "#0EA5E9".to_string(),
            round: true,
            shadow: Some("0 2px 4px rgba(0,0,0,0.3)".to_string()),
            animation: Some("pulse-slow 2s infinite".to_string()),
        }
    }
}

impl MarkerStyle {
    /// Inline CSS declarations for a marker element showing `icon_url`
    pub fn css_declarations(&self, icon_url: Option<&str>) -> Vec<(&'static str, String)> {
        let size = format!("{}px", self.size_px);
        let mut declarations = vec![
            ("width", size.clone()),
            ("height", size),
            (
                "border",
                format!("{}px solid {}", self.border_width_px, self.border_color),
            ),
            ("cursor", "pointer".to_string()),
        ];
        if self.round {
            declarations.push(("border-radius", "50%".to_string()));
        }
        if let Some(url) = icon_url {
            declarations.push(("background-image", format!("url({})", url)));
            declarations.push(("background-size", "cover".to_string()));
            declarations.push(("background-position", "center".to_string()));
        }
        if let Some(shadow) = &self.shadow {
            declarations.push(("box-shadow", shadow.clone()));
        }
        if let Some(animation) = &self.animation {
            declarations.push(("animation", animation.clone()));
        }
        declarations
    }
}

/// Metadata handed to the provider for one marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerOptions {
    pub point_id: i64,
    pub position: LatLng,
    pub title: String,
    pub icon_url: Option<String>,
    pub style: MarkerStyle,
}

impl MarkerOptions {
    pub fn new(point_id: i64, position: LatLng, title: impl Into<String>) -> Self {
        Self {
            point_id,
            position,
            title: title.into(),
            icon_url: None,
            style: MarkerStyle::default(),
        }
    }

    pub fn for_point(point: &PointOfInterest) -> Self {
        Self::new(point.id, point.position(), point.display_name.clone())
            .with_icon(point.image_url.clone())
    }

    pub fn with_icon(mut self, url: impl Into<String>) -> Self {
        self.icon_url = Some(url.into());
        self
    }

    pub fn with_style(mut self, style: MarkerStyle) -> Self {
        self.style = style;
        self
    }
}

/// A marker attached to a live map instance.
///
/// Removed from the provider when dropped unless [`MarkerHandle::remove`]
/// already did so.
pub struct MarkerHandle {
    provider: Rc<dyn MapProvider>,
    instance: InstanceId,
    id: MarkerId,
    point_id: i64,
    attached: bool,
}

impl MarkerHandle {
    pub(crate) fn new(
        provider: Rc<dyn MapProvider>,
        instance: InstanceId,
        id: MarkerId,
        point_id: i64,
    ) -> Self {
        Self {
            provider,
            instance,
            id,
            point_id,
            attached: true,
        }
    }

    pub fn id(&self) -> MarkerId {
        self.id
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Id of the point this marker was built from
    pub fn point_id(&self) -> i64 {
        self.point_id
    }

    pub fn remove(mut self) -> Result<()> {
        self.attached = false;
        self.provider.remove_marker(self.instance, self.id)
    }
}

impl Drop for MarkerHandle {
    fn drop(&mut self) {
        if self.attached {
            if let Err(e) = self.provider.remove_marker(self.instance, self.id) {
                log::warn!("failed to remove {}: {}", self.id, e);
            }
        }
    }
}

impl fmt::Debug for MarkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkerHandle")
            .field("id", &self.id)
            .field("instance", &self.instance)
            .field("point_id", &self.point_id)
            .finish()
    }
}

fn remove_all(markers: Vec<MarkerHandle>) {
    for marker in markers {
        let id = marker.id();
        if let Err(e) = marker.remove() {
            log::warn!("failed to remove {}: {}", id, e);
        }
    }
}

/// Replace `previous` with the marker set for the given inputs.
///
/// All previous markers are removed first. With travel mode off the result
/// is empty; with it on there is exactly one marker per point and clicking
/// it reports that point. If any marker cannot be created, the markers built
/// so far are removed again and the error is returned.
pub fn reconcile_markers(
    handle: &MapHandle,
    previous: Vec<MarkerHandle>,
    travel_mode_enabled: bool,
    points: &[PointOfInterest],
    on_activate: ActivateCallback,
) -> Result<Vec<MarkerHandle>> {
    let removed = previous.len();
    remove_all(previous);

    if !travel_mode_enabled {
        log::debug!("travel mode off, removed {} marker(s)", removed);
        return Ok(Vec::new());
    }

    let mut created = Vec::with_capacity(points.len());
    for point in points {
        let target = point.clone();
        let activate = on_activate.clone();
        let on_click: MarkerClick = Rc::new(move || activate(&target));
        created.push(handle.add_marker(&MarkerOptions::for_point(point), on_click)?);
    }

    log::debug!(
        "rebuilt markers on {}: removed {}, created {}",
        handle.id(),
        removed,
        created.len()
    );
    Ok(created)
}

/// The live markers owned by one view
#[derive(Debug, Default)]
pub struct MarkerSet {
    markers: Vec<MarkerHandle>,
}

impl MarkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the set. On error the set is left empty.
    pub fn reconcile(
        &mut self,
        handle: &MapHandle,
        travel_mode_enabled: bool,
        points: &[PointOfInterest],
        on_activate: ActivateCallback,
    ) -> Result<usize> {
        let previous = std::mem::take(&mut self.markers);
        self.markers =
            reconcile_markers(handle, previous, travel_mode_enabled, points, on_activate)?;
        Ok(self.markers.len())
    }

    pub fn clear(&mut self) {
        remove_all(std::mem::take(&mut self.markers));
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn point_ids(&self) -> Vec<i64> {
        self.markers.iter().map(MarkerHandle::point_id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MarkerHandle> {
        self.markers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{config::MapViewOptions, map::create_map},
        provider::{headless::HeadlessProvider, registry::ProviderRegistry, ContainerRef},
    };
    use std::cell::RefCell;

    fn point(id: i64, lat: f64, lng: f64) -> PointOfInterest {
        PointOfInterest::new(id, lat, lng, format!("P{}", id), format!("https://img/{}", id))
    }

    fn setup() -> (Rc<HeadlessProvider>, MapHandle) {
        let provider = Rc::new(HeadlessProvider::new());
        let registry = ProviderRegistry::new(provider.clone());
        registry.ensure(|| {}, |_| {});
        let mut slot = None;
        create_map(
            &registry,
            &ContainerRef::new("map"),
            &MapViewOptions::default(),
            &mut slot,
        )
        .unwrap();
        (provider, slot.unwrap())
    }

    fn recorder() -> (Rc<RefCell<Vec<i64>>>, ActivateCallback) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        (seen, Rc::new(move |p: &PointOfInterest| sink.borrow_mut().push(p.id)))
    }

    #[test]
    fn test_disabled_yields_no_markers() {
        let (provider, handle) = setup();
        let (_, on_activate) = recorder();
        let points = vec![point(1, 1.0, 1.0), point(2, 2.0, 2.0)];

        let markers = reconcile_markers(&handle, Vec::new(), false, &points, on_activate).unwrap();
        assert!(markers.is_empty());
        assert_eq!(provider.live_markers(), 0);
    }

    #[test]
    fn test_enabled_builds_one_marker_per_point() {
        let (provider, handle) = setup();
        let (seen, on_activate) = recorder();
        let points = vec![point(1, 1.0, 1.0), point(3, 3.0, 3.0), point(7, 7.0, 7.0)];

        let markers = reconcile_markers(&handle, Vec::new(), true, &points, on_activate).unwrap();
        assert_eq!(markers.len(), 3);
        assert_eq!(provider.live_markers(), 3);
        assert_eq!(provider.marker_point_ids(handle.id()), vec![1, 3, 7]);

        assert!(provider.click_point(3));
        assert!(provider.click_point(7));
        assert_eq!(*seen.borrow(), vec![3, 7]);
    }

    #[test]
    fn test_previous_set_is_replaced() {
        let (provider, handle) = setup();
        let (_, on_activate) = recorder();
        let points = vec![point(1, 1.0, 1.0), point(2, 2.0, 2.0)];

        let first =
            reconcile_markers(&handle, Vec::new(), true, &points, on_activate.clone()).unwrap();
        let first_ids: Vec<MarkerId> = first.iter().map(MarkerHandle::id).collect();

        let second = reconcile_markers(&handle, first, true, &points, on_activate).unwrap();
        assert_eq!(provider.live_markers(), 2);
        for id in first_ids {
            assert!(!provider.click_marker(id), "{} should be gone", id);
        }
        assert_eq!(second.len(), 2);
    }

    #[test]
    fn test_marker_options_carry_point_metadata() {
        let (provider, handle) = setup();
        let (_, on_activate) = recorder();
        let points = vec![point(5, 48.8566, 2.3522)];

        let markers = reconcile_markers(&handle, Vec::new(), true, &points, on_activate).unwrap();
        let options = provider.marker_options(markers[0].id()).unwrap();
        assert_eq!(options.point_id, 5);
        assert_eq!(options.position, LatLng::new(48.8566, 2.3522));
        assert_eq!(options.title, "P5");
        assert_eq!(options.icon_url.as_deref(), Some("https://img/5"));
    }

    #[test]
    fn test_dropping_handles_removes_markers() {
        let (provider, handle) = setup();
        let (_, on_activate) = recorder();
        let points = vec![point(1, 1.0, 1.0)];

        let markers = reconcile_markers(&handle, Vec::new(), true, &points, on_activate).unwrap();
        assert_eq!(provider.live_markers(), 1);
        drop(markers);
        assert_eq!(provider.live_markers(), 0);
    }

    #[test]
    fn test_marker_set_reconcile_and_clear() {
        let (provider, handle) = setup();
        let (_, on_activate) = recorder();
        let points = vec![point(1, 1.0, 1.0), point(2, 2.0, 2.0)];
        let mut set = MarkerSet::new();

        assert_eq!(set.reconcile(&handle, true, &points, on_activate.clone()).unwrap(), 2);
        assert_eq!(set.point_ids(), vec![1, 2]);
        assert_eq!(set.reconcile(&handle, false, &points, on_activate.clone()).unwrap(), 0);
        assert!(set.is_empty());
        assert_eq!(set.reconcile(&handle, true, &points, on_activate).unwrap(), 2);

        set.clear();
        assert_eq!(set.len(), 0);
        assert_eq!(provider.live_markers(), 0);
    }

    #[test]
    fn test_failed_add_tears_down_partial_set() {
        let (provider, handle) = setup();
        let (_, on_activate) = recorder();
        let points = vec![point(1, 1.0, 1.0), point(2, 2.0, 2.0), point(3, 3.0, 3.0)];

        let previous =
            reconcile_markers(&handle, Vec::new(), true, &points, on_activate.clone()).unwrap();
        assert_eq!(provider.live_markers(), 3);

        provider.fail_marker_after(2);
        let result = reconcile_markers(&handle, previous, true, &points, on_activate);
        assert!(matches!(result, Err(crate::MapError::Marker(_))));
        assert_eq!(provider.live_markers(), 0);
        assert!(provider.marker_point_ids(handle.id()).is_empty());
    }

    #[test]
    fn test_marker_set_empty_after_failed_reconcile() {
        let (provider, handle) = setup();
        let (_, on_activate) = recorder();
        let points = vec![point(1, 1.0, 1.0), point(2, 2.0, 2.0)];
        let mut set = MarkerSet::new();

        provider.fail_marker_after(1);
        assert!(set.reconcile(&handle, true, &points, on_activate.clone()).is_err());
        assert!(set.is_empty());
        assert_eq!(provider.live_markers(), 0);

        // The hook is one-shot
        assert_eq!(set.reconcile(&handle, true, &points, on_activate).unwrap(), 2);
    }

    #[test]
    fn test_style_css() {
        let css = MarkerStyle::default().css_declarations(Some("https://i.pravatar.cc/150?img=1"));
        assert!(css.contains(&("width", "30px".to_string())));
        assert!(css.contains(&("border", "2px solid #0EA5E9".to_string())));
        assert!(css.contains(&("border-radius", "50%".to_string())));
        assert!(css.contains(&(
            "background-image",
            "url(https://i.pravatar.cc/150?img=1)".to_string()
        )));
    }
}

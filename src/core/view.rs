//! The map view component
//!
//! A [`MapView`] walks through provider bootstrap, map construction and
//! marker reconciliation in that order:
//!
//! ```text
//! Idle -> ProviderLoading -> ProviderReady -> MapReady(NoMarkers <-> WithMarkers)
//!              |                  |
//!              +----> Failed <----+
//! ```
//!
//! Callbacks registered with the provider hold only a weak reference and the
//! mount generation they were issued under. A callback that arrives after the
//! view was unmounted, remounted or dropped is discarded.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::{
    core::{
        config::MapViewOptions,
        map::{create_map, destroy_map, MapHandle},
    },
    data::points::PointOfInterest,
    layers::marker::{ActivateCallback, MarkerSet},
    provider::{
        registry::{ProviderLease, ProviderRegistry},
        ContainerRef, InstanceId,
    },
    ui::{overlay::TravelModeHint, popup::PopupCard},
    MapError, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerPhase {
    NoMarkers,
    WithMarkers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ProviderLoad,
    MapConstruction,
}

impl FailureKind {
    /// Message suitable for showing to the user
    pub fn user_message(&self) -> &'static str {
        match self {
            FailureKind::ProviderLoad => "The map service could not be loaded.",
            FailureKind::MapConstruction => "The map could not be displayed.",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewState {
    Idle,
    ProviderLoading,
    ProviderReady,
    MapReady(MarkerPhase),
    Failed { kind: FailureKind, message: String },
}

impl ViewState {
    pub fn is_map_ready(&self) -> bool {
        matches!(self, ViewState::MapReady(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ViewState::Failed { .. })
    }
}

impl fmt::Display for ViewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewState::Idle => write!(f, "idle"),
            ViewState::ProviderLoading => write!(f, "provider-loading"),
            ViewState::ProviderReady => write!(f, "provider-ready"),
            ViewState::MapReady(MarkerPhase::NoMarkers) => write!(f, "map-ready"),
            ViewState::MapReady(MarkerPhase::WithMarkers) => write!(f, "map-ready+markers"),
            ViewState::Failed { kind, message } => write!(f, "failed({:?}: {})", kind, message),
        }
    }
}

struct ViewInner {
    // Markers are declared before the map so they are released first.
    markers: MarkerSet,
    map: Option<MapHandle>,
    lease: Option<ProviderLease>,
    registry: ProviderRegistry,
    state: ViewState,
    container: ContainerRef,
    options: MapViewOptions,
    travel_mode: bool,
    points: Vec<PointOfInterest>,
    selected: Option<PointOfInterest>,
    listener: Option<ActivateCallback>,
    mounted: bool,
    generation: u64,
}

impl ViewInner {
    fn fail(&mut self, kind: FailureKind, error: MapError) {
        log::warn!("map view in '{}' failed: {}", self.container, error);
        self.markers.clear();
        self.map = None;
        self.state = ViewState::Failed {
            kind,
            message: error.to_string(),
        };
    }

    fn build_map(&mut self, on_activate: ActivateCallback) -> Result<()> {
        self.markers.clear();
        self.state = ViewState::ProviderReady;
        let built = create_map(&self.registry, &self.container, &self.options, &mut self.map)
            .map(|handle| handle.id());
        match built {
            Ok(id) => {
                log::debug!("'{}' bound to {}", self.container, id);
                self.state = ViewState::MapReady(MarkerPhase::NoMarkers);
                self.sync_markers(on_activate);
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                self.fail(FailureKind::MapConstruction, e);
                Err(MapError::MapConstructionFailed(message))
            }
        }
    }

    fn sync_markers(&mut self, on_activate: ActivateCallback) {
        let Some(map) = self.map.as_ref() else {
            return;
        };
        match self
            .markers
            .reconcile(map, self.travel_mode, &self.points, on_activate)
        {
            Ok(count) => {
                self.state = ViewState::MapReady(if self.travel_mode {
                    MarkerPhase::WithMarkers
                } else {
                    MarkerPhase::NoMarkers
                });
                log::debug!("'{}' now shows {} marker(s)", self.container, count);
            }
            Err(e) => {
                log::warn!("marker reconciliation in '{}' failed: {}", self.container, e);
                self.state = ViewState::MapReady(MarkerPhase::NoMarkers);
            }
        }
    }
}

/// A mountable map view bound to one container
pub struct MapView {
    inner: Rc<RefCell<ViewInner>>,
}

impl MapView {
    pub fn new(registry: ProviderRegistry, container: ContainerRef) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ViewInner {
                markers: MarkerSet::new(),
                map: None,
                lease: None,
                registry,
                state: ViewState::Idle,
                container,
                options: MapViewOptions::default(),
                travel_mode: false,
                points: Vec::new(),
                selected: None,
                listener: None,
                mounted: false,
                generation: 0,
            })),
        }
    }

    pub fn with_options(self, options: MapViewOptions) -> Self {
        self.inner.borrow_mut().options = options;
        self
    }

    pub fn with_points(self, points: Vec<PointOfInterest>) -> Self {
        self.inner.borrow_mut().points = points;
        self
    }

    pub fn with_travel_mode(self, enabled: bool) -> Self {
        self.inner.borrow_mut().travel_mode = enabled;
        self
    }

    /// Register the listener invoked when a marker is activated
    pub fn on_activate<F>(&self, listener: F)
    where
        F: Fn(&PointOfInterest) + 'static,
    {
        self.inner.borrow_mut().listener = Some(Rc::new(listener));
    }

    /// Start the bootstrap sequence. Mounting a mounted view does nothing.
    pub fn mount(&self) {
        let (registry, generation) = {
            let mut inner = self.inner.borrow_mut();
            if inner.mounted {
                log::debug!("'{}' is already mounted", inner.container);
                return;
            }
            inner.mounted = true;
            inner.generation += 1;
            inner.state = ViewState::ProviderLoading;
            let lease = inner.registry.acquire();
            inner.lease = Some(lease);
            log::info!(
                "mounting map view in '{}' (generation {})",
                inner.container,
                inner.generation
            );
            (inner.registry.clone(), inner.generation)
        };

        // `ensure` may answer synchronously, so no borrow is held here.
        let on_ready = Rc::downgrade(&self.inner);
        let on_error = on_ready.clone();
        registry.ensure(
            move || Self::provider_ready(&on_ready, generation),
            move |error| Self::provider_failed(&on_error, generation, error),
        );
    }

    /// Tear everything down and return to `Idle`
    pub fn unmount(&self) {
        let (mut markers, map, lease) = {
            let mut inner = self.inner.borrow_mut();
            if !inner.mounted {
                return;
            }
            inner.mounted = false;
            inner.generation += 1;
            inner.state = ViewState::Idle;
            inner.selected = None;
            log::info!("unmounting map view in '{}'", inner.container);
            (
                std::mem::take(&mut inner.markers),
                inner.map.take(),
                inner.lease.take(),
            )
        };

        markers.clear();
        if let Some(map) = map {
            let id = map.id();
            if let Err(e) = destroy_map(map) {
                log::warn!("failed to destroy {} on unmount: {}", id, e);
            }
        }
        drop(lease);
    }

    /// Remount from scratch; the only way out of `Failed`
    pub fn retry(&self) {
        self.unmount();
        self.mount();
    }

    pub fn set_travel_mode(&self, enabled: bool) {
        let on_activate = self.activation_callback();
        let mut inner = self.inner.borrow_mut();
        if inner.travel_mode == enabled {
            return;
        }
        inner.travel_mode = enabled;
        log::debug!("travel mode {} for '{}'", if enabled { "on" } else { "off" }, inner.container);
        if inner.state.is_map_ready() {
            inner.sync_markers(on_activate);
        }
    }

    pub fn set_points(&self, points: Vec<PointOfInterest>) {
        let on_activate = self.activation_callback();
        let mut inner = self.inner.borrow_mut();
        inner.points = points;
        if inner.state.is_map_ready() {
            inner.sync_markers(on_activate);
        }
    }

    /// Replace the map instance with one built from `options`.
    ///
    /// Before the map exists the options are only stored for the upcoming
    /// construction.
    pub fn reinitialize(&self, options: MapViewOptions) -> Result<()> {
        let on_activate = self.activation_callback();
        let mut inner = self.inner.borrow_mut();
        inner.options = options;
        if inner.state.is_map_ready() {
            log::info!("re-initializing map in '{}'", inner.container);
            inner.build_map(on_activate)
        } else {
            Ok(())
        }
    }

    pub fn state(&self) -> ViewState {
        self.inner.borrow().state.clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.borrow().mounted
    }

    pub fn has_map(&self) -> bool {
        self.inner.borrow().map.is_some()
    }

    pub fn map_id(&self) -> Option<InstanceId> {
        self.inner.borrow().map.as_ref().map(MapHandle::id)
    }

    pub fn marker_count(&self) -> usize {
        self.inner.borrow().markers.len()
    }

    pub fn marker_point_ids(&self) -> Vec<i64> {
        self.inner.borrow().markers.point_ids()
    }

    pub fn travel_mode(&self) -> bool {
        self.inner.borrow().travel_mode
    }

    pub fn options(&self) -> MapViewOptions {
        self.inner.borrow().options.clone()
    }

    pub fn container(&self) -> ContainerRef {
        self.inner.borrow().container.clone()
    }

    pub fn registry(&self) -> ProviderRegistry {
        self.inner.borrow().registry.clone()
    }

    pub fn selected_point(&self) -> Option<PointOfInterest> {
        self.inner.borrow().selected.clone()
    }

    /// Close the popup, clearing the selection
    pub fn dismiss_selection(&self) {
        self.inner.borrow_mut().selected = None;
    }

    pub fn popup(&self) -> Option<PopupCard> {
        self.inner.borrow().selected.as_ref().map(PopupCard::for_point)
    }

    /// Hint shown while travel mode is off and the view has not failed
    pub fn overlay(&self) -> Option<TravelModeHint> {
        let inner = self.inner.borrow();
        if inner.travel_mode || inner.state.is_failed() {
            None
        } else {
            Some(TravelModeHint::default())
        }
    }

    pub fn failure_message(&self) -> Option<&'static str> {
        match &self.inner.borrow().state {
            ViewState::Failed { kind, .. } => Some(kind.user_message()),
            _ => None,
        }
    }

    fn activation_callback(&self) -> ActivateCallback {
        let generation = self.inner.borrow().generation;
        Self::activation_for(Rc::downgrade(&self.inner), generation)
    }

    fn activation_for(view: Weak<RefCell<ViewInner>>, generation: u64) -> ActivateCallback {
        Rc::new(move |point: &PointOfInterest| {
            let Some(inner) = Self::live(&view, generation) else {
                log::trace!("dropping activation of point {} for a detached view", point.id);
                return;
            };
            let listener = {
                let mut inner = inner.borrow_mut();
                inner.selected = Some(point.clone());
                inner.listener.clone()
            };
            // The listener may toggle travel mode, so the view is not borrowed.
            if let Some(listener) = listener {
                listener(point);
            }
        })
    }

    /// Upgrade `view` if it is still mounted under `generation`
    fn live(view: &Weak<RefCell<ViewInner>>, generation: u64) -> Option<Rc<RefCell<ViewInner>>> {
        let inner = view.upgrade()?;
        let current = {
            let state = inner.borrow();
            state.mounted && state.generation == generation
        };
        current.then_some(inner)
    }

    fn provider_ready(view: &Weak<RefCell<ViewInner>>, generation: u64) {
        let Some(inner) = Self::live(view, generation) else {
            log::trace!("{}", MapError::StaleCallback);
            return;
        };
        let on_activate = Self::activation_for(view.clone(), generation);
        let mut inner = inner.borrow_mut();
        if let Err(e) = inner.build_map(on_activate) {
            log::debug!("map construction after provider load failed: {}", e);
        }
    }

    fn provider_failed(view: &Weak<RefCell<ViewInner>>, generation: u64, error: MapError) {
        let Some(inner) = Self::live(view, generation) else {
            log::trace!("{} ({})", MapError::StaleCallback, error);
            return;
        };
        inner.borrow_mut().fail(FailureKind::ProviderLoad, error);
    }
}

impl Drop for MapView {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl fmt::Debug for MapView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("MapView")
            .field("container", &inner.container)
            .field("state", &inner.state)
            .field("travel_mode", &inner.travel_mode)
            .field("markers", &inner.markers.len())
            .field("mounted", &inner.mounted)
            .finish()
    }
}

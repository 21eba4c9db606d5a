//! In-memory provider adapter
//!
//! Keeps map instances and markers in plain collections. Used for tests,
//! server-side rendering and the demo binary, and as the reference for how
//! an adapter is expected to behave.

use std::cell::RefCell;

use crate::{
    core::config::MapViewOptions,
    layers::marker::MarkerOptions,
    prelude::{HashMap, HashSet},
    provider::{ContainerRef, InstanceId, LoadCompletion, MapProvider, MarkerClick, MarkerId},
    MapError, Result,
};

/// How [`HeadlessProvider::load`] settles
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadBehavior {
    /// Settle successfully before `load` returns
    Immediate,
    /// Hold the completion until [`HeadlessProvider::finish_load`] or
    /// [`HeadlessProvider::fail_load`]
    Deferred,
    /// Fail before `load` returns
    Fail(String),
}

struct HeadlessMarker {
    options: MarkerOptions,
    on_click: MarkerClick,
}

struct HeadlessInstance {
    container: ContainerRef,
    options: MapViewOptions,
    markers: HashMap<MarkerId, HeadlessMarker>,
}

#[derive(Default)]
struct HeadlessState {
    pending: Vec<LoadCompletion>,
    loader_present: bool,
    loaded: bool,
    insertions: usize,
    next_id: u64,
    instances: HashMap<InstanceId, HeadlessInstance>,
    instances_created: usize,
    instances_destroyed: usize,
    detached: HashSet<String>,
    fail_next_instance: Option<String>,
    /// Successful `add_marker` calls left before the next one fails
    marker_budget: Option<usize>,
}

impl HeadlessState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

pub struct HeadlessProvider {
    behavior: RefCell<LoadBehavior>,
    state: RefCell<HeadlessState>,
}

impl HeadlessProvider {
    pub fn new() -> Self {
        Self::with_behavior(LoadBehavior::Immediate)
    }

    pub fn deferred() -> Self {
        Self::with_behavior(LoadBehavior::Deferred)
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self::with_behavior(LoadBehavior::Fail(reason.into()))
    }

    pub fn with_behavior(behavior: LoadBehavior) -> Self {
        Self {
            behavior: RefCell::new(behavior),
            state: RefCell::new(HeadlessState::default()),
        }
    }

    pub fn set_behavior(&self, behavior: LoadBehavior) {
        *self.behavior.borrow_mut() = behavior;
    }

    /// Settle every pending load successfully
    pub fn finish_load(&self) {
        self.settle(Ok(()));
    }

    /// Settle every pending load with an error
    pub fn fail_load(&self, reason: impl Into<String>) {
        self.settle(Err(reason.into()));
    }

    fn settle(&self, outcome: std::result::Result<(), String>) {
        let pending = {
            let mut state = self.state.borrow_mut();
            if outcome.is_ok() && state.loader_present {
                state.loaded = true;
            }
            std::mem::take(&mut state.pending)
        };
        for completion in pending {
            completion.complete(outcome.clone());
        }
    }

    pub fn has_pending_load(&self) -> bool {
        !self.state.borrow().pending.is_empty()
    }

    pub fn loader_insertions(&self) -> usize {
        self.state.borrow().insertions
    }

    pub fn is_loader_present(&self) -> bool {
        self.state.borrow().loader_present
    }

    /// Make instance construction fail for `container`
    pub fn detach_container(&self, container: &ContainerRef) {
        self.state
            .borrow_mut()
            .detached
            .insert(container.id().to_string());
    }

    /// Make the next `create_instance` call fail
    pub fn fail_next_instance(&self, reason: impl Into<String>) {
        self.state.borrow_mut().fail_next_instance = Some(reason.into());
    }

    /// Let `count` more markers be added, then fail the next `add_marker`
    pub fn fail_marker_after(&self, count: usize) {
        self.state.borrow_mut().marker_budget = Some(count);
    }

    pub fn live_instances(&self) -> usize {
        self.state.borrow().instances.len()
    }

    pub fn instances_created(&self) -> usize {
        self.state.borrow().instances_created
    }

    pub fn instances_destroyed(&self) -> usize {
        self.state.borrow().instances_destroyed
    }

    pub fn live_markers(&self) -> usize {
        self.state
            .borrow()
            .instances
            .values()
            .map(|instance| instance.markers.len())
            .sum()
    }

    pub fn instance_container(&self, instance: InstanceId) -> Option<ContainerRef> {
        self.state
            .borrow()
            .instances
            .get(&instance)
            .map(|i| i.container.clone())
    }

    pub fn instance_options(&self, instance: InstanceId) -> Option<MapViewOptions> {
        self.state
            .borrow()
            .instances
            .get(&instance)
            .map(|i| i.options.clone())
    }

    /// Point ids of the markers attached to `instance`, sorted
    pub fn marker_point_ids(&self, instance: InstanceId) -> Vec<i64> {
        let state = self.state.borrow();
        let mut ids: Vec<i64> = state
            .instances
            .get(&instance)
            .map(|i| i.markers.values().map(|m| m.options.point_id).collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    pub fn marker_options(&self, marker: MarkerId) -> Option<MarkerOptions> {
        self.state
            .borrow()
            .instances
            .values()
            .find_map(|i| i.markers.get(&marker).map(|m| m.options.clone()))
    }

    /// Simulate a click on a marker. Returns false when no such marker is live.
    pub fn click_marker(&self, marker: MarkerId) -> bool {
        let on_click = self
            .state
            .borrow()
            .instances
            .values()
            .find_map(|i| i.markers.get(&marker).map(|m| m.on_click.clone()));
        Self::fire(on_click)
    }

    /// Simulate a click on the live marker built for `point_id`
    pub fn click_point(&self, point_id: i64) -> bool {
        let on_click = self.state.borrow().instances.values().find_map(|i| {
            i.markers
                .values()
                .find(|m| m.options.point_id == point_id)
                .map(|m| m.on_click.clone())
        });
        Self::fire(on_click)
    }

    // The click handler may reconcile markers, so no borrow is held here.
    fn fire(on_click: Option<MarkerClick>) -> bool {
        match on_click {
            Some(on_click) => {
                on_click();
                true
            }
            None => false,
        }
    }
}

impl Default for HeadlessProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MapProvider for HeadlessProvider {
    fn name(&self) -> &str {
        "headless"
    }

    fn load(&self, completion: LoadCompletion) {
        let behavior = self.behavior.borrow().clone();
        {
            let mut state = self.state.borrow_mut();
            state.insertions += 1;
            state.loader_present = true;
            if behavior == LoadBehavior::Immediate {
                state.loaded = true;
            }
        }

        match behavior {
            LoadBehavior::Immediate => completion.succeed(),
            LoadBehavior::Deferred => self.state.borrow_mut().pending.push(completion),
            LoadBehavior::Fail(reason) => completion.fail(reason),
        }
    }

    fn unload(&self) {
        let mut state = self.state.borrow_mut();
        state.loader_present = false;
        state.loaded = false;
        state.pending.clear();
    }

    fn create_instance(
        &self,
        container: &ContainerRef,
        options: &MapViewOptions,
    ) -> Result<InstanceId> {
        let mut state = self.state.borrow_mut();
        if !state.loaded {
            return Err(MapError::ProviderNotReady);
        }
        if let Some(reason) = state.fail_next_instance.take() {
            return Err(MapError::MapConstructionFailed(reason));
        }
        if state.detached.contains(container.id()) {
            return Err(MapError::MapConstructionFailed(format!(
                "container '{}' is not attached",
                container
            )));
        }

        let id = InstanceId(state.next_id());
        state.instances.insert(
            id,
            HeadlessInstance {
                container: container.clone(),
                options: options.clone(),
                markers: HashMap::default(),
            },
        );
        state.instances_created += 1;
        Ok(id)
    }

    fn destroy_instance(&self, instance: InstanceId) -> Result<()> {
        let removed = {
            let mut state = self.state.borrow_mut();
            let removed = state.instances.remove(&instance);
            if removed.is_some() {
                state.instances_destroyed += 1;
            }
            removed
        };
        // Marker callbacks are dropped outside the borrow
        match removed {
            Some(_) => Ok(()),
            None => Err(MapError::Instance(format!("{} is not live", instance))),
        }
    }

    fn add_marker(
        &self,
        instance: InstanceId,
        options: &MarkerOptions,
        on_click: MarkerClick,
    ) -> Result<MarkerId> {
        let mut state = self.state.borrow_mut();
        match state.marker_budget {
            Some(0) => {
                state.marker_budget = None;
                return Err(MapError::Marker(format!(
                    "cannot add marker for point {}",
                    options.point_id
                )));
            }
            Some(ref mut remaining) => *remaining -= 1,
            None => {}
        }
        let id = MarkerId(state.next_id());
        let entry = state
            .instances
            .get_mut(&instance)
            .ok_or_else(|| MapError::Instance(format!("{} is not live", instance)))?;
        entry.markers.insert(
            id,
            HeadlessMarker {
                options: options.clone(),
                on_click,
            },
        );
        Ok(id)
    }

    fn remove_marker(&self, instance: InstanceId, marker: MarkerId) -> Result<()> {
        let removed = {
            let mut state = self.state.borrow_mut();
            state
                .instances
                .get_mut(&instance)
                .and_then(|i| i.markers.remove(&marker))
        };
        match removed {
            Some(_) => Ok(()),
            None => Err(MapError::Marker(format!(
                "{} is not attached to {}",
                marker, instance
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{core::geo::LatLng, provider::registry::ProviderRegistry};
    use std::cell::Cell;
    use std::rc::Rc;

    fn ready_provider() -> (Rc<HeadlessProvider>, ProviderRegistry) {
        let provider = Rc::new(HeadlessProvider::new());
        let registry = ProviderRegistry::new(provider.clone());
        registry.ensure(|| {}, |_| {});
        (provider, registry)
    }

    #[test]
    fn test_instance_requires_loaded_provider() {
        let provider = HeadlessProvider::new();
        let err = provider
            .create_instance(&ContainerRef::new("map"), &MapViewOptions::default())
            .unwrap_err();
        assert!(matches!(err, MapError::ProviderNotReady));
    }

    #[test]
    fn test_instance_lifecycle() {
        let (provider, _registry) = ready_provider();
        let options = MapViewOptions::default().with_zoom(4.0);
        let id = provider
            .create_instance(&ContainerRef::new("map"), &options)
            .unwrap();

        assert_eq!(provider.live_instances(), 1);
        assert_eq!(provider.instance_options(id), Some(options));
        assert_eq!(provider.instance_container(id), Some(ContainerRef::new("map")));

        provider.destroy_instance(id).unwrap();
        assert_eq!(provider.live_instances(), 0);
        assert!(provider.destroy_instance(id).is_err());
    }

    #[test]
    fn test_detached_container_fails() {
        let (provider, _registry) = ready_provider();
        let container = ContainerRef::new("gone");
        provider.detach_container(&container);

        let err = provider
            .create_instance(&container, &MapViewOptions::default())
            .unwrap_err();
        assert!(matches!(err, MapError::MapConstructionFailed(_)));
        assert_eq!(provider.live_instances(), 0);
    }

    #[test]
    fn test_marker_click() {
        let (provider, _registry) = ready_provider();
        let id = provider
            .create_instance(&ContainerRef::new("map"), &MapViewOptions::default())
            .unwrap();

        let clicks = Rc::new(Cell::new(0));
        let counter = clicks.clone();
        let options = MarkerOptions::new(9, LatLng::new(1.0, 2.0), "Nine");
        let marker = provider
            .add_marker(id, &options, Rc::new(move || counter.set(counter.get() + 1)))
            .unwrap();

        assert!(provider.click_marker(marker));
        assert!(provider.click_point(9));
        assert!(!provider.click_point(10));
        assert_eq!(clicks.get(), 2);
        assert_eq!(provider.marker_point_ids(id), vec![9]);

        provider.remove_marker(id, marker).unwrap();
        assert!(!provider.click_marker(marker));
        assert_eq!(provider.live_markers(), 0);
    }
}

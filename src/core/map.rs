//! Map instance lifecycle
//!
//! A [`MapHandle`] is the only owner of a provider map instance. It is
//! destroyed exactly once: explicitly through [`destroy_map`], or on drop
//! for every other exit path.

use std::fmt;
use std::rc::Rc;

use crate::{
    core::config::MapViewOptions,
    layers::marker::{MarkerHandle, MarkerOptions},
    provider::{registry::ProviderRegistry, ContainerRef, InstanceId, MapProvider, MarkerClick},
    MapError, Result,
};

pub struct MapHandle {
    provider: Rc<dyn MapProvider>,
    id: InstanceId,
    container: ContainerRef,
    options: MapViewOptions,
    alive: bool,
}

impl MapHandle {
    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn container(&self) -> &ContainerRef {
        &self.container
    }

    pub fn options(&self) -> &MapViewOptions {
        &self.options
    }

    pub(crate) fn add_marker(
        &self,
        options: &MarkerOptions,
        on_click: MarkerClick,
    ) -> Result<MarkerHandle> {
        let marker = self.provider.add_marker(self.id, options, on_click)?;
        Ok(MarkerHandle::new(
            self.provider.clone(),
            self.id,
            marker,
            options.point_id,
        ))
    }

    pub fn destroy(mut self) -> Result<()> {
        self.alive = false;
        log::debug!("destroying {} in '{}'", self.id, self.container);
        self.provider.destroy_instance(self.id)
    }
}

impl Drop for MapHandle {
    fn drop(&mut self) {
        if self.alive {
            log::debug!("releasing {} in '{}'", self.id, self.container);
            if let Err(e) = self.provider.destroy_instance(self.id) {
                log::warn!("failed to destroy {}: {}", self.id, e);
            }
        }
    }
}

impl fmt::Debug for MapHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapHandle")
            .field("id", &self.id)
            .field("container", &self.container)
            .field("alive", &self.alive)
            .finish()
    }
}

/// Create the map instance for `slot`, replacing any instance already there.
///
/// The previous handle is destroyed before the new instance is requested, so
/// a container never holds two maps. On failure `slot` is left empty.
pub fn create_map<'a>(
    registry: &ProviderRegistry,
    container: &ContainerRef,
    options: &MapViewOptions,
    slot: &'a mut Option<MapHandle>,
) -> Result<&'a MapHandle> {
    if !registry.is_ready() {
        return Err(MapError::ProviderNotReady);
    }

    if let Some(previous) = slot.take() {
        let id = previous.id();
        if let Err(e) = destroy_map(previous) {
            log::warn!("failed to destroy {} before re-creating: {}", id, e);
        }
    }

    options
        .validate()
        .map_err(|e| MapError::MapConstructionFailed(e.to_string()))?;

    let provider = registry.provider().clone();
    let id = provider
        .create_instance(container, options)
        .map_err(|e| match e {
            MapError::MapConstructionFailed(_) => e,
            other => MapError::MapConstructionFailed(other.to_string()),
        })?;

    log::info!("created {} in '{}' via {}", id, container, provider.name());
    let handle: &'a MapHandle = slot.insert(MapHandle {
        provider,
        id,
        container: container.clone(),
        options: options.clone(),
        alive: true,
    });
    Ok(handle)
}

pub fn destroy_map(handle: MapHandle) -> Result<()> {
    handle.destroy()
}

//! Capability interface for external mapping providers
//!
//! The core state machine only talks to [`MapProvider`]. Each mapping SDK is
//! wrapped by one adapter and a deployment picks exactly one of them.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::{core::config::MapViewOptions, layers::marker::MarkerOptions, Result};

pub mod headless;
pub mod registry;
#[cfg(feature = "wasm")]
pub mod web;

pub use registry::LoadCompletion;

/// Identifier of a map instance inside a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub u64);

/// Identifier of a marker inside a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkerId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "map#{}", self.0)
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "marker#{}", self.0)
    }
}

/// Render target a map instance attaches to (a DOM element id in browsers)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerRef(String);

impl ContainerRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a script-tag loader brings the provider onto the page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderPlan {
    /// The provider global is already installed
    UseGlobal,
    /// No loader tag exists yet
    Insert,
    /// A tag exists but its global never appeared. Its `load`/`error` events
    /// may already have fired, so it is removed and a fresh tag inserted.
    ReplaceStale,
}

impl LoaderPlan {
    pub fn for_page(global_present: bool, tag_present: bool) -> Self {
        match (global_present, tag_present) {
            (true, _) => LoaderPlan::UseGlobal,
            (false, false) => LoaderPlan::Insert,
            (false, true) => LoaderPlan::ReplaceStale,
        }
    }
}

/// Invoked by the provider when a marker is clicked
pub type MarkerClick = Rc<dyn Fn()>;

/// Adapter over one mapping SDK
pub trait MapProvider {
    /// Adapter name, used in log output only
    fn name(&self) -> &str;

    /// Insert the loader resource.
    ///
    /// The adapter settles `completion` exactly once, either before returning
    /// or later from the event loop.
    fn load(&self, completion: LoadCompletion);

    /// Remove the loader resource inserted by [`MapProvider::load`]
    fn unload(&self) {}

    fn create_instance(
        &self,
        container: &ContainerRef,
        options: &MapViewOptions,
    ) -> Result<InstanceId>;

    fn destroy_instance(&self, instance: InstanceId) -> Result<()>;

    fn add_marker(
        &self,
        instance: InstanceId,
        options: &MarkerOptions,
        on_click: MarkerClick,
    ) -> Result<MarkerId>;

    fn remove_marker(&self, instance: InstanceId, marker: MarkerId) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_plan() {
        assert_eq!(LoaderPlan::for_page(true, true), LoaderPlan::UseGlobal);
        assert_eq!(LoaderPlan::for_page(true, false), LoaderPlan::UseGlobal);
        assert_eq!(LoaderPlan::for_page(false, false), LoaderPlan::Insert);
        // A tag whose global never showed up is never waited on
        assert_eq!(LoaderPlan::for_page(false, true), LoaderPlan::ReplaceStale);
    }

    #[test]
    fn test_id_display() {
        assert_eq!(InstanceId(3).to_string(), "map#3");
        assert_eq!(MarkerId(12).to_string(), "marker#12");
        assert_eq!(ContainerRef::new("travel-map").to_string(), "travel-map");
    }
}

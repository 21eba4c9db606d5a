//! Prelude module for common tripmap types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use tripmap::prelude::*;`

pub use crate::core::{
    config::{
        BootstrapPolicy, BootstrapProfile, CleanupPolicy, MapViewOptions, PendingCallerPolicy,
        ProviderSettings, TripmapConfig,
    },
    geo::LatLng,
    map::{create_map, destroy_map, MapHandle},
    view::{FailureKind, MapView, MarkerPhase, ViewState},
};

pub use crate::layers::marker::{
    reconcile_markers, ActivateCallback, MarkerHandle, MarkerOptions, MarkerSet, MarkerStyle,
};

pub use crate::data::points::{demo_travelers, load_points, PointOfInterest};

pub use crate::provider::{
    headless::{HeadlessProvider, LoadBehavior},
    registry::{LoadCompletion, ProviderLease, ProviderLoadState, ProviderRegistry},
    ContainerRef, InstanceId, MapProvider, MarkerClick, MarkerId,
};

#[cfg(feature = "wasm")]
pub use crate::provider::web::WebScriptProvider;

pub use crate::ui::{
    overlay::TravelModeHint,
    popup::{PopupAction, PopupCard},
};

pub use crate::{Error as MapError, Result};

pub use std::rc::Rc;

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};

//! # tripmap
//!
//! Map-provider bootstrap, map-instance lifecycle and marker reconciliation
//! for a travel-companion map view.
//!
//! The external mapping library is reached through the [`MapProvider`]
//! capability trait. One adapter is picked per deployment: the in-memory
//! [`HeadlessProvider`], or the browser script loader behind the `wasm`
//! feature. A [`ProviderRegistry`] owns the page-wide load state and every
//! [`MapView`] mounted against it shares the single loaded provider.

pub mod core;
pub mod data;
pub mod layers;
pub mod prelude;
pub mod provider;
pub mod ui;

// Re-export public API
pub use crate::core::{
    config::{BootstrapPolicy, MapViewOptions, ProviderSettings, TripmapConfig},
    geo::LatLng,
    map::{create_map, destroy_map, MapHandle},
    view::{FailureKind, MapView, MarkerPhase, ViewState},
};

pub use data::points::{demo_travelers, load_points, PointOfInterest};

pub use layers::marker::{reconcile_markers, MarkerHandle, MarkerOptions, MarkerSet, MarkerStyle};

pub use provider::{
    headless::HeadlessProvider,
    registry::{ProviderLease, ProviderLoadState, ProviderRegistry},
    ContainerRef, InstanceId, LoadCompletion, MapProvider, MarkerId,
};

pub use ui::{overlay::TravelModeHint, popup::PopupCard};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, MapError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Provider failed to load: {0}")]
    ProviderLoadFailed(String),

    #[error("Map construction failed: {0}")]
    MapConstructionFailed(String),

    #[error("Callback fired for a detached view")]
    StaleCallback,

    #[error("Provider is not ready")]
    ProviderNotReady,

    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("Map instance error: {0}")]
    Instance(String),

    #[error("Marker error: {0}")]
    Marker(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error type alias for convenience
pub type Error = MapError;

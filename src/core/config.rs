//! Configuration for map views and provider bootstrap
//!
//! Every structure here deserializes from JSON with defaults for missing
//! fields. Unknown fields are ignored so configuration written for a richer
//! provider can be fed to any adapter.

use serde::{Deserialize, Serialize};

use crate::{core::geo::LatLng, MapError, Result};

/// Highest zoom level any supported provider accepts
pub const MAX_ZOOM_LEVEL: f64 = 24.0;

/// Options recognised when constructing a map instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MapViewOptions {
    pub center_latitude: f64,
    pub center_longitude: f64,
    pub zoom_level: f64,
    pub zoom_control_enabled: bool,
}

impl MapViewOptions {
    pub fn center(&self) -> LatLng {
        LatLng::new(self.center_latitude, self.center_longitude)
    }

    pub fn with_center(mut self, center: LatLng) -> Self {
        self.center_latitude = center.lat;
        self.center_longitude = center.lng;
        self
    }

    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom_level = zoom;
        self
    }

    pub fn with_zoom_control(mut self, enabled: bool) -> Self {
        self.zoom_control_enabled = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.center().validate()?;
        if !(0.0..=MAX_ZOOM_LEVEL).contains(&self.zoom_level) {
            return Err(MapError::Config(format!(
                "zoom level {} outside 0..={}",
                self.zoom_level, MAX_ZOOM_LEVEL
            )));
        }
        Ok(())
    }
}

impl Default for MapViewOptions {
    /// World view slightly north of the equator with navigation controls
    fn default() -> Self {
        Self {
            center_latitude: 20.0,
            center_longitude: 0.0,
            zoom_level: 1.5,
            zoom_control_enabled: true,
        }
    }
}

/// Where and how the external provider is loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderSettings {
    pub loader_url: String,
    pub stylesheet_url: Option<String>,
    pub access_token: Option<String>,
    pub style_url: String,
    /// Element id marking the singleton loader tag
    pub script_element_id: String,
    /// Global object the loader installs on `window`
    pub global_name: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            loader_url: "https://api.mapbox.com/mapbox-gl-js/v2.15.0/mapbox-gl.js".to_string(),
            stylesheet_url: Some(
                "https://api.mapbox.com/mapbox-gl-js/v2.15.0/mapbox-gl.css".to_string(),
            ),
            access_token: None,
            style_url: "mapbox://styles/mapbox/streets-v11".to_string(),
            script_element_id: "tripmap-provider-loader".to_string(),
            global_name: "mapboxgl".to_string(),
        }
    }
}

impl ProviderSettings {
    pub fn validate(&self) -> Result<()> {
        if self.loader_url.trim().is_empty() {
            return Err(MapError::Config("loader url is empty".to_string()));
        }
        if self.script_element_id.trim().is_empty() {
            return Err(MapError::Config("script element id is empty".to_string()));
        }
        if self.global_name.trim().is_empty() {
            return Err(MapError::Config("provider global name is empty".to_string()));
        }
        Ok(())
    }
}

/// What happens to a caller that asks for the provider while it is loading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PendingCallerPolicy {
    /// Caller waits and is notified when the load settles
    Queue,
    /// Caller is dropped; only the first caller hears about the load
    DropLate,
}

/// What happens to the loader resource when views unmount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CleanupPolicy {
    /// The loader stays for the whole page session
    Retain,
    /// The loader is removed once the last lease is released
    RefCounted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BootstrapPolicy {
    pub pending: PendingCallerPolicy,
    pub cleanup: CleanupPolicy,
}

impl Default for BootstrapPolicy {
    fn default() -> Self {
        BootstrapProfile::default().resolve()
    }
}

/// Named bootstrap presets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapProfile {
    /// Several views share one loader that is never removed
    Shared,
    /// Single-consumer loader; late callers are not queued
    Minimal,
    /// Loader lives only while at least one view holds a lease
    Scoped,
    Custom(BootstrapPolicy),
}

impl BootstrapProfile {
    pub fn resolve(&self) -> BootstrapPolicy {
        match self {
            Self::Shared => BootstrapPolicy {
                pending: PendingCallerPolicy::Queue,
                cleanup: CleanupPolicy::Retain,
            },
            Self::Minimal => BootstrapPolicy {
                pending: PendingCallerPolicy::DropLate,
                cleanup: CleanupPolicy::Retain,
            },
            Self::Scoped => BootstrapPolicy {
                pending: PendingCallerPolicy::Queue,
                cleanup: CleanupPolicy::RefCounted,
            },
            Self::Custom(policy) => *policy,
        }
    }
}

impl Default for BootstrapProfile {
    fn default() -> Self {
        Self::Shared
    }
}

/// Complete configuration for one deployment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TripmapConfig {
    pub map: MapViewOptions,
    pub provider: ProviderSettings,
    pub bootstrap: BootstrapPolicy,
}

impl TripmapConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        log::debug!("loading configuration from {}", path.display());
        Self::from_json_str(&raw)
    }

    pub fn with_profile(mut self, profile: BootstrapProfile) -> Self {
        self.bootstrap = profile.resolve();
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.map.validate()?;
        self.provider.validate()
    }
}

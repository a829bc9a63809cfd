use crate::{OverlayMode, OwnerKey, dynamic_id};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenomeInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub image_key: Option<String>,
}

/// A time-varying family of models shown through one slider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyInfo {
    pub id: String,
    pub name: String,
    /// Slider positions, in ascending order.
    #[serde(default)]
    pub times: Vec<u32>,
    #[serde(default)]
    pub image_key: Option<String>,
}

impl ProxyInfo {
    /// Model IDs reachable through the slider, one per time.
    pub fn proxied_keys(&self) -> Vec<String> {
        self.times
            .iter()
            .map(|t| dynamic_id::time_model_id(&self.id, *t))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub key: String,
    pub name: String,
    /// Shown when the overlay is first displayed.
    #[serde(default)]
    pub first_view_shown: bool,
    /// Contents revealed when the overlay is first displayed (opaque overlays only).
    #[serde(default)]
    pub first_view_revealed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayInfo {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub mode: OverlayMode,
    #[serde(default)]
    pub modules: Vec<ModuleInfo>,
    /// The overlay shown the first time its owner is displayed.
    #[serde(default)]
    pub first_view: bool,
}

impl OverlayInfo {
    pub fn has_module(&self, key: &str) -> bool {
        self.modules.iter().any(|m| m.key == key)
    }
}

/// Read-only access to the genome and network model that the navigation layer
/// sits on top of.
pub trait ModelSource {
    fn genome(&self, model_id: &str) -> Option<GenomeInfo>;

    fn dynamic_proxy(&self, proxy_id: &str) -> Option<ProxyInfo>;

    /// Overlays hosted by `owner`, in display order.
    fn overlays(&self, owner: &OwnerKey) -> Vec<OverlayInfo>;

    fn overlay(&self, owner: &OwnerKey, overlay_key: &str) -> Option<OverlayInfo> {
        self.overlays(owner).into_iter().find(|o| o.key == overlay_key)
    }

    fn overlay_mode(&self, owner: &OwnerKey, overlay_key: &str) -> Option<OverlayMode> {
        self.overlay(owner, overlay_key).map(|o| o.mode)
    }

    /// Display name for a model, resolving dynamic model IDs through their proxy.
    fn model_name(&self, model_id: &str) -> Option<String> {
        if let Some(proxy_id) = dynamic_id::extract_proxy_id(model_id) {
            return self.dynamic_proxy(proxy_id).map(|p| p.name);
        }
        self.genome(model_id).map(|g| g.name)
    }

    fn model_image(&self, model_id: &str) -> Option<String> {
        if let Some(proxy_id) = dynamic_id::extract_proxy_id(model_id) {
            return self.dynamic_proxy(proxy_id).and_then(|p| p.image_key);
        }
        self.genome(model_id).and_then(|g| g.image_key)
    }
}

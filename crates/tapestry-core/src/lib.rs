use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod dynamic_id;
pub mod labeller;
pub mod memory;
pub mod messages;
pub mod model_source;

pub use labeller::{LabelError, UniqueLabeller};
pub use memory::InMemoryModelSource;
pub use messages::Messages;
pub use model_source::{GenomeInfo, ModelSource, ModuleInfo, OverlayInfo, ProxyInfo};

/// Stable identifier of a node in the navigation tree.
///
/// Model IDs are shared between a dynamic proxy's sum node and its per-time
/// models, so this is the only key that is safe to hold across edits.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NavNodeId(pub String);

impl NavNodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NavNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
#[repr(i32)]
pub enum NavNodeKind {
    HIDDEN_ROOT,
    ROOT_MODEL,
    ROOT_INSTANCE,
    STATIC_CHILD_INSTANCE,
    DYNAMIC_SUM_INSTANCE,
    DYNAMIC_SLIDER_INSTANCE,
    GROUP_NODE,
}

impl NavNodeKind {
    /// Tag written to the `type` attribute of `<navTreeNode>`.
    pub fn as_tag(&self) -> &'static str {
        match self {
            NavNodeKind::HIDDEN_ROOT => "hiddenRoot",
            NavNodeKind::ROOT_MODEL => "rootModel",
            NavNodeKind::ROOT_INSTANCE => "rootInstance",
            NavNodeKind::STATIC_CHILD_INSTANCE => "staticChildInstance",
            NavNodeKind::DYNAMIC_SUM_INSTANCE => "dynamicSumInstance",
            NavNodeKind::DYNAMIC_SLIDER_INSTANCE => "dynamicSliderInstance",
            NavNodeKind::GROUP_NODE => "groupNode",
        }
    }

    /// True for kinds that always carry a model ID.
    pub fn is_model_kind(&self) -> bool {
        matches!(
            self,
            NavNodeKind::ROOT_MODEL
                | NavNodeKind::ROOT_INSTANCE
                | NavNodeKind::STATIC_CHILD_INSTANCE
                | NavNodeKind::DYNAMIC_SUM_INSTANCE
        )
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(
            self,
            NavNodeKind::DYNAMIC_SUM_INSTANCE | NavNodeKind::DYNAMIC_SLIDER_INSTANCE
        )
    }
}

impl fmt::Display for NavNodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// Error type for enum conversion failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnumConversionError {
    #[error("Invalid NavNodeKind value: {0}")]
    InvalidNavNodeKind(String),
    #[error("Invalid OverlayMode value: {0}")]
    InvalidOverlayMode(String),
    #[error("Invalid GroupVisibility value: {0}")]
    InvalidGroupVisibility(String),
}

impl TryFrom<&str> for NavNodeKind {
    type Error = EnumConversionError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "hiddenRoot" => Ok(NavNodeKind::HIDDEN_ROOT),
            "rootModel" => Ok(NavNodeKind::ROOT_MODEL),
            "rootInstance" => Ok(NavNodeKind::ROOT_INSTANCE),
            "staticChildInstance" => Ok(NavNodeKind::STATIC_CHILD_INSTANCE),
            "dynamicSumInstance" => Ok(NavNodeKind::DYNAMIC_SUM_INSTANCE),
            "dynamicSliderInstance" => Ok(NavNodeKind::DYNAMIC_SLIDER_INSTANCE),
            "groupNode" => Ok(NavNodeKind::GROUP_NODE),
            _ => Err(EnumConversionError::InvalidNavNodeKind(value.to_string())),
        }
    }
}

/// How an overlay is drawn over the network.
///
/// Only opaque overlays hide module contents, so only they have a notion of
/// "revealed" modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OverlayMode {
    #[default]
    Transparent,
    Underlay,
    Opaque,
}

impl OverlayMode {
    pub fn as_tag(&self) -> &'static str {
        match self {
            OverlayMode::Transparent => "transparent",
            OverlayMode::Underlay => "underlay",
            OverlayMode::Opaque => "opaque",
        }
    }
}

impl TryFrom<&str> for OverlayMode {
    type Error = EnumConversionError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "transparent" => Ok(OverlayMode::Transparent),
            "underlay" => Ok(OverlayMode::Underlay),
            "opaque" => Ok(OverlayMode::Opaque),
            _ => Err(EnumConversionError::InvalidOverlayMode(value.to_string())),
        }
    }
}

/// Something that can host network overlays: a genome instance or a dynamic proxy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OwnerKey {
    Genome(String),
    Proxy(String),
}

impl OwnerKey {
    /// Owner of the overlays shown for `model_id`. Per-time and sum models of a
    /// dynamic proxy all share the proxy's overlays.
    pub fn for_model(model_id: &str) -> Self {
        match dynamic_id::extract_proxy_id(model_id) {
            Some(proxy_id) => OwnerKey::Proxy(proxy_id.to_string()),
            None => OwnerKey::Genome(model_id.to_string()),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            OwnerKey::Genome(id) | OwnerKey::Proxy(id) => id,
        }
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerKey::Genome(id) => write!(f, "genome:{id}"),
            OwnerKey::Proxy(id) => write!(f, "proxy:{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_round_trip() {
        for kind in [
            NavNodeKind::HIDDEN_ROOT,
            NavNodeKind::ROOT_MODEL,
            NavNodeKind::ROOT_INSTANCE,
            NavNodeKind::STATIC_CHILD_INSTANCE,
            NavNodeKind::DYNAMIC_SUM_INSTANCE,
            NavNodeKind::DYNAMIC_SLIDER_INSTANCE,
            NavNodeKind::GROUP_NODE,
        ] {
            assert_eq!(NavNodeKind::try_from(kind.as_tag()), Ok(kind));
        }
        assert!(NavNodeKind::try_from("bogus").is_err());
    }

    #[test]
    fn test_owner_for_dynamic_model() {
        let sum = dynamic_id::sum_model_id("prox1");
        assert_eq!(OwnerKey::for_model(&sum), OwnerKey::Proxy("prox1".to_string()));
        let hour = dynamic_id::time_model_id("prox1", 12);
        assert_eq!(OwnerKey::for_model(&hour), OwnerKey::Proxy("prox1".to_string()));
        assert_eq!(
            OwnerKey::for_model("bioTapA"),
            OwnerKey::Genome("bioTapA".to_string())
        );
    }
}

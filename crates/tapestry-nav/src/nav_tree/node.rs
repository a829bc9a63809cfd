use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tapestry_core::{NavNodeId, NavNodeKind};

/// Legend color on a group node image, one 0-255 value per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColorKey {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl ColorKey {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for ColorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Where clicking one legend color on a group node image takes the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupNodeMapEntry {
    pub tab_id: Option<String>,
    pub model_id: Option<String>,
    pub proxy_id: Option<String>,
    pub proxy_time: Option<u32>,
    pub region_id: Option<String>,
}

impl GroupNodeMapEntry {
    pub fn for_model(model_id: impl Into<String>) -> Self {
        Self {
            model_id: Some(model_id.into()),
            ..Self::default()
        }
    }

    pub fn refers_to_model(&self, model_id: &str) -> bool {
        self.model_id.as_deref() == Some(model_id)
    }

    pub fn refers_to_proxy(&self, proxy_id: &str) -> bool {
        self.proxy_id.as_deref() == Some(proxy_id)
    }
}

/// Image and color legend owned by a group node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupNodeEntry {
    pub image_id: Option<String>,
    pub map_image_id: Option<String>,
    pub model_map: BTreeMap<ColorKey, GroupNodeMapEntry>,
}

impl GroupNodeEntry {
    pub fn is_empty(&self) -> bool {
        self.image_id.is_none() && self.map_image_id.is_none() && self.model_map.is_empty()
    }

    pub fn image_keys(&self) -> impl Iterator<Item = &String> {
        self.image_id.iter().chain(self.map_image_id.iter())
    }
}

/// The payload of one tree node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavNodeContents {
    pub kind: NavNodeKind,
    pub name: Option<String>,
    pub model_id: Option<String>,
    pub proxy_id: Option<String>,
    pub group_entry: Option<GroupNodeEntry>,
}

impl NavNodeContents {
    pub fn hidden_root() -> Self {
        Self {
            kind: NavNodeKind::HIDDEN_ROOT,
            name: None,
            model_id: None,
            proxy_id: None,
            group_entry: None,
        }
    }

    pub fn model(kind: NavNodeKind, model_id: impl Into<String>) -> Self {
        Self {
            kind,
            name: None,
            model_id: Some(model_id.into()),
            proxy_id: None,
            group_entry: None,
        }
    }

    pub fn slider(proxy_id: impl Into<String>) -> Self {
        Self {
            kind: NavNodeKind::DYNAMIC_SLIDER_INSTANCE,
            name: None,
            model_id: None,
            proxy_id: Some(proxy_id.into()),
            group_entry: None,
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self {
            kind: NavNodeKind::GROUP_NODE,
            name: Some(name.into()),
            model_id: None,
            proxy_id: None,
            group_entry: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn image_keys(&self) -> Vec<String> {
        self.group_entry
            .as_ref()
            .map(|entry| entry.image_keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// One node of the navigation tree, held by the node map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavNode {
    pub id: NavNodeId,
    pub parent: Option<NavNodeId>,
    pub children: Vec<NavNodeId>,
    pub contents: NavNodeContents,
}

impl NavNode {
    pub fn kind(&self) -> NavNodeKind {
        self.contents.kind
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Flat form of a node used to load and save the tree.
///
/// Records are listed parent-first; a node's children appear in the order
/// their records do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavNodeRecord {
    pub node_id: NavNodeId,
    pub parent_id: Option<NavNodeId>,
    pub contents: NavNodeContents,
}

use super::{NavNodeContents, NavTree};
use serde::{Deserialize, Serialize};
use tapestry_core::{ModelSource, NavNodeId, NavNodeKind, OverlayInfo, OverlayMode, OwnerKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XPlatModuleDef {
    pub key: String,
    pub name: String,
    pub first_view_shown: bool,
    pub first_view_revealed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XPlatOverlayDef {
    pub key: String,
    pub name: String,
    pub mode: OverlayMode,
    pub first_view: bool,
    pub modules: Vec<XPlatModuleDef>,
}

impl From<&OverlayInfo> for XPlatOverlayDef {
    fn from(info: &OverlayInfo) -> Self {
        Self {
            key: info.key.clone(),
            name: info.name.clone(),
            mode: info.mode,
            first_view: info.first_view,
            modules: info
                .modules
                .iter()
                .map(|m| XPlatModuleDef {
                    key: m.key.clone(),
                    name: m.name.clone(),
                    first_view_shown: m.first_view_shown,
                    first_view_revealed: m.first_view_revealed,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XPlatGroupMapEntry {
    /// `#rrggbb`
    pub color: String,
    pub tab_id: Option<String>,
    pub model_id: Option<String>,
    pub proxy_id: Option<String>,
    pub proxy_time: Option<u32>,
    pub region_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XPlatModelNode {
    pub node_id: NavNodeId,
    pub kind: String,
    pub name: String,
    /// Model ID, or the proxy ID for dynamic nodes. Absent for group nodes.
    pub id: Option<String>,
    pub image_id: Option<String>,
    pub map_image_id: Option<String>,
    pub group_map: Vec<XPlatGroupMapEntry>,
    pub overlays: Vec<XPlatOverlayDef>,
    /// This node or any descendant has an image.
    pub has_images: bool,
    /// This node or any descendant hosts overlays.
    pub has_overlays: bool,
    pub children: Vec<XPlatModelNode>,
}

impl XPlatModelNode {
    pub fn find(&self, node_id: &NavNodeId) -> Option<&XPlatModelNode> {
        if &self.node_id == node_id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(node_id))
    }

    pub fn count(&self) -> usize {
        1 + self.children.iter().map(XPlatModelNode::count).sum::<usize>()
    }
}

/// Transport-neutral copy of the navigation tree, rooted at the root model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XPlatModelTree {
    pub root: Option<XPlatModelNode>,
}

impl XPlatModelTree {
    pub fn find(&self, node_id: &NavNodeId) -> Option<&XPlatModelNode> {
        self.root.as_ref().and_then(|r| r.find(node_id))
    }

    pub fn node_count(&self) -> usize {
        self.root.as_ref().map_or(0, XPlatModelNode::count)
    }
}

impl NavTree {
    pub fn xplat_tree(&self, source: &dyn ModelSource) -> XPlatModelTree {
        XPlatModelTree {
            root: self.root_model().map(|id| self.xplat_node(id, source)),
        }
    }

    fn xplat_node(&self, id: &NavNodeId, source: &dyn ModelSource) -> XPlatModelNode {
        let children: Vec<XPlatModelNode> = self
            .children(id)
            .iter()
            .map(|child| self.xplat_node(child, source))
            .collect();

        let empty = NavNodeContents::hidden_root();
        let contents = self.contents(id).unwrap_or(&empty);
        let key = Self::xplat_key_of(contents);
        let owner = match contents.kind {
            NavNodeKind::GROUP_NODE | NavNodeKind::HIDDEN_ROOT => None,
            NavNodeKind::DYNAMIC_SLIDER_INSTANCE | NavNodeKind::DYNAMIC_SUM_INSTANCE => {
                key.clone().map(OwnerKey::Proxy)
            }
            _ => key.clone().map(OwnerKey::Genome),
        };
        let overlays: Vec<XPlatOverlayDef> = owner
            .as_ref()
            .map(|o| source.overlays(o).iter().map(XPlatOverlayDef::from).collect())
            .unwrap_or_default();

        let name = contents
            .name
            .clone()
            .or_else(|| contents.model_id.as_deref().and_then(|m| source.model_name(m)))
            .or_else(|| {
                contents
                    .proxy_id
                    .as_deref()
                    .and_then(|p| source.dynamic_proxy(p))
                    .map(|p| p.name)
            })
            .unwrap_or_default();

        let entry = contents.group_entry.as_ref();
        let group_map = entry
            .map(|e| {
                e.model_map
                    .iter()
                    .map(|(color, target)| XPlatGroupMapEntry {
                        color: color.to_string(),
                        tab_id: target.tab_id.clone(),
                        model_id: target.model_id.clone(),
                        proxy_id: target.proxy_id.clone(),
                        proxy_time: target.proxy_time,
                        region_id: target.region_id.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let own_image = !contents.image_keys().is_empty()
            || contents
                .model_id
                .as_deref()
                .and_then(|m| source.model_image(m))
                .is_some()
            || contents
                .proxy_id
                .as_deref()
                .and_then(|p| source.dynamic_proxy(p))
                .and_then(|p| p.image_key)
                .is_some();

        XPlatModelNode {
            node_id: id.clone(),
            kind: contents.kind.as_tag().to_string(),
            name,
            id: key,
            image_id: entry.and_then(|e| e.image_id.clone()),
            map_image_id: entry.and_then(|e| e.map_image_id.clone()),
            group_map,
            has_images: own_image || children.iter().any(|c| c.has_images),
            has_overlays: !overlays.is_empty() || children.iter().any(|c| c.has_overlays),
            overlays,
            children,
        }
    }
}

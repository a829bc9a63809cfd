//! The model hierarchy shown in the navigation tree.
//!
//! The tree state (node map, model map, labeller) sits behind an `Arc`.
//! A structural edit keeps the previous `Arc` as its undo snapshot, so taking
//! a snapshot costs nothing and the node records themselves (also `Arc`s) are
//! shared between snapshots until one of them is edited.

mod change;
mod node;
mod xplat;


pub use change::NavTreeChange;
pub use node::{
    ColorKey, GroupNodeEntry, GroupNodeMapEntry, NavNode, NavNodeContents, NavNodeRecord,
};
pub use xplat::{XPlatGroupMapEntry, XPlatModelNode, XPlatModelTree, XPlatModuleDef, XPlatOverlayDef};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tapestry_core::{LabelError, ModelSource, NavNodeId, NavNodeKind, UniqueLabeller, dynamic_id};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavTreeError {
    #[error("Invalid arguments for {kind} node: {reason}")]
    InvalidArguments {
        kind: NavNodeKind,
        reason: &'static str,
    },
    #[error("Unknown tree node: {0}")]
    UnknownNode(NavNodeId),
    #[error("Model {0} is already in the tree")]
    DuplicateModel(String),
    #[error("A {kind} node cannot be placed under a {parent} node")]
    InvalidParent {
        kind: NavNodeKind,
        parent: NavNodeKind,
    },
    #[error("Index {index} out of range for {len} children")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Malformed ancestry above node {0}")]
    MalformedAncestry(NavNodeId),
    #[error("Operation not allowed on {kind} node {node}")]
    WrongKind { node: NavNodeId, kind: NavNodeKind },
    #[error("Node {0} has children")]
    HasChildren(NavNodeId),
    #[error("The hidden root cannot be edited")]
    HiddenRoot,
    #[error("Malformed tree records: {0}")]
    BadRecords(String),
    #[error(transparent)]
    Label(#[from] LabelError),
}

/// Everything a structural undo has to put back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeState {
    root: NavNodeId,
    nodes: HashMap<NavNodeId, Arc<NavNode>>,
    model_map: HashMap<String, NavNodeId>,
    labeller: UniqueLabeller,
}

impl TreeState {
    fn fresh() -> Self {
        let mut labeller = UniqueLabeller::new();
        let root = NavNodeId(labeller.next_label());
        let mut nodes = HashMap::new();
        nodes.insert(
            root.clone(),
            Arc::new(NavNode {
                id: root.clone(),
                parent: None,
                children: Vec::new(),
                contents: NavNodeContents::hidden_root(),
            }),
        );
        Self {
            root,
            nodes,
            model_map: HashMap::new(),
            labeller,
        }
    }

    pub fn labeller(&self) -> &UniqueLabeller {
        &self.labeller
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node_mut(&mut self, id: &NavNodeId) -> Result<&mut NavNode, NavTreeError> {
        self.nodes
            .get_mut(id)
            .map(Arc::make_mut)
            .ok_or_else(|| NavTreeError::UnknownNode(id.clone()))
    }

    fn attach(
        &mut self,
        node_id: NavNodeId,
        parent_id: NavNodeId,
        index: Option<usize>,
        contents: NavNodeContents,
    ) -> Result<(), NavTreeError> {
        let parent = self.node_mut(&parent_id)?;
        match index {
            Some(i) if i <= parent.children.len() => parent.children.insert(i, node_id.clone()),
            Some(i) => {
                return Err(NavTreeError::IndexOutOfRange {
                    index: i,
                    len: parent.children.len(),
                });
            }
            None => parent.children.push(node_id.clone()),
        }
        if let Some(model_id) = &contents.model_id {
            self.model_map.insert(model_id.clone(), node_id.clone());
        }
        self.nodes.insert(
            node_id.clone(),
            Arc::new(NavNode {
                id: node_id,
                parent: Some(parent_id),
                children: Vec::new(),
                contents,
            }),
        );
        Ok(())
    }
}

/// Arguments for [`NavTree::add_node`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNode {
    pub kind: NavNodeKind,
    pub name: Option<String>,
    pub model_id: Option<String>,
    pub proxy_id: Option<String>,
    /// `None` only for the root model, which hangs off the hidden root.
    pub parent: Option<NavNodeId>,
    /// Position among the parent's children; `None` appends.
    pub index: Option<usize>,
    pub group_entry: Option<GroupNodeEntry>,
}

impl NewNode {
    pub fn root_model(model_id: impl Into<String>) -> Self {
        Self {
            kind: NavNodeKind::ROOT_MODEL,
            name: None,
            model_id: Some(model_id.into()),
            proxy_id: None,
            parent: None,
            index: None,
            group_entry: None,
        }
    }

    pub fn instance(kind: NavNodeKind, model_id: impl Into<String>, parent: &NavNodeId) -> Self {
        Self {
            kind,
            name: None,
            model_id: Some(model_id.into()),
            proxy_id: None,
            parent: Some(parent.clone()),
            index: None,
            group_entry: None,
        }
    }

    pub fn slider(proxy_id: impl Into<String>, parent: &NavNodeId) -> Self {
        Self {
            kind: NavNodeKind::DYNAMIC_SLIDER_INSTANCE,
            name: None,
            model_id: None,
            proxy_id: Some(proxy_id.into()),
            parent: Some(parent.clone()),
            index: None,
            group_entry: None,
        }
    }

    pub fn group(name: impl Into<String>, parent: &NavNodeId) -> Self {
        Self {
            kind: NavNodeKind::GROUP_NODE,
            name: Some(name.into()),
            model_id: None,
            proxy_id: None,
            parent: Some(parent.clone()),
            index: None,
            group_entry: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    fn contents(&self) -> NavNodeContents {
        NavNodeContents {
            kind: self.kind,
            name: self.name.clone(),
            model_id: self.model_id.clone(),
            proxy_id: self.proxy_id.clone(),
            group_entry: self.group_entry.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NavTree {
    state: Arc<TreeState>,
}

impl Default for NavTree {
    fn default() -> Self {
        Self::new()
    }
}

impl NavTree {
    pub fn new() -> Self {
        Self {
            state: Arc::new(TreeState::fresh()),
        }
    }

    /// Rebuild a tree from saved records. The first record must be the hidden root.
    pub fn from_records(records: Vec<NavNodeRecord>) -> Result<Self, NavTreeError> {
        let mut iter = records.into_iter();
        let first = iter
            .next()
            .ok_or_else(|| NavTreeError::BadRecords("no hidden root".to_string()))?;
        if first.contents.kind != NavNodeKind::HIDDEN_ROOT || first.parent_id.is_some() {
            return Err(NavTreeError::BadRecords(
                "first node must be a parentless hidden root".to_string(),
            ));
        }

        let mut labeller = UniqueLabeller::new();
        labeller.add_existing_label(first.node_id.as_str())?;
        let mut nodes = HashMap::new();
        nodes.insert(
            first.node_id.clone(),
            Arc::new(NavNode {
                id: first.node_id.clone(),
                parent: None,
                children: Vec::new(),
                contents: first.contents,
            }),
        );
        let mut tree = Self {
            state: Arc::new(TreeState {
                root: first.node_id,
                nodes,
                model_map: HashMap::new(),
                labeller,
            }),
        };

        for record in iter {
            let parent_id = record.parent_id.ok_or_else(|| {
                NavTreeError::BadRecords(format!("node {} has no parent", record.node_id))
            })?;
            if record.contents.kind == NavNodeKind::HIDDEN_ROOT {
                return Err(NavTreeError::BadRecords(
                    "more than one hidden root".to_string(),
                ));
            }
            let request = NewNode {
                kind: record.contents.kind,
                name: record.contents.name.clone(),
                model_id: record.contents.model_id.clone(),
                proxy_id: record.contents.proxy_id.clone(),
                parent: (parent_id != tree.state.root).then(|| parent_id.clone()),
                index: None,
                group_entry: record.contents.group_entry.clone(),
            };
            if request.parent.is_none() && request.kind != NavNodeKind::ROOT_MODEL {
                return Err(NavTreeError::InvalidParent {
                    kind: request.kind,
                    parent: NavNodeKind::HIDDEN_ROOT,
                });
            }
            tree.validate_new_node(&request)?;
            let state = tree.state_mut();
            state.labeller.add_existing_label(record.node_id.as_str())?;
            state.attach(record.node_id, parent_id, None, record.contents)?;
        }
        Ok(tree)
    }

    /// Parent-first records for every node, hidden root included.
    pub fn records(&self) -> Vec<NavNodeRecord> {
        self.subtree_preorder(&self.state.root)
            .into_iter()
            .filter_map(|id| self.node(&id))
            .map(|node| NavNodeRecord {
                node_id: node.id.clone(),
                parent_id: node.parent.clone(),
                contents: node.contents.clone(),
            })
            .collect()
    }

    pub fn state(&self) -> Arc<TreeState> {
        Arc::clone(&self.state)
    }

    /// Swap in a previously captured state wholesale.
    pub fn install_state(&mut self, state: Arc<TreeState>) -> NavTreeChange {
        let before = std::mem::replace(&mut self.state, state);
        self.structural_change(before)
    }

    fn state_mut(&mut self) -> &mut TreeState {
        Arc::make_mut(&mut self.state)
    }

    fn structural_change(&self, before: Arc<TreeState>) -> NavTreeChange {
        NavTreeChange::Structural {
            before,
            after: Arc::clone(&self.state),
        }
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub fn root_id(&self) -> &NavNodeId {
        &self.state.root
    }

    pub fn root_model(&self) -> Option<&NavNodeId> {
        self.node(&self.state.root)
            .and_then(|root| root.children.first())
    }

    pub fn node(&self, id: &NavNodeId) -> Option<&NavNode> {
        self.state.nodes.get(id).map(|n| n.as_ref())
    }

    pub fn contents(&self, id: &NavNodeId) -> Option<&NavNodeContents> {
        self.node(id).map(|n| &n.contents)
    }

    pub fn kind(&self, id: &NavNodeId) -> Option<NavNodeKind> {
        self.node(id).map(NavNode::kind)
    }

    pub fn parent(&self, id: &NavNodeId) -> Option<&NavNodeId> {
        self.node(id).and_then(|n| n.parent.as_ref())
    }

    pub fn children(&self, id: &NavNodeId) -> &[NavNodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn node_for_model(&self, model_id: &str) -> Option<&NavNodeId> {
        self.state.model_map.get(model_id)
    }

    /// The slider or sum node standing in for a dynamic proxy.
    pub fn node_for_proxy(&self, proxy_id: &str) -> Option<NavNodeId> {
        self.preorder().into_iter().find(|id| {
            self.contents(id)
                .is_some_and(|c| Self::xplat_key_of(c).as_deref() == Some(proxy_id) && c.kind.is_dynamic())
        })
    }

    pub fn len(&self) -> usize {
        self.state.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every node except the hidden root, parents before children.
    pub fn preorder(&self) -> Vec<NavNodeId> {
        let mut order = self.subtree_preorder(&self.state.root);
        order.remove(0);
        order
    }

    fn subtree_preorder(&self, id: &NavNodeId) -> Vec<NavNodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.node(&current) {
                stack.extend(node.children.iter().rev().cloned());
            }
            out.push(current);
        }
        out
    }

    /// Node IDs from `id` up to, but not including, the hidden root.
    pub fn path_to_root(&self, id: &NavNodeId) -> Vec<NavNodeId> {
        let mut path = Vec::new();
        let mut cursor = self.node(id).map(|n| n.id.clone());
        while let Some(current) = cursor {
            if current == self.state.root {
                break;
            }
            cursor = self.parent(&current).cloned();
            path.push(current);
        }
        path
    }

    pub fn depth(&self, id: &NavNodeId) -> usize {
        self.path_to_root(id).len()
    }

    pub fn model_ids(&self) -> Vec<String> {
        self.preorder()
            .iter()
            .filter_map(|id| self.contents(id).and_then(|c| c.model_id.clone()))
            .collect()
    }

    pub fn proxy_ids(&self) -> Vec<String> {
        self.preorder()
            .iter()
            .filter_map(|id| self.contents(id).and_then(|c| c.proxy_id.clone()))
            .collect()
    }

    /// Image keys held by group nodes, one entry per use.
    pub fn image_keys(&self) -> Vec<String> {
        self.preorder()
            .iter()
            .filter_map(|id| self.contents(id))
            .flat_map(|c| c.image_keys())
            .collect()
    }

    /// Identity of a node as seen by non-tree clients. Dynamic nodes are
    /// addressed by proxy, group nodes have no model identity.
    fn xplat_key_of(contents: &NavNodeContents) -> Option<String> {
        match contents.kind {
            NavNodeKind::DYNAMIC_SUM_INSTANCE => contents
                .model_id
                .as_deref()
                .and_then(dynamic_id::extract_proxy_id)
                .map(str::to_string),
            NavNodeKind::DYNAMIC_SLIDER_INSTANCE => contents.proxy_id.clone(),
            NavNodeKind::GROUP_NODE | NavNodeKind::HIDDEN_ROOT => None,
            _ => contents.model_id.clone(),
        }
    }

    pub fn xplat_key(&self, id: &NavNodeId) -> Option<String> {
        self.contents(id).and_then(Self::xplat_key_of)
    }

    // ------------------------------------------------------------------
    // Ancestry
    // ------------------------------------------------------------------

    fn classify_ancestor(&self, id: &NavNodeId) -> Result<NavNodeKind, NavTreeError> {
        let node = self
            .node(id)
            .ok_or_else(|| NavTreeError::UnknownNode(id.clone()))?;
        let mut cursor = node.parent.clone();
        while let Some(parent_id) = cursor {
            let parent = self
                .node(&parent_id)
                .ok_or_else(|| NavTreeError::UnknownNode(parent_id.clone()))?;
            match parent.kind() {
                NavNodeKind::GROUP_NODE => cursor = parent.parent.clone(),
                NavNodeKind::HIDDEN_ROOT | NavNodeKind::DYNAMIC_SLIDER_INSTANCE => {
                    return Err(NavTreeError::MalformedAncestry(id.clone()));
                }
                kind => return Ok(kind),
            }
        }
        Err(NavTreeError::MalformedAncestry(id.clone()))
    }

    pub fn ancestor_is_dynamic_sum(&self, id: &NavNodeId) -> Result<bool, NavTreeError> {
        Ok(self.classify_ancestor(id)? == NavNodeKind::DYNAMIC_SUM_INSTANCE)
    }

    pub fn ancestor_is_static(&self, id: &NavNodeId) -> Result<bool, NavTreeError> {
        Ok(matches!(
            self.classify_ancestor(id)?,
            NavNodeKind::ROOT_INSTANCE | NavNodeKind::STATIC_CHILD_INSTANCE
        ))
    }

    pub fn ancestor_is_root(&self, id: &NavNodeId) -> Result<bool, NavTreeError> {
        Ok(self.classify_ancestor(id)? == NavNodeKind::ROOT_MODEL)
    }

    /// Kind of `id` itself, or of its nearest non-group ancestor if it is a group node.
    fn anchor_kind(&self, id: &NavNodeId) -> Result<NavNodeKind, NavTreeError> {
        let mut cursor = Some(id.clone());
        while let Some(current) = cursor {
            let node = self
                .node(&current)
                .ok_or_else(|| NavTreeError::UnknownNode(current.clone()))?;
            if node.kind() != NavNodeKind::GROUP_NODE {
                return Ok(node.kind());
            }
            cursor = node.parent.clone();
        }
        Err(NavTreeError::MalformedAncestry(id.clone()))
    }

    fn parent_allows(kind: NavNodeKind, anchor: NavNodeKind) -> bool {
        use NavNodeKind::*;
        match kind {
            ROOT_INSTANCE => anchor == ROOT_MODEL,
            STATIC_CHILD_INSTANCE => matches!(anchor, ROOT_INSTANCE | STATIC_CHILD_INSTANCE),
            DYNAMIC_SUM_INSTANCE | DYNAMIC_SLIDER_INSTANCE => matches!(
                anchor,
                ROOT_INSTANCE | STATIC_CHILD_INSTANCE | DYNAMIC_SUM_INSTANCE
            ),
            GROUP_NODE => !matches!(anchor, HIDDEN_ROOT | DYNAMIC_SLIDER_INSTANCE),
            HIDDEN_ROOT | ROOT_MODEL => false,
        }
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Node to select at startup: the first node whose model ID or node ID
    /// equals `key`, or a slider whose proxy covers `key`. Falls back to
    /// [`NavTree::default_selection`].
    pub fn startup_selection(&self, key: Option<&str>, source: &dyn ModelSource) -> Option<NavNodeId> {
        if let Some(key) = key {
            for id in self.preorder() {
                let Some(contents) = self.contents(&id) else {
                    continue;
                };
                if contents.model_id.as_deref() == Some(key) || id.as_str() == key {
                    return Some(id);
                }
                if contents.kind == NavNodeKind::DYNAMIC_SLIDER_INSTANCE
                    && let Some(proxy_id) = &contents.proxy_id
                    && let Some(proxy) = source.dynamic_proxy(proxy_id)
                    && proxy.proxied_keys().iter().any(|k| k == key)
                {
                    return Some(id);
                }
            }
        }
        self.default_selection()
    }

    /// Last child of the root model's first child, that child itself when it
    /// is a leaf, or the root model when it has no children.
    pub fn default_selection(&self) -> Option<NavNodeId> {
        let root_model = self.root_model()?;
        let Some(first) = self.children(root_model).first() else {
            return Some(root_model.clone());
        };
        self.children(first)
            .last()
            .cloned()
            .or_else(|| Some(first.clone()))
    }

    // ------------------------------------------------------------------
    // Structural edits
    // ------------------------------------------------------------------

    fn validate_new_node(&self, request: &NewNode) -> Result<(), NavTreeError> {
        let kind = request.kind;
        let bad = |reason| Err(NavTreeError::InvalidArguments { kind, reason });
        match kind {
            NavNodeKind::HIDDEN_ROOT => return bad("the hidden root is created with the tree"),
            NavNodeKind::GROUP_NODE => {
                if request.model_id.is_some() || request.proxy_id.is_some() {
                    return bad("group nodes carry no model or proxy");
                }
                if request.name.is_none() {
                    return bad("group nodes need a name");
                }
            }
            NavNodeKind::DYNAMIC_SLIDER_INSTANCE => {
                if request.model_id.is_some() {
                    return bad("slider nodes carry no model");
                }
                if request.proxy_id.is_none() {
                    return bad("slider nodes need a proxy");
                }
            }
            NavNodeKind::ROOT_MODEL => {
                if request.name.is_some() || request.proxy_id.is_some() {
                    return bad("the root model takes no name or proxy");
                }
                if request.model_id.is_none() {
                    return bad("the root model needs a model");
                }
                if request.parent.is_some() {
                    return bad("the root model hangs off the hidden root");
                }
                if request.index.is_some_and(|i| i != 0) {
                    return bad("the root model must be at index 0");
                }
                if self.root_model().is_some() {
                    return bad("the tree already has a root model");
                }
            }
            _ => {
                let Some(model_id) = &request.model_id else {
                    return bad("model nodes need a model");
                };
                if request.proxy_id.is_some() {
                    return bad("model nodes carry no proxy");
                }
                if kind == NavNodeKind::DYNAMIC_SUM_INSTANCE && !dynamic_id::is_sum_model_id(model_id) {
                    return bad("dynamic sum nodes need a proxy sum model");
                }
            }
        }
        if request.group_entry.is_some() && kind != NavNodeKind::GROUP_NODE {
            return bad("only group nodes own a group entry");
        }

        if let Some(model_id) = &request.model_id
            && self.state.model_map.contains_key(model_id)
        {
            return Err(NavTreeError::DuplicateModel(model_id.clone()));
        }

        if kind == NavNodeKind::ROOT_MODEL {
            return Ok(());
        }
        let Some(parent_id) = &request.parent else {
            return bad("a parent node is required");
        };
        let parent = self
            .node(parent_id)
            .ok_or_else(|| NavTreeError::UnknownNode(parent_id.clone()))?;
        let anchor = self.anchor_kind(parent_id)?;
        if !Self::parent_allows(kind, anchor) {
            return Err(NavTreeError::InvalidParent {
                kind,
                parent: anchor,
            });
        }
        if let Some(index) = request.index
            && index > parent.children.len()
        {
            return Err(NavTreeError::IndexOutOfRange {
                index,
                len: parent.children.len(),
            });
        }
        Ok(())
    }

    pub fn add_node(&mut self, request: NewNode) -> Result<(NavNodeId, NavTreeChange), NavTreeError> {
        self.validate_new_node(&request)?;
        let before = Arc::clone(&self.state);
        let parent_id = request
            .parent
            .clone()
            .unwrap_or_else(|| self.state.root.clone());
        let contents = request.contents();
        let state = self.state_mut();
        let node_id = NavNodeId(state.labeller.next_label());
        state.attach(node_id.clone(), parent_id, request.index, contents)?;
        tracing::debug!("NavTree: added {:?} node {}", request.kind, node_id);
        Ok((node_id, self.structural_change(before)))
    }

    /// Duplicate a group node (not its children) right after the original.
    pub fn copy_group_node(
        &mut self,
        id: &NavNodeId,
        name: Option<String>,
    ) -> Result<(NavNodeId, NavTreeChange), NavTreeError> {
        let node = self
            .node(id)
            .ok_or_else(|| NavTreeError::UnknownNode(id.clone()))?;
        if node.kind() != NavNodeKind::GROUP_NODE {
            return Err(NavTreeError::WrongKind {
                node: id.clone(),
                kind: node.kind(),
            });
        }
        let parent_id = node
            .parent
            .clone()
            .ok_or_else(|| NavTreeError::MalformedAncestry(id.clone()))?;
        let index = self
            .children(&parent_id)
            .iter()
            .position(|c| c == id)
            .map(|i| i + 1);
        let mut contents = node.contents.clone();
        if let Some(name) = name {
            contents.name = Some(name);
        }

        let before = Arc::clone(&self.state);
        let state = self.state_mut();
        let node_id = NavNodeId(state.labeller.next_label());
        state.attach(node_id.clone(), parent_id, index, contents)?;
        Ok((node_id, self.structural_change(before)))
    }

    /// Remove a node and its subtree. Returns the removed contents, parents first.
    pub fn delete_node_and_children(
        &mut self,
        id: &NavNodeId,
    ) -> Result<(Vec<NavNodeContents>, NavTreeChange), NavTreeError> {
        let node = self
            .node(id)
            .ok_or_else(|| NavTreeError::UnknownNode(id.clone()))?;
        if node.kind() == NavNodeKind::HIDDEN_ROOT {
            return Err(NavTreeError::HiddenRoot);
        }
        let parent_id = node.parent.clone();
        let doomed = self.subtree_preorder(id);
        let removed: Vec<NavNodeContents> = doomed
            .iter()
            .filter_map(|nid| self.contents(nid).cloned())
            .collect();

        let before = Arc::clone(&self.state);
        let state = self.state_mut();
        if let Some(parent_id) = parent_id {
            state.node_mut(&parent_id)?.children.retain(|c| c != id);
        }
        for nid in &doomed {
            if let Some(gone) = state.nodes.remove(nid) {
                if let Some(model_id) = &gone.contents.model_id {
                    state.model_map.remove(model_id);
                }
                state.labeller.remove_label(nid.as_str());
            }
        }
        tracing::info!("NavTree: deleted node {} and {} descendants", id, doomed.len() - 1);
        Ok((removed, self.structural_change(before)))
    }

    /// Delete the node showing `model_id`, if the model is in the tree.
    pub fn delete_node_for_model(
        &mut self,
        model_id: &str,
    ) -> Result<Option<(Vec<NavNodeContents>, NavTreeChange)>, NavTreeError> {
        match self.node_for_model(model_id).cloned() {
            Some(id) => self.delete_node_and_children(&id).map(Some),
            None => Ok(None),
        }
    }

    /// Move a node one slot up or down among its siblings. `None` when it is
    /// already at that end.
    pub fn shift_node(&mut self, id: &NavNodeId, up: bool) -> Result<Option<NavTreeChange>, NavTreeError> {
        let parent_id = self
            .parent(id)
            .cloned()
            .ok_or_else(|| NavTreeError::UnknownNode(id.clone()))?;
        let siblings = self.children(&parent_id);
        let Some(pos) = siblings.iter().position(|c| c == id) else {
            return Err(NavTreeError::MalformedAncestry(id.clone()));
        };
        let target = if up {
            match pos.checked_sub(1) {
                Some(t) => t,
                None => return Ok(None),
            }
        } else if pos + 1 < siblings.len() {
            pos + 1
        } else {
            return Ok(None);
        };

        let before = Arc::clone(&self.state);
        self.state_mut().node_mut(&parent_id)?.children.swap(pos, target);
        Ok(Some(self.structural_change(before)))
    }

    /// Empty the tree down to the hidden root.
    pub fn clear(&mut self) -> NavTreeChange {
        let before = Arc::clone(&self.state);
        self.state = Arc::new(TreeState::fresh());
        self.structural_change(before)
    }

    // ------------------------------------------------------------------
    // Content edits
    // ------------------------------------------------------------------

    fn install_contents(&mut self, id: &NavNodeId, contents: &NavNodeContents) -> Result<(), NavTreeError> {
        let state = self.state_mut();
        let node = state.node_mut(id)?;
        let old_model = node.contents.model_id.take();
        node.contents = contents.clone();
        if let Some(old_model) = old_model
            && state.model_map.get(&old_model) == Some(id)
        {
            state.model_map.remove(&old_model);
        }
        if let Some(model_id) = &contents.model_id {
            state.model_map.insert(model_id.clone(), id.clone());
        }
        Ok(())
    }

    fn replace_contents(&mut self, id: &NavNodeId, after: NavNodeContents) -> Result<NavTreeChange, NavTreeError> {
        let before = self
            .contents(id)
            .cloned()
            .ok_or_else(|| NavTreeError::UnknownNode(id.clone()))?;
        self.install_contents(id, &after)?;
        Ok(NavTreeChange::Contents {
            node_id: id.clone(),
            before,
            after,
        })
    }

    fn editable_contents(&self, id: &NavNodeId) -> Result<NavNodeContents, NavTreeError> {
        let contents = self
            .contents(id)
            .ok_or_else(|| NavTreeError::UnknownNode(id.clone()))?;
        if contents.kind == NavNodeKind::HIDDEN_ROOT {
            return Err(NavTreeError::HiddenRoot);
        }
        Ok(contents.clone())
    }

    fn group_contents(&self, id: &NavNodeId) -> Result<NavNodeContents, NavTreeError> {
        let contents = self.editable_contents(id)?;
        if contents.kind != NavNodeKind::GROUP_NODE {
            return Err(NavTreeError::WrongKind {
                node: id.clone(),
                kind: contents.kind,
            });
        }
        Ok(contents)
    }

    pub fn set_node_name(&mut self, id: &NavNodeId, name: Option<String>) -> Result<NavTreeChange, NavTreeError> {
        let mut contents = self.editable_contents(id)?;
        match (contents.kind, &name) {
            (NavNodeKind::ROOT_MODEL, Some(_)) => {
                return Err(NavTreeError::InvalidArguments {
                    kind: contents.kind,
                    reason: "the root model takes no name",
                });
            }
            (NavNodeKind::GROUP_NODE, None) => {
                return Err(NavTreeError::InvalidArguments {
                    kind: contents.kind,
                    reason: "group nodes need a name",
                });
            }
            _ => {}
        }
        contents.name = name;
        self.replace_contents(id, contents)
    }

    pub fn set_group_node_images(
        &mut self,
        id: &NavNodeId,
        image_id: Option<String>,
        map_image_id: Option<String>,
    ) -> Result<NavTreeChange, NavTreeError> {
        let mut contents = self.group_contents(id)?;
        let mut entry = contents.group_entry.take().unwrap_or_default();
        entry.image_id = image_id;
        entry.map_image_id = map_image_id;
        contents.group_entry = (!entry.is_empty()).then_some(entry);
        self.replace_contents(id, contents)
    }

    pub fn set_group_model_map(
        &mut self,
        id: &NavNodeId,
        model_map: BTreeMap<ColorKey, GroupNodeMapEntry>,
    ) -> Result<NavTreeChange, NavTreeError> {
        let mut contents = self.group_contents(id)?;
        let mut entry = contents.group_entry.take().unwrap_or_default();
        entry.model_map = model_map;
        contents.group_entry = (!entry.is_empty()).then_some(entry);
        self.replace_contents(id, contents)
    }

    /// Remove group-map colors that point at a deleted model or proxy.
    /// All or nothing: a failure puts back the nodes already edited.
    pub fn drop_group_map_refs(
        &mut self,
        model_id: Option<&str>,
        proxy_id: Option<&str>,
    ) -> Result<Vec<NavTreeChange>, NavTreeError> {
        let mut changes = Vec::new();
        for id in self.preorder() {
            let Some(contents) = self.contents(&id) else {
                continue;
            };
            let Some(entry) = &contents.group_entry else {
                continue;
            };
            let stale = |e: &GroupNodeMapEntry| {
                model_id.is_some_and(|m| e.refers_to_model(m))
                    || proxy_id.is_some_and(|p| e.refers_to_proxy(p))
            };
            if !entry.model_map.values().any(stale) {
                continue;
            }
            let mut after = contents.clone();
            if let Some(entry) = after.group_entry.as_mut() {
                entry.model_map.retain(|_, e| !stale(e));
                if entry.is_empty() {
                    after.group_entry = None;
                }
            }
            match self.replace_contents(&id, after) {
                Ok(change) => changes.push(change),
                Err(e) => {
                    for change in changes.iter().rev() {
                        self.change_undo(change)?;
                    }
                    return Err(e);
                }
            }
        }
        Ok(changes)
    }

    /// Turn a static or summed node into a slider over `proxy_id`.
    pub fn change_to_proxy(&mut self, id: &NavNodeId, proxy_id: &str) -> Result<NavTreeChange, NavTreeError> {
        let node = self
            .node(id)
            .ok_or_else(|| NavTreeError::UnknownNode(id.clone()))?;
        if !matches!(
            node.kind(),
            NavNodeKind::STATIC_CHILD_INSTANCE | NavNodeKind::DYNAMIC_SUM_INSTANCE
        ) {
            return Err(NavTreeError::WrongKind {
                node: id.clone(),
                kind: node.kind(),
            });
        }
        if !node.is_leaf() {
            return Err(NavTreeError::HasChildren(id.clone()));
        }
        let mut after = NavNodeContents::slider(proxy_id);
        after.name = node.contents.name.clone();
        self.replace_contents(id, after)
    }

    /// Turn a slider node back into a model node showing `model_id`.
    pub fn change_from_proxy(&mut self, id: &NavNodeId, model_id: &str) -> Result<NavTreeChange, NavTreeError> {
        let node = self
            .node(id)
            .ok_or_else(|| NavTreeError::UnknownNode(id.clone()))?;
        if node.kind() != NavNodeKind::DYNAMIC_SLIDER_INSTANCE {
            return Err(NavTreeError::WrongKind {
                node: id.clone(),
                kind: node.kind(),
            });
        }
        if self.state.model_map.contains_key(model_id) {
            return Err(NavTreeError::DuplicateModel(model_id.to_string()));
        }
        let kind = if dynamic_id::is_sum_model_id(model_id) {
            NavNodeKind::DYNAMIC_SUM_INSTANCE
        } else {
            NavNodeKind::STATIC_CHILD_INSTANCE
        };
        let parent_id = node
            .parent
            .clone()
            .ok_or_else(|| NavTreeError::MalformedAncestry(id.clone()))?;
        let anchor = self.anchor_kind(&parent_id)?;
        if !Self::parent_allows(kind, anchor) {
            return Err(NavTreeError::InvalidParent { kind, parent: anchor });
        }
        let mut after = NavNodeContents::model(kind, model_id);
        after.name = node.contents.name.clone();
        self.replace_contents(id, after)
    }

    // ------------------------------------------------------------------
    // Undo / redo
    // ------------------------------------------------------------------

    pub fn change_undo(&mut self, change: &NavTreeChange) -> Result<(), NavTreeError> {
        match change {
            NavTreeChange::Structural { before, .. } => {
                self.state = Arc::clone(before);
                Ok(())
            }
            NavTreeChange::Contents { node_id, before, .. } => self.install_contents(node_id, before),
        }
    }

    pub fn change_redo(&mut self, change: &NavTreeChange) -> Result<(), NavTreeError> {
        match change {
            NavTreeChange::Structural { after, .. } => {
                self.state = Arc::clone(after);
                Ok(())
            }
            NavTreeChange::Contents { node_id, after, .. } => self.install_contents(node_id, after),
        }
    }

    // ------------------------------------------------------------------
    // Consistency
    // ------------------------------------------------------------------

    /// Check the node map, model map, and labeller against the tree links.
    pub fn check_consistency(&self) -> Result<(), String> {
        let state = &self.state;
        let reachable = self.subtree_preorder(&state.root);
        if reachable.len() != state.nodes.len() {
            return Err(format!(
                "{} nodes reachable but {} in node map",
                reachable.len(),
                state.nodes.len()
            ));
        }
        let mut hidden_roots = 0;
        let mut models = 0;
        for id in &reachable {
            let node = self.node(id).ok_or_else(|| format!("missing node {id}"))?;
            if !state.labeller.contains(id.as_str()) {
                return Err(format!("node {id} not labelled"));
            }
            for child in &node.children {
                if self.parent(child) != Some(id) {
                    return Err(format!("child {child} does not point back to {id}"));
                }
            }
            let c = &node.contents;
            match c.kind {
                NavNodeKind::HIDDEN_ROOT => hidden_roots += 1,
                NavNodeKind::GROUP_NODE => {
                    if c.model_id.is_some() || c.proxy_id.is_some() {
                        return Err(format!("group node {id} has a model or proxy"));
                    }
                }
                NavNodeKind::DYNAMIC_SLIDER_INSTANCE => {
                    if c.model_id.is_some() || c.proxy_id.is_none() {
                        return Err(format!("slider node {id} is malformed"));
                    }
                }
                _ => {
                    let Some(model_id) = &c.model_id else {
                        return Err(format!("model node {id} has no model"));
                    };
                    if c.proxy_id.is_some() {
                        return Err(format!("model node {id} has a proxy"));
                    }
                    if state.model_map.get(model_id) != Some(id) {
                        return Err(format!("model map does not point {model_id} at {id}"));
                    }
                    models += 1;
                }
            }
        }
        if hidden_roots != 1 {
            return Err(format!("{hidden_roots} hidden roots"));
        }
        if models != state.model_map.len() {
            return Err(format!(
                "model map has {} entries for {models} model nodes",
                state.model_map.len()
            ));
        }
        Ok(())
    }
}

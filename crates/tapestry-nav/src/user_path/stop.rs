use crate::overlay::OverlayDisplayState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tapestry_core::{NavNodeId, NavNodeKind, OwnerKey};

/// What a stop points at: a model, or a tree node that has no model (group nodes).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StopTarget {
    Model(String),
    Node { node_id: NavNodeId, kind: NavNodeKind },
}

impl StopTarget {
    pub fn model_id(&self) -> Option<&str> {
        match self {
            StopTarget::Model(id) => Some(id),
            StopTarget::Node { .. } => None,
        }
    }

    pub fn node_id(&self) -> Option<&NavNodeId> {
        match self {
            StopTarget::Model(_) => None,
            StopTarget::Node { node_id, .. } => Some(node_id),
        }
    }
}

/// One bookmark on a user path. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTreePathStop {
    target: StopTarget,
    overlay: Option<String>,
    modules: BTreeSet<String>,
    revealed: BTreeSet<String>,
}

impl UserTreePathStop {
    /// Revealed modules outside `modules` are dropped.
    pub fn new(
        target: StopTarget,
        overlay: Option<String>,
        modules: BTreeSet<String>,
        revealed: BTreeSet<String>,
    ) -> Self {
        let revealed = revealed.intersection(&modules).cloned().collect();
        Self {
            target,
            overlay,
            modules,
            revealed,
        }
    }

    pub fn for_model(model_id: impl Into<String>, display: &OverlayDisplayState) -> Self {
        Self::new(
            StopTarget::Model(model_id.into()),
            display.overlay.clone(),
            display.modules.clone(),
            display.revealed.clone(),
        )
    }

    pub fn for_node(node_id: NavNodeId, kind: NavNodeKind) -> Self {
        Self::new(
            StopTarget::Node { node_id, kind },
            None,
            BTreeSet::new(),
            BTreeSet::new(),
        )
    }

    pub fn target(&self) -> &StopTarget {
        &self.target
    }

    pub fn model_id(&self) -> Option<&str> {
        self.target.model_id()
    }

    pub fn node_id(&self) -> Option<&NavNodeId> {
        self.target.node_id()
    }

    pub fn overlay(&self) -> Option<&str> {
        self.overlay.as_deref()
    }

    pub fn modules(&self) -> &BTreeSet<String> {
        &self.modules
    }

    pub fn revealed(&self) -> &BTreeSet<String> {
        &self.revealed
    }

    /// Owner of the stop's overlay, if it targets a model.
    pub fn owner(&self) -> Option<OwnerKey> {
        self.model_id().map(OwnerKey::for_model)
    }

    pub fn display_state(&self) -> OverlayDisplayState {
        OverlayDisplayState::new(
            self.overlay.clone(),
            self.modules.clone(),
            self.revealed.clone(),
        )
    }

    /// True when showing `target` with `display` is exactly this stop.
    pub fn matches(&self, target: &StopTarget, display: &OverlayDisplayState) -> bool {
        self.target == *target
            && self.overlay == display.overlay
            && self.modules == display.modules
            && self.revealed == display.revealed
    }

    /// Copy of this stop with some modules removed.
    pub fn without_modules(&self, removed: &BTreeSet<String>) -> Self {
        Self::new(
            self.target.clone(),
            self.overlay.clone(),
            self.modules.difference(removed).cloned().collect(),
            self.revealed.clone(),
        )
    }
}

use super::{NavNodeContents, TreeState};
use std::sync::Arc;
use tapestry_core::NavNodeId;

/// Before/after record of one tree edit.
#[derive(Debug, Clone)]
pub enum NavTreeChange {
    /// Node added, removed, or moved. Both sides are full tree states.
    Structural {
        before: Arc<TreeState>,
        after: Arc<TreeState>,
    },
    /// One node's contents replaced in place.
    Contents {
        node_id: NavNodeId,
        before: NavNodeContents,
        after: NavNodeContents,
    },
}

impl NavTreeChange {
    pub fn is_structural(&self) -> bool {
        matches!(self, NavTreeChange::Structural { .. })
    }

    /// Node touched by a contents change.
    pub fn node_id(&self) -> Option<&NavNodeId> {
        match self {
            NavTreeChange::Structural { .. } => None,
            NavTreeChange::Contents { node_id, .. } => Some(node_id),
        }
    }
}

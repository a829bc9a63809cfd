use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tapestry_core::{NavNodeId, OwnerKey};

/// Why the overlay view needs repainting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RedrawReason {
    OverlayChanged,
    ModulesChanged,
    RevealChanged,
    Cleanup,
    UndoRedo,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathControlState {
    pub path_key: Option<String>,
    /// Zero-based index of the current stop, if any.
    pub stop: Option<usize>,
    pub stop_count: usize,
    pub can_go_forward: bool,
    pub can_go_backward: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // ========================================================================
    // Navigation Tree Events
    // ========================================================================
    /// The tree widget must rebuild; `select` is the node to leave selected.
    TreeRefresh {
        select: Option<NavNodeId>,
    },
    TreeSelectionChanged {
        node_id: NavNodeId,
        model_id: Option<String>,
    },

    // ========================================================================
    // Overlay Events
    // ========================================================================
    OverlayRedraw {
        owner: Option<OwnerKey>,
        overlay: Option<String>,
        reason: RedrawReason,
    },
    OverlayControlsEnabled {
        enabled: bool,
    },

    // ========================================================================
    // User Path Events
    // ========================================================================
    PathControlsChanged(PathControlState),
    PathListChanged,

    // ========================================================================
    // Group Visibility Events
    // ========================================================================
    GroupVisibilityChanged {
        model_id: String,
    },

    // ========================================================================
    // Image Events
    // ========================================================================
    ImageLoaded {
        key: String,
        path: PathBuf,
    },
    ImageLoadFailed {
        path: PathBuf,
        error: String,
    },

    // ========================================================================
    // Undo/Redo Events
    // ========================================================================
    UndoStackChanged {
        can_undo: bool,
        can_redo: bool,
        undo_description: Option<String>,
        redo_description: Option<String>,
    },
}

/// Queue between the navigation managers and whatever front end listens.
/// Cloning shares the queue.
#[derive(Clone)]
pub struct EventBus {
    tx: Sender<Event>,
    rx: Receiver<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, event: Event) {
        // Both ends live in `self`, so the queue cannot be disconnected.
        let _ = self.tx.send(event);
    }

    /// Take every pending event, oldest first.
    pub fn drain(&self) -> Vec<Event> {
        self.rx.try_iter().collect()
    }

    /// Deliver pending events to `listener` in arrival order and return how
    /// many were delivered.
    ///
    /// Several redraws of one owner's overlay between two dispatches repaint
    /// the same view, so only the last of them is delivered.
    pub fn dispatch_to<L: EventListener>(&self, listener: &mut L) -> usize {
        let pending = self.drain();
        let mut last_redraw: HashMap<(Option<&OwnerKey>, Option<&str>), usize> = HashMap::new();
        for (i, event) in pending.iter().enumerate() {
            if let Some(target) = redraw_target(event) {
                last_redraw.insert(target, i);
            }
        }

        let mut delivered = 0;
        for (i, event) in pending.iter().enumerate() {
            let superseded = redraw_target(event)
                .is_some_and(|target| last_redraw.get(&target) != Some(&i));
            if superseded {
                continue;
            }
            listener.handle_event(event);
            delivered += 1;
        }
        delivered
    }
}

fn redraw_target(event: &Event) -> Option<(Option<&OwnerKey>, Option<&str>)> {
    match event {
        Event::OverlayRedraw { owner, overlay, .. } => Some((owner.as_ref(), overlay.as_deref())),
        _ => None,
    }
}

/// A front-end component that reacts to navigation events.
pub trait EventListener {
    fn handle_event(&mut self, event: &Event);
}

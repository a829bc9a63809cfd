use super::{PathError, StopEdits, StopTarget, UserTreePathChange, UserTreePathManager, UserTreePathStop};
use crate::overlay::OverlayDisplayState;
use std::collections::{BTreeSet, HashMap};
use tapestry_core::{Messages, NavNodeId, OwnerKey};
use tapestry_events::{Event, EventBus, PathControlState};

/// Cursor over the user paths: which path is selected and which stop on it
/// is being shown.
pub struct UserTreePathController {
    manager: UserTreePathManager,
    current_path: Option<String>,
    current_stop: Option<usize>,
    /// Stop to resume at when a path is selected again.
    last_stop: HashMap<String, usize>,
    /// Path whose selection was cleared by navigating off it.
    last_path: Option<String>,
    messages: Messages,
    events: EventBus,
}

impl UserTreePathController {
    pub fn new(events: EventBus, messages: Messages) -> Self {
        Self {
            manager: UserTreePathManager::new(),
            current_path: None,
            current_stop: None,
            last_stop: HashMap::new(),
            last_path: None,
            messages,
            events,
        }
    }

    pub fn manager(&self) -> &UserTreePathManager {
        &self.manager
    }

    /// Replace all paths, as when a file is loaded.
    pub fn install_manager(&mut self, manager: UserTreePathManager) {
        self.manager = manager;
        self.current_path = None;
        self.current_stop = None;
        self.last_stop.clear();
        self.last_path = None;
        self.events.publish(Event::PathListChanged);
        self.sync_path_controls();
    }

    pub fn current_path(&self) -> Option<&str> {
        self.current_path.as_deref()
    }

    pub fn current_stop(&self) -> Option<usize> {
        self.current_stop
    }

    pub fn last_path(&self) -> Option<&str> {
        self.last_path.as_deref()
    }

    fn current_len(&self) -> usize {
        self.current_path
            .as_deref()
            .and_then(|k| self.manager.path(k))
            .map_or(0, |p| p.len())
    }

    fn stop_at(&self, index: usize) -> Option<UserTreePathStop> {
        self.current_path
            .as_deref()
            .and_then(|k| self.manager.path(k))
            .and_then(|p| p.stop(index))
            .cloned()
    }

    fn remember_cursor(&mut self) {
        if let (Some(path), Some(stop)) = (&self.current_path, self.current_stop) {
            self.last_stop.insert(path.clone(), stop);
        }
    }

    /// Publish and return the state of the path navigation controls.
    pub fn sync_path_controls(&self) -> PathControlState {
        let len = self.current_len();
        let state = PathControlState {
            path_key: self.current_path.clone(),
            stop: self.current_stop,
            stop_count: len,
            can_go_forward: match self.current_stop {
                Some(i) => i + 1 < len,
                None => len > 0,
            },
            can_go_backward: self.current_stop.is_some_and(|i| i > 0),
        };
        self.events.publish(Event::PathControlsChanged(state.clone()));
        state
    }

    /// Select a path (or none). Returns the stop to display, resuming at the
    /// stop last visited on that path.
    pub fn set_current_path(&mut self, key: Option<&str>) -> Result<Option<UserTreePathStop>, PathError> {
        if let Some(key) = key
            && self.manager.path(key).is_none()
        {
            return Err(PathError::UnknownPath(key.to_string()));
        }
        self.remember_cursor();
        self.current_path = key.map(str::to_string);
        self.last_path = None;
        let len = self.current_len();
        self.current_stop = match key {
            Some(k) if len > 0 => Some(self.last_stop.get(k).copied().unwrap_or(0).min(len - 1)),
            _ => None,
        };
        self.sync_path_controls();
        Ok(self.current_stop.and_then(|i| self.stop_at(i)))
    }

    pub fn go_to_stop(&mut self, index: usize) -> Result<UserTreePathStop, PathError> {
        let key = self.current_path.clone().ok_or(PathError::NoCurrentPath)?;
        let stop = self.stop_at(index).ok_or_else(|| PathError::StopOutOfRange {
            path: key.clone(),
            index,
            len: self.current_len(),
        })?;
        self.current_stop = Some(index);
        self.last_stop.insert(key, index);
        self.sync_path_controls();
        Ok(stop)
    }

    pub fn path_forward(&mut self) -> Result<UserTreePathStop, PathError> {
        let next = self.current_stop.map_or(0, |i| i + 1);
        self.go_to_stop(next)
    }

    pub fn path_backward(&mut self) -> Result<UserTreePathStop, PathError> {
        let current = self.current_stop.ok_or(PathError::NoCurrentStop)?;
        let prev = current.checked_sub(1).ok_or_else(|| PathError::StopOutOfRange {
            path: self.current_path.clone().unwrap_or_default(),
            index: 0,
            len: self.current_len(),
        })?;
        self.go_to_stop(prev)
    }

    /// Create a path with a generated name ("Path N") unless one is given,
    /// and select it.
    pub fn create_path(&mut self, name: Option<String>) -> Result<(String, UserTreePathChange), PathError> {
        let name = name.unwrap_or_else(|| self.default_path_name());
        let (key, change) = self.manager.add_path(name, None)?;
        self.events.publish(Event::PathListChanged);
        self.set_current_path(Some(&key))?;
        Ok((key, change))
    }

    fn default_path_name(&self) -> String {
        let mut n = self.manager.len() + 1;
        loop {
            let candidate = self.messages.format("treePath.defaultName", &[&n.to_string()]);
            if !self.manager.has_name(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn delete_path(&mut self, key: &str) -> Result<UserTreePathChange, PathError> {
        let change = self.manager.delete_path(key)?;
        self.after_edit(true);
        Ok(change)
    }

    pub fn rename_path(&mut self, key: &str, name: impl Into<String>) -> Result<UserTreePathChange, PathError> {
        let change = self.manager.rename_path(key, name)?;
        self.events.publish(Event::PathListChanged);
        Ok(change)
    }

    pub fn move_path(&mut self, key: &str, index: usize) -> Result<UserTreePathChange, PathError> {
        let change = self.manager.move_path(key, index)?;
        self.events.publish(Event::PathListChanged);
        Ok(change)
    }

    /// Add a stop right after the current one on the current path and move
    /// the cursor to it. A path left by navigating off it is selected again.
    pub fn add_stop(&mut self, stop: UserTreePathStop) -> Result<UserTreePathChange, PathError> {
        if self.current_path.is_none()
            && let Some(key) = self.last_path.take()
        {
            self.current_stop = self.last_stop.get(&key).copied();
            self.current_path = Some(key);
        }
        let key = self.current_path.clone().ok_or(PathError::NoCurrentPath)?;
        let index = self.current_stop.map_or(self.current_len(), |i| i + 1);
        self.insert_stop(&key, index, stop)
    }

    pub fn insert_stop(
        &mut self,
        key: &str,
        index: usize,
        stop: UserTreePathStop,
    ) -> Result<UserTreePathChange, PathError> {
        let change = self.manager.insert_stop(key, index, stop)?;
        if self.current_path.as_deref() == Some(key) {
            self.current_stop = Some(index);
            self.last_stop.insert(key.to_string(), index);
        }
        self.sync_path_controls();
        Ok(change)
    }

    pub fn delete_current_stop(&mut self) -> Result<UserTreePathChange, PathError> {
        let key = self.current_path.clone().ok_or(PathError::NoCurrentPath)?;
        let index = self.current_stop.ok_or(PathError::NoCurrentStop)?;
        let change = self.manager.delete_stop(&key, index)?;
        self.after_edit(false);
        Ok(change)
    }

    /// Find the stop on the selected path (or the path left most recently)
    /// that shows exactly `target` with `display`, and move the cursor to it.
    ///
    /// The nearest match to the cursor wins; on a tie, the one after the
    /// cursor. With no match the selection is cleared and the path is
    /// remembered so a later match can resume it.
    pub fn current_model_on_current_path(
        &mut self,
        target: &StopTarget,
        display: &OverlayDisplayState,
    ) -> Option<usize> {
        let key = self.current_path.clone().or_else(|| self.last_path.clone())?;
        let path = self.manager.path(&key)?;
        let cursor = if self.current_path.is_some() {
            self.current_stop
        } else {
            self.last_stop.get(&key).copied()
        };
        let matches = path
            .stops()
            .iter()
            .enumerate()
            .filter(|(_, s)| s.matches(target, display))
            .map(|(i, _)| i);
        let best = match cursor {
            Some(c) => matches.min_by_key(|&i| (i.abs_diff(c), i < c)),
            None => matches.min(),
        };

        match best {
            Some(index) => {
                self.current_path = Some(key.clone());
                self.current_stop = Some(index);
                self.last_stop.insert(key, index);
                self.last_path = None;
            }
            None => {
                if self.current_path.is_some() {
                    self.remember_cursor();
                    self.last_path = self.current_path.take();
                    self.current_stop = None;
                }
            }
        }
        self.sync_path_controls();
        best
    }

    fn apply_edits(&mut self, edits: StopEdits) -> StopEdits {
        if !edits.is_empty() {
            self.after_edit(!edits.deleted_paths.is_empty());
        }
        edits
    }

    pub fn drop_stops_on_model(&mut self, model_id: &str) -> StopEdits {
        let edits = self.manager.drop_stops_on_model(model_id);
        self.apply_edits(edits)
    }

    pub fn drop_stops_on_node(&mut self, node_id: &NavNodeId) -> StopEdits {
        let edits = self.manager.drop_stops_on_node(node_id);
        self.apply_edits(edits)
    }

    pub fn drop_stops_on_overlay(&mut self, owner: &OwnerKey, overlay: &str) -> StopEdits {
        let edits = self.manager.drop_stops_on_overlay(owner, overlay);
        self.apply_edits(edits)
    }

    pub fn drop_or_change_stops_on_modules(
        &mut self,
        owner: &OwnerKey,
        overlay: &str,
        removed: &BTreeSet<String>,
    ) -> StopEdits {
        let edits = self.manager.drop_or_change_stops_on_modules(owner, overlay, removed);
        self.apply_edits(edits)
    }

    /// Keep the cursor pointing at something that exists.
    fn clamp_cursor(&mut self) {
        let manager = &self.manager;
        self.last_stop.retain(|k, _| manager.path(k).is_some());
        for (key, stop) in self.last_stop.iter_mut() {
            let len = manager.path(key).map_or(0, |p| p.len());
            *stop = (*stop).min(len.saturating_sub(1));
        }
        if self
            .last_path
            .as_deref()
            .is_some_and(|k| manager.path(k).is_none())
        {
            self.last_path = None;
        }
        match self.current_path.as_deref().map(|k| manager.path(k)) {
            Some(None) => {
                self.current_path = None;
                self.current_stop = None;
            }
            Some(Some(path)) => {
                self.current_stop = match (self.current_stop, path.len()) {
                    (_, 0) => None,
                    (Some(i), len) => Some(i.min(len - 1)),
                    (None, _) => None,
                };
            }
            None => self.current_stop = None,
        }
    }

    fn after_edit(&mut self, list_changed: bool) {
        self.clamp_cursor();
        if list_changed {
            self.events.publish(Event::PathListChanged);
        }
        self.sync_path_controls();
    }

    pub fn change_undo(&mut self, change: &UserTreePathChange) {
        self.manager.change_undo(change);
        self.after_edit(true);
    }

    pub fn change_redo(&mut self, change: &UserTreePathChange) {
        self.manager.change_redo(change);
        self.after_edit(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn display(overlay: &str, modules: &[&str]) -> OverlayDisplayState {
        OverlayDisplayState::new(Some(overlay.to_string()), set(modules), BTreeSet::new())
    }

    fn controller() -> (UserTreePathController, EventBus) {
        let bus = EventBus::new();
        (UserTreePathController::new(bus.clone(), Messages::default()), bus)
    }

    fn model(id: &str) -> StopTarget {
        StopTarget::Model(id.to_string())
    }

    /// Path with stops on models M0..M{n-1}, all on overlay "ov" with module "a".
    fn with_path(ctrl: &mut UserTreePathController, models: &[&str]) -> String {
        let (key, _) = ctrl.create_path(None).unwrap();
        for m in models {
            ctrl.add_stop(UserTreePathStop::for_model(*m, &display("ov", &["a"])))
                .unwrap();
        }
        key
    }

    #[test]
    fn test_create_path_generates_unique_names() {
        let (mut ctrl, bus) = controller();
        let (first, _) = ctrl.create_path(None).unwrap();
        let (second, _) = ctrl.create_path(None).unwrap();
        assert_eq!(ctrl.manager().path(&first).unwrap().name(), "Path 1");
        assert_eq!(ctrl.manager().path(&second).unwrap().name(), "Path 2");
        assert_eq!(ctrl.current_path(), Some(second.as_str()));
        assert!(bus.drain().iter().any(|e| matches!(e, Event::PathListChanged)));
    }

    #[test]
    fn test_add_stop_goes_after_cursor() {
        let (mut ctrl, _) = controller();
        let key = with_path(&mut ctrl, &["A", "B", "C"]);
        ctrl.go_to_stop(0).unwrap();
        ctrl.add_stop(UserTreePathStop::for_model("X", &display("ov", &[])))
            .unwrap();
        let path = ctrl.manager().path(&key).unwrap();
        assert_eq!(path.stop(1).unwrap().model_id(), Some("X"));
        assert_eq!(ctrl.current_stop(), Some(1));
    }

    #[test]
    fn test_add_stop_resumes_path_left_by_navigation() {
        let (mut ctrl, _) = controller();
        let key = with_path(&mut ctrl, &["A"]);
        assert_eq!(
            ctrl.current_model_on_current_path(&model("Q"), &display("ov", &["a"])),
            None
        );
        assert_eq!(ctrl.current_path(), None);

        ctrl.add_stop(UserTreePathStop::for_model("Q", &display("ov", &["a"])))
            .unwrap();
        assert_eq!(ctrl.current_path(), Some(key.as_str()));
        assert_eq!(ctrl.current_stop(), Some(1));
        assert_eq!(ctrl.manager().path(&key).unwrap().len(), 2);
    }

    #[test]
    fn test_forward_backward_bounds() {
        let (mut ctrl, _) = controller();
        with_path(&mut ctrl, &["A", "B"]);
        assert_eq!(ctrl.current_stop(), Some(1));
        assert!(ctrl.path_forward().is_err());
        assert_eq!(ctrl.path_backward().unwrap().model_id(), Some("A"));
        assert!(ctrl.path_backward().is_err());
        let state = ctrl.sync_path_controls();
        assert!(state.can_go_forward);
        assert!(!state.can_go_backward);
    }

    #[test]
    fn test_switching_paths_resumes_last_stop() {
        let (mut ctrl, _) = controller();
        let first = with_path(&mut ctrl, &["A", "B", "C"]);
        ctrl.go_to_stop(1).unwrap();
        let second = with_path(&mut ctrl, &["D"]);
        assert_eq!(ctrl.current_path(), Some(second.as_str()));
        let stop = ctrl.set_current_path(Some(&first)).unwrap().unwrap();
        assert_eq!(stop.model_id(), Some("B"));
        assert_eq!(ctrl.current_stop(), Some(1));
    }

    #[test]
    fn test_sync_tie_prefers_stop_above_cursor() {
        let (mut ctrl, _) = controller();
        with_path(&mut ctrl, &["A", "B", "X", "C", "D", "E", "X"]);
        ctrl.go_to_stop(4).unwrap();
        let found = ctrl.current_model_on_current_path(&model("X"), &display("ov", &["a"]));
        assert_eq!(found, Some(6));
    }

    #[test]
    fn test_sync_prefers_nearest() {
        let (mut ctrl, _) = controller();
        with_path(&mut ctrl, &["X", "B", "C", "X", "D", "E", "F", "X"]);
        ctrl.go_to_stop(2).unwrap();
        let found = ctrl.current_model_on_current_path(&model("X"), &display("ov", &["a"]));
        assert_eq!(found, Some(3));
    }

    #[test]
    fn test_sync_miss_clears_and_resumes() {
        let (mut ctrl, _) = controller();
        let key = with_path(&mut ctrl, &["A", "B"]);
        let miss = ctrl.current_model_on_current_path(&model("Z"), &display("ov", &["a"]));
        assert_eq!(miss, None);
        assert_eq!(ctrl.current_path(), None);
        assert_eq!(ctrl.current_stop(), None);
        assert_eq!(ctrl.last_path(), Some(key.as_str()));

        // Same model, different modules: still no match.
        assert_eq!(
            ctrl.current_model_on_current_path(&model("A"), &display("ov", &[])),
            None
        );

        let hit = ctrl.current_model_on_current_path(&model("A"), &display("ov", &["a"]));
        assert_eq!(hit, Some(0));
        assert_eq!(ctrl.current_path(), Some(key.as_str()));
        assert_eq!(ctrl.last_path(), None);
    }

    #[test]
    fn test_delete_current_stop_clamps() {
        let (mut ctrl, _) = controller();
        with_path(&mut ctrl, &["A", "B"]);
        ctrl.delete_current_stop().unwrap();
        assert_eq!(ctrl.current_stop(), Some(0));
        ctrl.delete_current_stop().unwrap();
        assert_eq!(ctrl.current_stop(), None);
        assert_eq!(ctrl.delete_current_stop().unwrap_err(), PathError::NoCurrentStop);
    }

    #[test]
    fn test_fan_out_deletes_current_path() {
        let (mut ctrl, _) = controller();
        let key = with_path(&mut ctrl, &["A"]);
        let owner = OwnerKey::Genome("A".to_string());
        let edits = ctrl.drop_or_change_stops_on_modules(&owner, "ov", &set(&["a"]));
        assert_eq!(edits.deleted_paths.len(), 1);
        assert_eq!(ctrl.current_path(), None);

        for change in edits.into_changes().iter().rev() {
            ctrl.change_undo(change);
        }
        assert_eq!(ctrl.manager().path(&key).unwrap().len(), 1);
    }

    #[test]
    fn test_undo_delete_path_restores() {
        let (mut ctrl, _) = controller();
        let key = with_path(&mut ctrl, &["A"]);
        let change = ctrl.delete_path(&key).unwrap();
        assert!(ctrl.manager().is_empty());
        assert_eq!(ctrl.current_path(), None);
        ctrl.change_undo(&change);
        assert_eq!(ctrl.manager().keys(), &[key.clone()]);
        ctrl.change_redo(&change);
        assert!(ctrl.manager().is_empty());
    }
}

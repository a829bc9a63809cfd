//! Undo/redo for navigation edits.
//!
//! Every manager call returns a change record. A user action collects its
//! records into one [`UndoableEdit`] through [`UndoSupport`], and the edit is
//! pushed onto the [`CommandHistory`]. Undo replays the records backwards
//! through `change_undo`; redo replays them forwards through `change_redo`.

use tapestry_events::{Event, EventBus};
use tapestry_nav::{
    GroupSettingChange, ImageChange, NavTreeChange, NavTreeError, OverlayDisplayChange,
    UserTreePathChange,
};
use thiserror::Error;

/// A change record from any of the navigation managers.
#[derive(Debug, Clone)]
pub enum NavChange {
    Tree(NavTreeChange),
    Overlay(OverlayDisplayChange),
    Path(UserTreePathChange),
    GroupSetting(GroupSettingChange),
    Image(ImageChange),
}

impl From<NavTreeChange> for NavChange {
    fn from(change: NavTreeChange) -> Self {
        NavChange::Tree(change)
    }
}

impl From<OverlayDisplayChange> for NavChange {
    fn from(change: OverlayDisplayChange) -> Self {
        NavChange::Overlay(change)
    }
}

impl From<UserTreePathChange> for NavChange {
    fn from(change: UserTreePathChange) -> Self {
        NavChange::Path(change)
    }
}

impl From<GroupSettingChange> for NavChange {
    fn from(change: GroupSettingChange) -> Self {
        NavChange::GroupSetting(change)
    }
}

impl From<ImageChange> for NavChange {
    fn from(change: ImageChange) -> Self {
        NavChange::Image(change)
    }
}

#[derive(Error, Debug)]
pub enum UndoError {
    #[error("Nothing to undo")]
    NothingToUndo,
    #[error("Nothing to redo")]
    NothingToRedo,
    #[error("Nav tree error: {0}")]
    NavTree(#[from] NavTreeError),
}

/// Whatever owns the managers the change records belong to.
pub trait ChangeTarget {
    fn undo_change(&mut self, change: &NavChange) -> Result<(), UndoError>;
    fn redo_change(&mut self, change: &NavChange) -> Result<(), UndoError>;
}

/// One user-visible step on the undo stack.
#[derive(Debug, Clone)]
pub struct UndoableEdit {
    description: String,
    changes: Vec<NavChange>,
    /// Published after every apply, undo and redo.
    events: Vec<Event>,
}

impl UndoableEdit {
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn changes(&self) -> &[NavChange] {
        &self.changes
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    fn undo(&self, target: &mut dyn ChangeTarget) -> Result<(), UndoError> {
        for change in self.changes.iter().rev() {
            target.undo_change(change)?;
        }
        Ok(())
    }

    fn redo(&self, target: &mut dyn ChangeTarget) -> Result<(), UndoError> {
        for change in &self.changes {
            target.redo_change(change)?;
        }
        Ok(())
    }
}

/// Collects the change records of one user action.
#[derive(Debug)]
pub struct UndoSupport {
    description: String,
    changes: Vec<NavChange>,
    events: Vec<Event>,
}

impl UndoSupport {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            changes: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn add_edit(&mut self, change: impl Into<NavChange>) {
        self.changes.push(change.into());
    }

    pub fn add_edits<I, C>(&mut self, changes: I)
    where
        I: IntoIterator<Item = C>,
        C: Into<NavChange>,
    {
        self.changes.extend(changes.into_iter().map(Into::into));
    }

    pub fn add_event(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// `None` when nothing was recorded; such actions never reach the stack.
    pub fn finish(self) -> Option<UndoableEdit> {
        if self.changes.is_empty() {
            return None;
        }
        Some(UndoableEdit {
            description: self.description,
            changes: self.changes,
            events: self.events,
        })
    }
}

/// Bounded undo and redo stacks.
pub struct CommandHistory {
    undo_stack: Vec<UndoableEdit>,
    redo_stack: Vec<UndoableEdit>,
    max_size: usize,
    event_bus: EventBus,
}

impl CommandHistory {
    pub fn new(max_size: usize, event_bus: EventBus) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_size,
            event_bus,
        }
    }

    /// Record an edit that has already been applied.
    pub fn push(&mut self, edit: UndoableEdit) {
        self.publish_events(&edit);
        self.redo_stack.clear();
        self.undo_stack.push(edit);
        while self.undo_stack.len() > self.max_size {
            self.undo_stack.remove(0);
        }
        self.notify_change();
    }

    pub fn undo(&mut self, target: &mut dyn ChangeTarget) -> Result<(), UndoError> {
        let edit = self.undo_stack.pop().ok_or(UndoError::NothingToUndo)?;
        if let Err(e) = edit.undo(target) {
            tracing::error!("Undo of '{}' failed: {}", edit.description, e);
            self.undo_stack.push(edit);
            return Err(e);
        }
        self.publish_events(&edit);
        self.redo_stack.push(edit);
        self.notify_change();
        Ok(())
    }

    pub fn redo(&mut self, target: &mut dyn ChangeTarget) -> Result<(), UndoError> {
        let edit = self.redo_stack.pop().ok_or(UndoError::NothingToRedo)?;
        if let Err(e) = edit.redo(target) {
            tracing::error!("Redo of '{}' failed: {}", edit.description, e);
            self.redo_stack.push(edit);
            return Err(e);
        }
        self.publish_events(&edit);
        self.undo_stack.push(edit);
        self.notify_change();
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.undo_stack.last().map(|e| e.description.clone())
    }

    pub fn redo_description(&self) -> Option<String> {
        self.redo_stack.last().map(|e| e.description.clone())
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.notify_change();
    }

    fn publish_events(&self, edit: &UndoableEdit) {
        for event in &edit.events {
            self.event_bus.publish(event.clone());
        }
    }

    fn notify_change(&self) {
        self.event_bus.publish(Event::UndoStackChanged {
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
            undo_description: self.undo_description(),
            redo_description: self.redo_description(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapestry_nav::{GroupSettingManager, GroupVisibility};

    struct Groups(GroupSettingManager);

    impl ChangeTarget for Groups {
        fn undo_change(&mut self, change: &NavChange) -> Result<(), UndoError> {
            if let NavChange::GroupSetting(c) = change {
                self.0.change_undo(c);
            }
            Ok(())
        }

        fn redo_change(&mut self, change: &NavChange) -> Result<(), UndoError> {
            if let NavChange::GroupSetting(c) = change {
                self.0.change_redo(c);
            }
            Ok(())
        }
    }

    fn edit(groups: &mut Groups, group: &str) -> UndoableEdit {
        let mut support = UndoSupport::new(format!("hide {group}"));
        support.add_edits(
            groups
                .0
                .set_group_visibility("A", group, GroupVisibility::None),
        );
        support.finish().unwrap()
    }

    #[test]
    fn test_empty_support_is_dropped() {
        assert!(UndoSupport::new("noop").finish().is_none());
    }

    #[test]
    fn test_undo_redo_cycle() {
        let bus = EventBus::new();
        let mut history = CommandHistory::new(10, bus.clone());
        let mut groups = Groups(GroupSettingManager::new());

        let e = edit(&mut groups, "g1");
        history.push(e);
        assert_eq!(history.undo_description().as_deref(), Some("hide g1"));

        history.undo(&mut groups).unwrap();
        assert_eq!(groups.0.visibility("A", "g1"), GroupVisibility::Active);
        assert!(history.can_redo());

        history.redo(&mut groups).unwrap();
        assert_eq!(groups.0.visibility("A", "g1"), GroupVisibility::None);
        assert!(matches!(
            history.redo(&mut groups),
            Err(UndoError::NothingToRedo)
        ));

        let last = bus
            .drain()
            .into_iter()
            .filter(|e| matches!(e, Event::UndoStackChanged { .. }))
            .last();
        assert!(matches!(
            last,
            Some(Event::UndoStackChanged {
                can_undo: true,
                can_redo: false,
                ..
            })
        ));
    }

    #[test]
    fn test_new_edit_clears_redo_and_depth_is_bounded() {
        let mut history = CommandHistory::new(2, EventBus::new());
        let mut groups = Groups(GroupSettingManager::new());
        for g in ["g1", "g2", "g3"] {
            let e = edit(&mut groups, g);
            history.push(e);
        }
        assert_eq!(history.undo_len(), 2);

        history.undo(&mut groups).unwrap();
        let e = edit(&mut groups, "g4");
        history.push(e);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_edit_events_replay_on_undo() {
        let bus = EventBus::new();
        let mut history = CommandHistory::new(10, bus.clone());
        let mut groups = Groups(GroupSettingManager::new());
        let mut support = UndoSupport::new("hide");
        support.add_edits(groups.0.set_group_visibility("A", "g1", GroupVisibility::None));
        support.add_event(Event::GroupVisibilityChanged {
            model_id: "A".to_string(),
        });
        history.push(support.finish().unwrap());
        bus.drain();

        history.undo(&mut groups).unwrap();
        assert!(bus
            .drain()
            .iter()
            .any(|e| matches!(e, Event::GroupVisibilityChanged { model_id } if model_id == "A")));
    }
}

//! Headless navigation session.
//!
//! [`NavigationSession`] owns every navigation manager, routes each user
//! action through them, records the resulting change objects on the undo
//! stack and fans deletions out so no manager keeps a dangling reference.
//! Any front end (CLI, desktop shell, tests) drives the session and listens
//! on its [`EventBus`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tapestry_core::{
    InMemoryModelSource, Messages, ModelSource, NavNodeId, NavNodeKind, OwnerKey,
};
use tapestry_events::{Event, EventBus};
use tapestry_nav::{
    ColorKey, GroupNodeMapEntry, GroupSettingChange, GroupSettingManager, GroupVisibility,
    ImageError, ImageManager, LoadedImage, NavNodeContents, NavTree, NavTreeError,
    NetOverlayController, NewNode, OverlayDisplayChange, OverlayError, PathError, StopTarget,
    UserTreePathController, UserTreePathStop, XPlatModelTree,
};
use thiserror::Error;

mod fanout;
pub mod loader;
mod persist;
pub mod settings;
pub mod undo;

pub use loader::{ImageLoadResult, ImageLoader, LoadTicket};
pub use settings::SessionSettings;
pub use undo::{ChangeTarget, CommandHistory, NavChange, UndoError, UndoSupport, UndoableEdit};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Nav tree error: {0}")]
    NavTree(#[from] NavTreeError),
    #[error("Overlay error: {0}")]
    Overlay(#[from] OverlayError),
    #[error("Path error: {0}")]
    Path(#[from] PathError),
    #[error("Image error: {0}")]
    Image(#[from] ImageError),
    #[error("Undo error: {0}")]
    Undo(#[from] UndoError),
    #[error("Unknown node: {0}")]
    UnknownNode(NavNodeId),
    #[error("Model {0} is not in the tree")]
    ModelNotInTree(String),
    #[error("No node is selected")]
    NoSelection,
}

/// The managers an undoable edit can touch.
pub struct NavState {
    pub tree: NavTree,
    pub overlay: NetOverlayController,
    pub paths: UserTreePathController,
    pub group_settings: GroupSettingManager,
    pub images: ImageManager,
}

impl ChangeTarget for NavState {
    fn undo_change(&mut self, change: &NavChange) -> Result<(), UndoError> {
        match change {
            NavChange::Tree(c) => self.tree.change_undo(c)?,
            NavChange::Overlay(c) => self.overlay.change_undo(c),
            NavChange::Path(c) => self.paths.change_undo(c),
            NavChange::GroupSetting(c) => self.group_settings.change_undo(c),
            NavChange::Image(c) => self.images.change_undo(c),
        }
        Ok(())
    }

    fn redo_change(&mut self, change: &NavChange) -> Result<(), UndoError> {
        match change {
            NavChange::Tree(c) => self.tree.change_redo(c)?,
            NavChange::Overlay(c) => self.overlay.change_redo(c),
            NavChange::Path(c) => self.paths.change_redo(c),
            NavChange::GroupSetting(c) => self.group_settings.change_redo(c),
            NavChange::Image(c) => self.images.change_redo(c),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLoadOutcome {
    Loaded { path: PathBuf, key: String },
    Failed { path: PathBuf, error: String },
}

pub struct NavigationSession<S: ModelSource = InMemoryModelSource> {
    source: S,
    settings: SessionSettings,
    messages: Messages,
    events: EventBus,
    state: NavState,
    history: CommandHistory,
    loader: ImageLoader,
    selected: Option<NavNodeId>,
}

impl<S: ModelSource> NavigationSession<S> {
    pub fn new(source: S, settings: SessionSettings) -> Self {
        let events = EventBus::new();
        let mut messages = Messages::default();
        messages.set(
            "treePath.defaultName",
            format!("{} {{0}}", settings.path_name_prefix),
        );
        let state = NavState {
            tree: NavTree::new(),
            overlay: NetOverlayController::new(events.clone()),
            paths: UserTreePathController::new(events.clone(), messages.clone()),
            group_settings: GroupSettingManager::new(),
            images: ImageManager::new(),
        };
        Self {
            source,
            history: CommandHistory::new(settings.undo_depth, events.clone()),
            loader: ImageLoader::new(settings.image_workers),
            settings,
            messages,
            events,
            state,
            selected: None,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// The model layer. Edits made here must be followed by the matching
    /// `delete_*` call so the navigation state forgets the removed parts.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn state(&self) -> &NavState {
        &self.state
    }

    pub fn tree(&self) -> &NavTree {
        &self.state.tree
    }

    pub fn overlay(&self) -> &NetOverlayController {
        &self.state.overlay
    }

    pub fn paths(&self) -> &UserTreePathController {
        &self.state.paths
    }

    pub fn group_settings(&self) -> &GroupSettingManager {
        &self.state.group_settings
    }

    pub fn images(&self) -> &ImageManager {
        &self.state.images
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn selected(&self) -> Option<&NavNodeId> {
        self.selected.as_ref()
    }

    fn commit(&mut self, support: UndoSupport) {
        if let Some(edit) = support.finish() {
            tracing::debug!("Recorded edit '{}'", edit.description());
            self.history.push(edit);
        }
    }

    fn support(&self, key: &str) -> UndoSupport {
        UndoSupport::new(self.messages.get(key))
    }

    fn contents(&self, id: &NavNodeId) -> Result<&NavNodeContents, SessionError> {
        self.state
            .tree
            .contents(id)
            .ok_or_else(|| SessionError::UnknownNode(id.clone()))
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Show a tree node: switch the overlay display to its owner and move
    /// the path cursor to a stop that matches what is now shown.
    pub fn select_node(&mut self, id: &NavNodeId) -> Result<(), SessionError> {
        self.show_node(id)?;
        self.sync_paths_to_view();
        Ok(())
    }

    /// Select the node matching `key` (model, node or proxied model ID), or
    /// the default selection.
    pub fn select_startup(&mut self, key: Option<&str>) -> Result<Option<NavNodeId>, SessionError> {
        let Some(id) = self.state.tree.startup_selection(key, &self.source) else {
            return Ok(None);
        };
        self.select_node(&id)?;
        Ok(Some(id))
    }

    fn show_node(&mut self, id: &NavNodeId) -> Result<(), SessionError> {
        let contents = self.contents(id)?;
        let owner = owner_for(contents);
        let model_id = contents.model_id.clone();
        self.selected = Some(id.clone());
        self.state.overlay.preload_for_owner(&self.source, owner);
        self.events.publish(Event::TreeSelectionChanged {
            node_id: id.clone(),
            model_id,
        });
        Ok(())
    }

    fn stop_target(&self, id: &NavNodeId) -> Result<StopTarget, SessionError> {
        let contents = self.contents(id)?;
        Ok(match &contents.model_id {
            Some(model_id) => StopTarget::Model(model_id.clone()),
            None => StopTarget::Node {
                node_id: id.clone(),
                kind: contents.kind,
            },
        })
    }

    fn sync_paths_to_view(&mut self) {
        let Some(id) = self.selected.clone() else {
            return;
        };
        let Ok(target) = self.stop_target(&id) else {
            return;
        };
        let display = self.state.overlay.current().clone();
        self.state
            .paths
            .current_model_on_current_path(&target, &display);
    }

    /// Drop the selection if undo/redo removed the selected node.
    fn revalidate_selection(&mut self) {
        if let Some(id) = &self.selected
            && self.state.tree.node(id).is_none()
        {
            self.selected = None;
            self.state.overlay.preload_for_owner(&self.source, None);
        }
    }

    // ========================================================================
    // Tree edits
    // ========================================================================

    pub fn add_node(&mut self, request: NewNode) -> Result<NavNodeId, SessionError> {
        let (id, change) = self.state.tree.add_node(request)?;
        let mut support = self.support("undo.addNode");
        support.add_edit(change);
        support.add_event(Event::TreeRefresh {
            select: Some(id.clone()),
        });
        self.commit(support);
        Ok(id)
    }

    /// Add a group node named from the message table.
    pub fn add_group_node(&mut self, parent: &NavNodeId) -> Result<NavNodeId, SessionError> {
        let name = self.messages.get("navTree.newGroupNode");
        self.add_node(NewNode::group(name, parent))
    }

    /// Duplicate a group node. The copy shares the original's images.
    pub fn copy_group_node(&mut self, id: &NavNodeId) -> Result<NavNodeId, SessionError> {
        let original = self.contents(id)?;
        let name = original
            .name
            .as_deref()
            .map(|n| self.messages.format("navTree.copyOf", &[n]));
        let image_keys = original.image_keys();

        let (copy, change) = self.state.tree.copy_group_node(id, name)?;
        let mut support = self.support("undo.addNode");
        support.add_edit(change);
        for key in image_keys {
            support.add_edit(self.state.images.register_image_usage(&key)?);
        }
        support.add_event(Event::TreeRefresh {
            select: Some(copy.clone()),
        });
        self.commit(support);
        Ok(copy)
    }

    pub fn rename_node(&mut self, id: &NavNodeId, name: Option<String>) -> Result<(), SessionError> {
        let change = self.state.tree.set_node_name(id, name)?;
        let mut support = self.support("undo.renameNode");
        support.add_edit(change);
        support.add_event(Event::TreeRefresh {
            select: Some(id.clone()),
        });
        self.commit(support);
        Ok(())
    }

    /// Returns false when the node is already at that end of its siblings.
    pub fn shift_node(&mut self, id: &NavNodeId, up: bool) -> Result<bool, SessionError> {
        let Some(change) = self.state.tree.shift_node(id, up)? else {
            return Ok(false);
        };
        let mut support = self.support("undo.moveNode");
        support.add_edit(change);
        support.add_event(Event::TreeRefresh {
            select: Some(id.clone()),
        });
        self.commit(support);
        Ok(true)
    }

    /// Point a group node at new images. Every image slot that refers to a
    /// key holds one usage of it, so a key used for both slots counts twice.
    pub fn set_group_node_images(
        &mut self,
        id: &NavNodeId,
        image_id: Option<String>,
        map_image_id: Option<String>,
    ) -> Result<(), SessionError> {
        let mut delta: BTreeMap<String, i64> = BTreeMap::new();
        for key in self.contents(id)?.image_keys() {
            *delta.entry(key).or_default() -= 1;
        }
        for key in image_id.iter().chain(map_image_id.iter()) {
            *delta.entry(key.clone()).or_default() += 1;
        }

        let change = self
            .state
            .tree
            .set_group_node_images(id, image_id, map_image_id)?;
        let mut support = self.support("undo.groupImages");
        support.add_edit(change);
        // Take new usages before releasing old ones.
        for (key, n) in delta.iter().filter(|(_, n)| **n > 0) {
            if !self.state.images.contains(key) {
                tracing::warn!("Group node {} refers to unknown image {}", id, key);
                continue;
            }
            for _ in 0..*n {
                support.add_edit(self.state.images.register_image_usage(key)?);
            }
        }
        for (key, n) in delta.iter().filter(|(_, n)| **n < 0) {
            for _ in 0..n.unsigned_abs() {
                if self.state.images.contains(key) {
                    support.add_edit(self.state.images.drop_image_usage(key)?);
                }
            }
        }
        support.add_event(Event::TreeRefresh {
            select: Some(id.clone()),
        });
        self.commit(support);
        Ok(())
    }

    pub fn set_group_model_map(
        &mut self,
        id: &NavNodeId,
        model_map: BTreeMap<ColorKey, GroupNodeMapEntry>,
    ) -> Result<(), SessionError> {
        let change = self.state.tree.set_group_model_map(id, model_map)?;
        let mut support = self.support("undo.groupMap");
        support.add_edit(change);
        self.commit(support);
        Ok(())
    }

    /// Turn a per-time dynamic node into a slider over `proxy_id`.
    pub fn change_to_proxy(&mut self, id: &NavNodeId, proxy_id: &str) -> Result<(), SessionError> {
        let change = self.state.tree.change_to_proxy(id, proxy_id)?;
        self.record_proxy_change(id, change.into());
        Ok(())
    }

    /// Turn a slider back into a single dynamic model.
    pub fn change_from_proxy(&mut self, id: &NavNodeId, model_id: &str) -> Result<(), SessionError> {
        let change = self.state.tree.change_from_proxy(id, model_id)?;
        self.record_proxy_change(id, change.into());
        Ok(())
    }

    fn record_proxy_change(&mut self, id: &NavNodeId, change: NavChange) {
        let mut support = self.support("undo.changeProxy");
        support.add_edit(change);
        support.add_event(Event::TreeRefresh {
            select: Some(id.clone()),
        });
        self.commit(support);
        if self.selected.as_ref() == Some(id) {
            if let Err(e) = self.show_node(id) {
                tracing::warn!("Could not reshow retyped node {}: {}", id, e);
            }
        }
    }

    // ========================================================================
    // Overlay display
    // ========================================================================

    fn overlay_edit<F>(&mut self, edit: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut NetOverlayController, &dyn ModelSource) -> Result<OverlayDisplayChange, OverlayError>,
    {
        let source: &dyn ModelSource = &self.source;
        let change = edit(&mut self.state.overlay, source)?;
        let mut support = self.support("undo.overlay");
        support.add_edit(change);
        self.commit(support);
        self.sync_paths_to_view();
        Ok(())
    }

    pub fn set_current_overlay(&mut self, overlay: Option<&str>) -> Result<(), SessionError> {
        self.overlay_edit(|ctrl, source| ctrl.set_current_overlay(source, overlay))
    }

    pub fn add_to_current_modules(&mut self, module: &str) -> Result<(), SessionError> {
        self.overlay_edit(|ctrl, source| ctrl.add_to_current_modules(source, module))
    }

    pub fn drop_a_current_module(&mut self, module: &str) -> Result<(), SessionError> {
        self.overlay_edit(|ctrl, source| ctrl.drop_a_current_module(source, module))
    }

    pub fn set_to_single_current_module(&mut self, module: &str) -> Result<(), SessionError> {
        self.overlay_edit(|ctrl, source| ctrl.set_to_single_current_module(source, module))
    }

    pub fn set_current_revealed(&mut self, revealed: BTreeSet<String>) -> Result<(), SessionError> {
        self.overlay_edit(|ctrl, source| ctrl.set_current_revealed(source, revealed))
    }

    pub fn toggle_mod_content_display(&mut self, module: &str) -> Result<(), SessionError> {
        self.overlay_edit(|ctrl, source| ctrl.toggle_mod_content_display(source, module))
    }

    // ========================================================================
    // User paths
    // ========================================================================

    pub fn create_path(&mut self, name: Option<String>) -> Result<String, SessionError> {
        let (key, change) = self.state.paths.create_path(name)?;
        let mut support = self.support("undo.createPath");
        support.add_edit(change);
        support.add_event(Event::PathListChanged);
        self.commit(support);
        Ok(key)
    }

    pub fn delete_path(&mut self, key: &str) -> Result<(), SessionError> {
        let change = self.state.paths.delete_path(key)?;
        let mut support = self.support("undo.deletePath");
        support.add_edit(change);
        self.commit(support);
        Ok(())
    }

    pub fn rename_path(&mut self, key: &str, name: &str) -> Result<(), SessionError> {
        let change = self.state.paths.rename_path(key, name)?;
        let mut support = self.support("undo.renamePath");
        support.add_edit(change);
        self.commit(support);
        Ok(())
    }

    pub fn move_path(&mut self, key: &str, index: usize) -> Result<(), SessionError> {
        let change = self.state.paths.move_path(key, index)?;
        let mut support = self.support("undo.movePath");
        support.add_edit(change);
        self.commit(support);
        Ok(())
    }

    /// Bookmark what is shown now as a stop after the cursor.
    pub fn add_stop(&mut self) -> Result<(), SessionError> {
        let id = self.selected.clone().ok_or(SessionError::NoSelection)?;
        let stop = match self.stop_target(&id)? {
            StopTarget::Model(model_id) => {
                UserTreePathStop::for_model(model_id, self.state.overlay.current())
            }
            StopTarget::Node { node_id, kind } => UserTreePathStop::for_node(node_id, kind),
        };
        let change = self.state.paths.add_stop(stop)?;
        let mut support = self.support("undo.addStop");
        support.add_edit(change);
        self.commit(support);
        Ok(())
    }

    pub fn delete_current_stop(&mut self) -> Result<(), SessionError> {
        let change = self.state.paths.delete_current_stop()?;
        let mut support = self.support("undo.deleteStop");
        support.add_edit(change);
        self.commit(support);
        Ok(())
    }

    pub fn set_current_path(&mut self, key: Option<&str>) -> Result<(), SessionError> {
        if let Some(stop) = self.state.paths.set_current_path(key)? {
            self.show_stop(&stop)?;
        }
        Ok(())
    }

    pub fn go_to_stop(&mut self, index: usize) -> Result<(), SessionError> {
        let stop = self.state.paths.go_to_stop(index)?;
        self.show_stop(&stop)
    }

    pub fn path_forward(&mut self) -> Result<(), SessionError> {
        let stop = self.state.paths.path_forward()?;
        self.show_stop(&stop)
    }

    pub fn path_backward(&mut self) -> Result<(), SessionError> {
        let stop = self.state.paths.path_backward()?;
        self.show_stop(&stop)
    }

    /// Navigate to a stop. Navigation is not an undoable edit.
    fn show_stop(&mut self, stop: &UserTreePathStop) -> Result<(), SessionError> {
        let node_id = match stop.target() {
            StopTarget::Model(model_id) => self
                .state
                .tree
                .node_for_model(model_id)
                .cloned()
                .ok_or_else(|| SessionError::ModelNotInTree(model_id.clone()))?,
            StopTarget::Node { node_id, .. } => node_id.clone(),
        };
        self.show_node(&node_id)?;
        if stop.owner().is_some() {
            self.state
                .overlay
                .set_full_overlay_state(&self.source, stop.display_state())?;
        }
        Ok(())
    }

    // ========================================================================
    // Group visibility
    // ========================================================================

    pub fn set_group_visibility(
        &mut self,
        model_id: &str,
        group: &str,
        visibility: GroupVisibility,
    ) {
        let change = self
            .state
            .group_settings
            .set_group_visibility(model_id, group, visibility);
        self.record_group_change(model_id, change);
    }

    pub fn set_all_visibilities(
        &mut self,
        model_id: &str,
        groups: &BTreeSet<String>,
        visibility: GroupVisibility,
    ) {
        let change = self
            .state
            .group_settings
            .set_all_visibilities(model_id, groups, visibility);
        self.record_group_change(model_id, change);
    }

    fn record_group_change(
        &mut self,
        model_id: &str,
        change: Option<GroupSettingChange>,
    ) {
        let mut support = self.support("undo.groupVisibility");
        support.add_edits(change);
        support.add_event(Event::GroupVisibilityChanged {
            model_id: model_id.to_string(),
        });
        self.commit(support);
    }

    // ========================================================================
    // Images
    // ========================================================================

    /// Queue an image file for loading on a worker thread.
    pub fn request_image_load(&self, path: PathBuf) -> LoadTicket {
        self.loader.request(path)
    }

    pub fn discard_image_load(&self, ticket: LoadTicket) -> bool {
        self.loader.discard(ticket)
    }

    /// Finish whatever background loads have arrived. Never blocks.
    pub fn poll_image_loads(&mut self) -> Vec<ImageLoadOutcome> {
        let ready = self.loader.drain_ready();
        ready.into_iter().map(|r| self.finish_image_load(r)).collect()
    }

    pub fn wait_for_image_loads(&mut self, timeout: Duration) -> Vec<ImageLoadOutcome> {
        let ready = self.loader.wait_all(timeout);
        ready.into_iter().map(|r| self.finish_image_load(r)).collect()
    }

    /// Load an image on the calling thread. Returns its key.
    ///
    /// A loaded image holds no usage of its own; it lives until a reload
    /// unless a group node refers to it.
    pub fn load_image(&mut self, path: &Path) -> Result<String, SessionError> {
        let loaded = ImageManager::load_image_from_file_start(path)?;
        Ok(self.store_loaded_image(loaded))
    }

    fn store_loaded_image(&mut self, loaded: LoadedImage) -> String {
        let path = loaded.path.clone();
        let (key, change) = self.state.images.store_image(loaded);
        let event = Event::ImageLoaded {
            key: key.clone(),
            path,
        };
        match change {
            Some(change) => {
                let mut support = self.support("undo.loadImage");
                support.add_edit(change);
                support.add_event(event);
                self.commit(support);
            }
            None => self.events.publish(event),
        }
        key
    }

    fn finish_image_load(&mut self, result: ImageLoadResult) -> ImageLoadOutcome {
        match result.result {
            Ok(loaded) => {
                let key = self.store_loaded_image(loaded);
                ImageLoadOutcome::Loaded {
                    path: result.path,
                    key,
                }
            }
            Err(e) => {
                tracing::warn!("Image load failed for {:?}: {}", result.path, e);
                let error = e.to_string();
                self.events.publish(Event::ImageLoadFailed {
                    path: result.path.clone(),
                    error: error.clone(),
                });
                ImageLoadOutcome::Failed {
                    path: result.path,
                    error,
                }
            }
        }
    }

    // ========================================================================
    // Undo / redo
    // ========================================================================

    pub fn undo(&mut self) -> Result<(), SessionError> {
        self.history.undo(&mut self.state)?;
        self.revalidate_selection();
        Ok(())
    }

    pub fn redo(&mut self) -> Result<(), SessionError> {
        self.history.redo(&mut self.state)?;
        self.revalidate_selection();
        Ok(())
    }

    // ========================================================================
    // Overlay controls enable state
    // ========================================================================

    /// Lock the overlay controls while a modal operation runs.
    pub fn push_overlay_controls_disabled(&mut self) -> bool {
        self.state.overlay.push_disabled()
    }

    pub fn pop_overlay_controls_disabled(&mut self) -> bool {
        self.state.overlay.pop_disabled()
    }

    pub fn xplat_tree(&self) -> XPlatModelTree {
        self.state.tree.xplat_tree(&self.source)
    }
}

/// Overlay owner shown when a node is selected.
fn owner_for(contents: &NavNodeContents) -> Option<OwnerKey> {
    match contents.kind {
        NavNodeKind::HIDDEN_ROOT | NavNodeKind::GROUP_NODE => None,
        NavNodeKind::DYNAMIC_SLIDER_INSTANCE => contents
            .proxy_id
            .as_deref()
            .map(|p| OwnerKey::Proxy(p.to_string())),
        _ => contents.model_id.as_deref().map(OwnerKey::for_model),
    }
}

#[cfg(test)]
mod tests;

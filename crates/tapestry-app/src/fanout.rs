//! Deletion fan-out.
//!
//! When a model, overlay, module or tree node goes away, every manager that
//! refers to it gets a chance to forget it. All resulting changes land in
//! one undoable edit, so a single undo puts everything back.

use super::*;
use tapestry_core::dynamic_id;

impl<S: ModelSource> NavigationSession<S> {
    /// Delete a tree node and its subtree, with everything that refers to them.
    pub fn delete_node(&mut self, id: &NavNodeId) -> Result<(), SessionError> {
        let mut support = self.support("undo.deleteNode");
        self.delete_subtree(id, &mut support)?;
        self.commit(support);
        Ok(())
    }

    /// The model layer deleted `model_id`.
    pub fn delete_model(&mut self, model_id: &str) -> Result<(), SessionError> {
        let mut support = self.support("undo.deleteModel");
        match self.state.tree.node_for_model(model_id).cloned() {
            Some(id) => self.delete_subtree(&id, &mut support)?,
            None => self.forget_model(model_id, &mut support)?,
        }
        self.commit(support);
        Ok(())
    }

    /// The model layer deleted modules. `removed` maps overlay key to the
    /// deleted module keys.
    pub fn delete_modules(
        &mut self,
        owner: &OwnerKey,
        removed: &BTreeMap<String, BTreeSet<String>>,
    ) {
        let mut support = self.support("undo.deleteModules");
        support.add_edits(self.state.overlay.cleanup_deleted_modules(owner, removed));
        for (overlay, modules) in removed {
            let edits = self
                .state
                .paths
                .drop_or_change_stops_on_modules(owner, overlay, modules);
            support.add_edits(edits.into_changes());
        }
        self.commit(support);
    }

    /// The model layer deleted an overlay.
    pub fn delete_overlay(&mut self, owner: &OwnerKey, overlay: &str) {
        let mut support = self.support("undo.deleteOverlay");
        support.add_edits(self.state.overlay.cleanup_deleted_overlay(owner, overlay));
        support.add_edits(
            self.state
                .paths
                .drop_stops_on_overlay(owner, overlay)
                .into_changes(),
        );
        self.commit(support);
    }

    /// Region groups of `model_id` changed; forget visibility settings for
    /// groups that no longer exist.
    pub fn drop_orphaned_groups(&mut self, model_id: &str, live_groups: &BTreeSet<String>) {
        let change = self
            .state
            .group_settings
            .drop_orphaned_visibilities(model_id, live_groups);
        if change.is_some() {
            self.record_group_change(model_id, change);
        }
    }

    fn delete_subtree(
        &mut self,
        id: &NavNodeId,
        support: &mut UndoSupport,
    ) -> Result<(), SessionError> {
        let doomed = self.subtree_contents(id);
        let parent = self.state.tree.parent(id).cloned();
        let (_, change) = self.state.tree.delete_node_and_children(id)?;
        support.add_edit(change);

        for (node_id, contents) in &doomed {
            match contents.kind {
                NavNodeKind::GROUP_NODE => {
                    support.add_edits(self.state.paths.drop_stops_on_node(node_id).into_changes());
                }
                NavNodeKind::DYNAMIC_SLIDER_INSTANCE => {
                    if let Some(proxy_id) = &contents.proxy_id {
                        self.forget_proxy(proxy_id, support)?;
                    }
                }
                _ => {}
            }
            if let Some(model_id) = &contents.model_id {
                self.forget_model(model_id, support)?;
            }
            for key in contents.image_keys() {
                if self.state.images.contains(&key) {
                    support.add_edit(self.state.images.drop_image_usage(&key)?);
                }
            }
        }

        if self
            .selected
            .as_ref()
            .is_some_and(|sel| doomed.iter().any(|(nid, _)| nid == sel))
        {
            self.selected = None;
            self.state.overlay.preload_for_owner(&self.source, None);
        }
        support.add_event(Event::TreeRefresh { select: parent });
        tracing::info!("Deleted {} tree nodes under {}", doomed.len(), id);
        Ok(())
    }

    fn forget_model(&mut self, model_id: &str, support: &mut UndoSupport) -> Result<(), SessionError> {
        support.add_edits(self.state.group_settings.drop_model(model_id));
        support.add_edits(self.state.paths.drop_stops_on_model(model_id).into_changes());
        support.add_edits(self.state.tree.drop_group_map_refs(Some(model_id), None)?);
        // Dynamic models share their proxy's overlays.
        if !dynamic_id::is_dynamic_model_id(model_id) {
            let owner = OwnerKey::Genome(model_id.to_string());
            support.add_edits(self.state.overlay.cleanup_deleted_owner(&owner));
        }
        Ok(())
    }

    fn forget_proxy(&mut self, proxy_id: &str, support: &mut UndoSupport) -> Result<(), SessionError> {
        let mut model_ids = vec![dynamic_id::sum_model_id(proxy_id)];
        if let Some(proxy) = self.source.dynamic_proxy(proxy_id) {
            model_ids.extend(proxy.proxied_keys());
        }
        for model_id in &model_ids {
            support.add_edits(self.state.group_settings.drop_model(model_id));
            support.add_edits(self.state.paths.drop_stops_on_model(model_id).into_changes());
        }
        support.add_edits(self.state.tree.drop_group_map_refs(None, Some(proxy_id))?);
        let owner = OwnerKey::Proxy(proxy_id.to_string());
        support.add_edits(self.state.overlay.cleanup_deleted_owner(&owner));
        Ok(())
    }

    /// Node IDs and contents of a subtree, parents first.
    fn subtree_contents(&self, id: &NavNodeId) -> Vec<(NavNodeId, NavNodeContents)> {
        let mut out = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(next) = stack.pop() {
            if let Some(contents) = self.state.tree.contents(&next) {
                out.push((next.clone(), contents.clone()));
            }
            stack.extend(self.state.tree.children(&next).iter().rev().cloned());
        }
        out
    }
}

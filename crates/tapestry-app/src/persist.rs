use super::*;
use anyhow::Context;
use tapestry_storage::{DocumentRef, NavigationDocument};

impl<S: ModelSource> NavigationSession<S> {
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let doc = DocumentRef {
            tree: &self.state.tree,
            paths: self.state.paths.manager(),
            images: &self.state.images,
            group_settings: &self.state.group_settings,
        };
        tapestry_storage::save_document(path, doc, self.settings.indent_xml)
            .with_context(|| format!("Failed to save navigation state to {}", path.display()))
    }

    pub fn load(&mut self, path: &Path) -> anyhow::Result<()> {
        let doc = tapestry_storage::load_document(path)
            .with_context(|| format!("Failed to load navigation state from {}", path.display()))?;
        self.install_document(doc)
            .with_context(|| format!("Failed to install navigation state from {}", path.display()))
    }

    /// Replace all navigation state. Undo history and pending image loads
    /// are discarded.
    pub fn install_document(&mut self, doc: NavigationDocument) -> anyhow::Result<()> {
        self.loader.reset();
        self.history.clear();
        self.selected = None;

        self.state.tree = doc.tree;
        self.state.paths.install_manager(doc.paths);
        self.state.group_settings = doc.group_settings;
        self.state.images = doc.images;
        self.rebuild_image_counts();
        self.state.overlay.reset();

        let select = self.state.tree.default_selection();
        self.events.publish(Event::TreeRefresh {
            select: select.clone(),
        });
        if let Some(id) = select {
            self.select_node(&id)?;
        }
        Ok(())
    }

    /// Start over with an empty tree.
    pub fn reset(&mut self) {
        let doc = NavigationDocument::default();
        self.loader.reset();
        self.history.clear();
        self.selected = None;
        self.state.tree = doc.tree;
        self.state.paths.install_manager(doc.paths);
        self.state.group_settings = doc.group_settings;
        self.state.images = doc.images;
        self.state.overlay.reset();
        self.events.publish(Event::TreeRefresh { select: None });
    }

    /// Loaded images arrive with no usages. Count one per group node
    /// reference and evict whatever nothing uses.
    fn rebuild_image_counts(&mut self) {
        for key in self.state.tree.image_keys() {
            if let Err(e) = self.state.images.register_image_usage(&key) {
                tracing::warn!("Group node refers to missing image {}: {}", key, e);
            }
        }
        let purged = self.state.images.purge_unused();
        if !purged.is_empty() {
            tracing::info!("Dropped {} unused images on load", purged.len());
        }
    }

    /// Problems with the current state, one line each. Empty when clean.
    pub fn check(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let tree = &self.state.tree;
        if let Err(e) = tree.check_consistency() {
            problems.push(format!("Tree: {e}"));
        }

        for path in self.state.paths.manager().paths() {
            for (i, stop) in path.stops().iter().enumerate() {
                let missing = match stop.target() {
                    StopTarget::Model(model_id) => {
                        tree.node_for_model(model_id).is_none()
                            && self.source.genome(model_id).is_none()
                    }
                    StopTarget::Node { node_id, .. } => tree.node(node_id).is_none(),
                };
                if missing {
                    problems.push(format!(
                        "Path '{}' stop {} points at something that no longer exists",
                        path.name(),
                        i + 1
                    ));
                }
            }
        }

        for key in tree.image_keys() {
            if !self.state.images.contains(&key) {
                problems.push(format!("Group node image {key} is missing"));
            }
        }

        let mut references: BTreeMap<String, usize> = BTreeMap::new();
        for key in tree.image_keys() {
            *references.entry(key).or_default() += 1;
        }
        for key in self.state.images.keys() {
            let used = references.get(&key).copied().unwrap_or(0);
            let count = self.state.images.count(&key);
            // Zero usages with no references is a load nothing has used yet.
            if count != used && count > 0 {
                problems.push(format!(
                    "Image {key} has {count} usages but {used} group node references"
                ));
            }
        }

        let models: BTreeSet<String> = tree.model_ids().into_iter().collect();
        for settings in self.state.group_settings.all() {
            if !models.contains(&settings.model_id) {
                problems.push(format!(
                    "Group settings for {} refer to a model not in the tree",
                    settings.model_id
                ));
            }
        }
        problems
    }
}

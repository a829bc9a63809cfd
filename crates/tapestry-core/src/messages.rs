use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// User-facing strings, keyed the way the resource bundle is keyed.
///
/// Placeholders are written `{0}`, `{1}`, ...
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Messages {
    strings: HashMap<String, String>,
}

const DEFAULTS: &[(&str, &str)] = &[
    ("treePath.defaultName", "Path {0}"),
    ("treePath.noStop", "No stop selected"),
    ("treePath.stopCount", "Stop {0} of {1}"),
    ("navTree.newGroupNode", "New Group"),
    ("navTree.copyOf", "Copy of {0}"),
    ("undo.addNode", "Add Tree Node"),
    ("undo.deleteNode", "Delete Tree Node"),
    ("undo.moveNode", "Move Tree Node"),
    ("undo.renameNode", "Rename Tree Node"),
    ("undo.groupImages", "Set Group Node Images"),
    ("undo.groupMap", "Set Group Node Map"),
    ("undo.changeProxy", "Change Dynamic Display"),
    ("undo.overlay", "Change Overlay Display"),
    ("undo.createPath", "Create Path"),
    ("undo.deletePath", "Delete Path"),
    ("undo.renamePath", "Rename Path"),
    ("undo.movePath", "Move Path"),
    ("undo.addStop", "Add Path Stop"),
    ("undo.deleteStop", "Delete Path Stop"),
    ("undo.groupVisibility", "Change Group Visibility"),
    ("undo.deleteModel", "Delete Model"),
    ("undo.deleteModules", "Delete Modules"),
    ("undo.deleteOverlay", "Delete Overlay"),
    ("undo.loadImage", "Load Image"),
];

impl Default for Messages {
    fn default() -> Self {
        Self {
            strings: DEFAULTS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl Messages {
    /// Missing keys come back as the key itself so a gap is visible rather than fatal.
    pub fn get(&self, key: &str) -> String {
        self.strings
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }

    pub fn format(&self, key: &str, args: &[&str]) -> String {
        let mut text = self.get(key);
        for (i, arg) in args.iter().enumerate() {
            text = text.replace(&format!("{{{i}}}"), arg);
        }
        text
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.strings.insert(key.into(), value.into());
    }
}

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-session knobs, read from a JSON file. Missing fields take defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Edits kept on the undo stack.
    pub undo_depth: usize,
    /// Word used when naming new paths ("Path 1", "Path 2", ...).
    pub path_name_prefix: String,
    pub indent_xml: bool,
    pub image_workers: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            undo_depth: 100,
            path_name_prefix: "Path".to_string(),
            indent_xml: true,
            image_workers: 2,
        }
    }
}

impl SessionSettings {
    /// Read settings from `path`, falling back to defaults when the file is
    /// absent or unreadable.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            tracing::info!("Settings file {:?} not found, using defaults", path);
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => {
                    tracing::info!("Settings loaded: {:?}", settings);
                    settings
                }
                Err(e) => {
                    tracing::error!("Failed to parse settings: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::error!("Failed to read settings file: {}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

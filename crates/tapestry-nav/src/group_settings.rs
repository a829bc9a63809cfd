use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tapestry_core::EnumConversionError;

/// How a region group is drawn in one model instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum GroupVisibility {
    None,
    Inactive,
    #[default]
    Active,
}

impl GroupVisibility {
    pub fn as_tag(&self) -> &'static str {
        match self {
            GroupVisibility::None => "none",
            GroupVisibility::Inactive => "inactive",
            GroupVisibility::Active => "active",
        }
    }
}

impl TryFrom<&str> for GroupVisibility {
    type Error = EnumConversionError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "none" => Ok(GroupVisibility::None),
            "inactive" => Ok(GroupVisibility::Inactive),
            "active" => Ok(GroupVisibility::Active),
            _ => Err(EnumConversionError::InvalidGroupVisibility(value.to_string())),
        }
    }
}

/// Group visibilities set for one model instance. Unset groups are active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSettings {
    pub model_id: String,
    pub visibilities: BTreeMap<String, GroupVisibility>,
}

impl GroupSettings {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            visibilities: BTreeMap::new(),
        }
    }

    pub fn visibility(&self, group: &str) -> GroupVisibility {
        self.visibilities.get(group).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSettingChange {
    pub model_id: String,
    pub before: Option<GroupSettings>,
    pub after: Option<GroupSettings>,
}

#[derive(Debug, Clone, Default)]
pub struct GroupSettingManager {
    settings: HashMap<String, GroupSettings>,
}

impl GroupSettingManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.settings.clear();
    }

    pub fn settings(&self, model_id: &str) -> Option<&GroupSettings> {
        self.settings.get(model_id)
    }

    /// Every model's settings, sorted by model ID.
    pub fn all(&self) -> Vec<&GroupSettings> {
        let mut all: Vec<&GroupSettings> = self.settings.values().collect();
        all.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        all
    }

    /// Install settings read from a file.
    pub fn install_settings(&mut self, settings: GroupSettings) {
        self.settings.insert(settings.model_id.clone(), settings);
    }

    pub fn visibility(&self, model_id: &str, group: &str) -> GroupVisibility {
        self.settings
            .get(model_id)
            .map(|s| s.visibility(group))
            .unwrap_or_default()
    }

    /// Edit a copy of one model's settings; `None` when the edit changed nothing.
    fn edit<F>(&mut self, model_id: &str, edit: F) -> Option<GroupSettingChange>
    where
        F: FnOnce(&mut GroupSettings),
    {
        let before = self.settings.get(model_id).cloned();
        let mut after = before.clone().unwrap_or_else(|| GroupSettings::new(model_id));
        edit(&mut after);
        let after = (!after.visibilities.is_empty()).then_some(after);
        if after == before {
            return None;
        }
        self.install(model_id, after.as_ref());
        Some(GroupSettingChange {
            model_id: model_id.to_string(),
            before,
            after,
        })
    }

    fn install(&mut self, model_id: &str, settings: Option<&GroupSettings>) {
        match settings {
            Some(s) => {
                self.settings.insert(model_id.to_string(), s.clone());
            }
            None => {
                self.settings.remove(model_id);
            }
        }
    }

    pub fn set_group_visibility(
        &mut self,
        model_id: &str,
        group: &str,
        visibility: GroupVisibility,
    ) -> Option<GroupSettingChange> {
        self.edit(model_id, |s| {
            s.visibilities.insert(group.to_string(), visibility);
        })
    }

    pub fn set_all_visibilities(
        &mut self,
        model_id: &str,
        groups: &BTreeSet<String>,
        visibility: GroupVisibility,
    ) -> Option<GroupSettingChange> {
        self.edit(model_id, |s| {
            for group in groups {
                s.visibilities.insert(group.clone(), visibility);
            }
        })
    }

    /// Forget settings for groups not in `live_groups`.
    pub fn drop_orphaned_visibilities(
        &mut self,
        model_id: &str,
        live_groups: &BTreeSet<String>,
    ) -> Option<GroupSettingChange> {
        self.settings.get(model_id)?;
        let change = self.edit(model_id, |s| {
            s.visibilities.retain(|group, _| live_groups.contains(group));
        });
        if let Some(change) = &change {
            tracing::debug!("Dropped orphaned group settings for {}", change.model_id);
        }
        change
    }

    /// Forget everything about a deleted model.
    pub fn drop_model(&mut self, model_id: &str) -> Option<GroupSettingChange> {
        let before = self.settings.remove(model_id)?;
        Some(GroupSettingChange {
            model_id: model_id.to_string(),
            before: Some(before),
            after: None,
        })
    }

    pub fn change_undo(&mut self, change: &GroupSettingChange) {
        self.install(&change.model_id, change.before.as_ref());
    }

    pub fn change_redo(&mut self, change: &GroupSettingChange) {
        self.install(&change.model_id, change.after.as_ref());
    }
}

use super::*;
use tapestry_nav::{GroupSettings, GroupVisibility};

pub(super) const TAG: &str = "groupSettings";
const SETTING_TAG: &str = "groupSetting";
const VIS_TAG: &str = "groupVis";

pub(super) fn write_group_settings(w: &mut XmlWriter, manager: &GroupSettingManager) {
    w.open(TAG, Attrs::new());
    for settings in manager.all() {
        w.open(SETTING_TAG, Attrs::new().with("model", &settings.model_id));
        for (group, vis) in &settings.visibilities {
            w.leaf(
                VIS_TAG,
                Attrs::new().with("group", group).with("vis", vis.as_tag()),
            );
        }
        w.close(SETTING_TAG);
    }
    w.close(TAG);
}

pub(super) fn read_group_settings(
    section: Node<'_, '_>,
) -> Result<GroupSettingManager, StorageError> {
    let mut manager = GroupSettingManager::new();
    for node in child_elements(section, SETTING_TAG) {
        let mut settings = GroupSettings::new(required(node, "model")?);
        for vis_node in child_elements(node, VIS_TAG) {
            let vis = GroupVisibility::try_from(required(vis_node, "vis")?)?;
            settings
                .visibilities
                .insert(required(vis_node, "group")?.to_string(), vis);
        }
        if !settings.visibilities.is_empty() {
            manager.install_settings(settings);
        }
    }
    Ok(manager)
}

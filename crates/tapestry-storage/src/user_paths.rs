use super::*;
use std::collections::BTreeSet;
use tapestry_core::{NavNodeId, NavNodeKind};
use tapestry_nav::{StopTarget, UserTreePath, UserTreePathStop};

pub(super) const TAG: &str = "userTreePaths";
const PATH_TAG: &str = "userTreePath";
const STOP_TAG: &str = "pathStop";
const MODULES_TAG: &str = "stopMods";
const REVEALED_TAG: &str = "stopViz";
const MODULE_TAG: &str = "mod";

pub(super) fn write_user_paths(w: &mut XmlWriter, paths: &UserTreePathManager) {
    w.open(TAG, Attrs::new());
    for path in paths.paths() {
        let attrs = Attrs::new().with("name", path.name()).with("id", path.id());
        if path.is_empty() {
            w.leaf(PATH_TAG, attrs);
            continue;
        }
        w.open(PATH_TAG, attrs);
        for stop in path.stops() {
            write_stop(w, stop);
        }
        w.close(PATH_TAG);
    }
    w.close(TAG);
}

fn write_stop(w: &mut XmlWriter, stop: &UserTreePathStop) {
    let attrs = match stop.target() {
        StopTarget::Model(model_id) => Attrs::new().with("genome", model_id),
        StopTarget::Node { node_id, kind } => Attrs::new()
            .with("nodeID", node_id.as_str())
            .with("nodeType", kind.as_tag()),
    }
    .with_opt("ovr", stop.overlay());

    if stop.modules().is_empty() {
        w.leaf(STOP_TAG, attrs);
        return;
    }
    w.open(STOP_TAG, attrs);
    write_module_set(w, MODULES_TAG, stop.modules());
    if !stop.revealed().is_empty() {
        write_module_set(w, REVEALED_TAG, stop.revealed());
    }
    w.close(STOP_TAG);
}

fn write_module_set(w: &mut XmlWriter, tag: &str, modules: &BTreeSet<String>) {
    w.open(tag, Attrs::new());
    for module in modules {
        w.leaf(MODULE_TAG, Attrs::new().with("id", module));
    }
    w.close(tag);
}

pub(super) fn read_user_paths(section: Node<'_, '_>) -> Result<UserTreePathManager, StorageError> {
    let mut manager = UserTreePathManager::new();
    for path_node in child_elements(section, PATH_TAG) {
        let stops = child_elements(path_node, STOP_TAG)
            .map(read_stop)
            .collect::<Result<Vec<_>, _>>()?;
        let path = UserTreePath::new(required(path_node, "id")?, required(path_node, "name")?)
            .with_stops(stops);
        manager.add_existing_path(path)?;
    }
    Ok(manager)
}

fn read_stop(node: Node<'_, '_>) -> Result<UserTreePathStop, StorageError> {
    let target = match node.attribute("genome") {
        Some(model_id) => StopTarget::Model(model_id.to_string()),
        None => {
            let node_id = node
                .attribute("nodeID")
                .ok_or_else(|| StorageError::MissingAttribute {
                    element: STOP_TAG.to_string(),
                    attribute: "genome",
                })?;
            StopTarget::Node {
                node_id: NavNodeId::new(node_id),
                kind: NavNodeKind::try_from(required(node, "nodeType")?)?,
            }
        }
    };
    Ok(UserTreePathStop::new(
        target,
        optional(node, "ovr"),
        read_module_set(node, MODULES_TAG)?,
        read_module_set(node, REVEALED_TAG)?,
    ))
}

fn read_module_set(stop: Node<'_, '_>, tag: &'static str) -> Result<BTreeSet<String>, StorageError> {
    let Some(set) = first_child(stop, tag) else {
        return Ok(BTreeSet::new());
    };
    child_elements(set, MODULE_TAG)
        .map(|m| required(m, "id").map(str::to_string))
        .collect()
}

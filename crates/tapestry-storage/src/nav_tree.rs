use super::*;
use tapestry_core::{NavNodeId, NavNodeKind};
use tapestry_nav::{ColorKey, GroupNodeEntry, GroupNodeMapEntry, NavNodeContents, NavNodeRecord};

pub(super) const TAG: &str = "navTree";
const NODE_TAG: &str = "navTreeNode";
const GROUP_ENTRY_TAG: &str = "grpNodeEntry";
const MAP_ENTRY_TAG: &str = "grpNodeMapEntry";

/// Nodes are written flat in preorder, each naming its parent.
pub(super) fn write_nav_tree(w: &mut XmlWriter, tree: &NavTree) {
    w.open(TAG, Attrs::new());
    for record in tree.records() {
        let contents = &record.contents;
        let attrs = Attrs::new()
            .with("type", contents.kind.as_tag())
            .with_opt("name", contents.name.as_deref())
            .with_opt("modelID", contents.model_id.as_deref())
            .with_opt("proxyID", contents.proxy_id.as_deref())
            .with("nodeID", record.node_id.as_str())
            .with_opt("parNodeID", record.parent_id.as_ref().map(NavNodeId::as_str));

        match &contents.group_entry {
            Some(entry) => {
                w.open(NODE_TAG, attrs);
                write_group_entry(w, entry);
                w.close(NODE_TAG);
            }
            None => w.leaf(NODE_TAG, attrs),
        }
    }
    w.close(TAG);
}

fn write_group_entry(w: &mut XmlWriter, entry: &GroupNodeEntry) {
    let attrs = Attrs::new()
        .with_opt("image", entry.image_id.as_deref())
        .with_opt("mapImage", entry.map_image_id.as_deref());
    if entry.model_map.is_empty() {
        w.leaf(GROUP_ENTRY_TAG, attrs);
        return;
    }
    w.open(GROUP_ENTRY_TAG, attrs);
    for (color, target) in &entry.model_map {
        w.leaf(
            MAP_ENTRY_TAG,
            Attrs::new()
                .with("r", color.r)
                .with("g", color.g)
                .with("b", color.b)
                .with_opt("tabID", target.tab_id.as_deref())
                .with_opt("modelID", target.model_id.as_deref())
                .with_opt("proxyID", target.proxy_id.as_deref())
                .with_opt("time", target.proxy_time)
                .with_opt("regionID", target.region_id.as_deref()),
        );
    }
    w.close(GROUP_ENTRY_TAG);
}

pub(super) fn read_nav_tree(section: Node<'_, '_>) -> Result<NavTree, StorageError> {
    let records = child_elements(section, NODE_TAG)
        .map(read_node)
        .collect::<Result<Vec<_>, _>>()?;
    if records.is_empty() {
        return Ok(NavTree::new());
    }
    Ok(NavTree::from_records(records)?)
}

fn read_node(node: Node<'_, '_>) -> Result<NavNodeRecord, StorageError> {
    let kind = NavNodeKind::try_from(required(node, "type")?)?;
    let group_entry = first_child(node, GROUP_ENTRY_TAG)
        .map(read_group_entry)
        .transpose()?;
    Ok(NavNodeRecord {
        node_id: NavNodeId::new(required(node, "nodeID")?),
        parent_id: node.attribute("parNodeID").map(NavNodeId::new),
        contents: NavNodeContents {
            kind,
            name: optional(node, "name"),
            model_id: optional(node, "modelID"),
            proxy_id: optional(node, "proxyID"),
            group_entry,
        },
    })
}

fn read_group_entry(node: Node<'_, '_>) -> Result<GroupNodeEntry, StorageError> {
    let mut entry = GroupNodeEntry {
        image_id: optional(node, "image"),
        map_image_id: optional(node, "mapImage"),
        ..Default::default()
    };
    for map_node in child_elements(node, MAP_ENTRY_TAG) {
        let color = ColorKey::new(
            parse_required(map_node, "r")?,
            parse_required(map_node, "g")?,
            parse_required(map_node, "b")?,
        );
        let target = GroupNodeMapEntry {
            tab_id: optional(map_node, "tabID"),
            model_id: optional(map_node, "modelID"),
            proxy_id: optional(map_node, "proxyID"),
            proxy_time: parse_optional(map_node, "time")?,
            region_id: optional(map_node, "regionID"),
        };
        entry.model_map.insert(color, target);
    }
    Ok(entry)
}

use super::*;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use tapestry_core::{NavNodeId, NavNodeKind};
use tapestry_nav::{
    ColorKey, GroupNodeMapEntry, GroupVisibility, ImageEntry, NewNode, StopTarget, UserTreePath,
    UserTreePathStop,
};

fn png_bytes(shade: u8) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(3, 2, image::Rgb([shade, 0, 255 - shade]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

struct Saved {
    doc: NavigationDocument,
    group: NavNodeId,
    image_key: String,
}

fn sample() -> Result<Saved, StorageError> {
    let mut doc = NavigationDocument::default();
    let (root, _) = doc.tree.add_node(NewNode::root_model("root"))?;
    let (inst, _) = doc
        .tree
        .add_node(NewNode::instance(NavNodeKind::ROOT_INSTANCE, "A", &root))?;
    let (group, _) = doc
        .tree
        .add_node(NewNode::group("Early & \"late\"", &inst))?;
    doc.tree.add_node(NewNode::instance(
        NavNodeKind::STATIC_CHILD_INSTANCE,
        "A1",
        &group,
    ))?;
    doc.tree.add_node(NewNode::slider("px2", &inst))?;

    let (image_key, _) = doc.images.add_entry(ImageEntry::from_bytes(&png_bytes(40))?);
    doc.images.register_image_usage(&image_key)?;
    doc.tree
        .set_group_node_images(&group, Some(image_key.clone()), None)?;
    let mut map = BTreeMap::new();
    map.insert(ColorKey::new(255, 0, 10), GroupNodeMapEntry::for_model("A1"));
    map.insert(
        ColorKey::new(0, 128, 0),
        GroupNodeMapEntry {
            proxy_id: Some("px2".to_string()),
            proxy_time: Some(12),
            region_id: Some("r7".to_string()),
            ..Default::default()
        },
    );
    doc.tree.set_group_model_map(&group, map)?;

    let stops = vec![
        UserTreePathStop::new(
            StopTarget::Model("A".to_string()),
            Some("ov1".to_string()),
            set(&["m1", "m2"]),
            set(&["m2"]),
        ),
        UserTreePathStop::for_node(group.clone(), NavNodeKind::GROUP_NODE),
    ];
    doc.paths
        .add_existing_path(UserTreePath::new("0", "Tour <one>").with_stops(stops))?;
    doc.paths.add_existing_path(UserTreePath::new("1", "Empty"))?;

    doc.group_settings
        .set_group_visibility("A", "g1", GroupVisibility::Inactive);
    doc.group_settings
        .set_group_visibility("A", "g2", GroupVisibility::None);

    Ok(Saved {
        doc,
        group,
        image_key,
    })
}

#[test]
fn test_document_round_trip() -> Result<(), StorageError> {
    let saved = sample()?;
    let text = write_document((&saved.doc).into(), true);
    let loaded = read_document(&text)?;

    assert_eq!(loaded.tree.records(), saved.doc.tree.records());
    assert_eq!(loaded.tree.check_consistency(), Ok(()));
    assert_eq!(loaded.tree.node_for_model("A1"), saved.doc.tree.node_for_model("A1"));

    let paths: Vec<_> = loaded.paths.paths().cloned().collect();
    let expected: Vec<_> = saved.doc.paths.paths().cloned().collect();
    assert_eq!(paths, expected);

    assert_eq!(
        loaded.group_settings.visibility("A", "g1"),
        GroupVisibility::Inactive
    );
    assert_eq!(loaded.group_settings.visibility("A", "g2"), GroupVisibility::None);
    assert_eq!(loaded.group_settings.visibility("A", "g3"), GroupVisibility::Active);
    Ok(())
}

#[test]
fn test_images_round_trip_byte_identical() -> Result<(), StorageError> {
    let saved = sample()?;
    let text = write_document((&saved.doc).into(), false);
    let loaded = read_document(&text)?;

    let key = &saved.image_key;
    assert_eq!(loaded.images.keys(), vec![key.clone()]);
    assert_eq!(loaded.images.type_tag(key), Some("png"));
    assert_eq!(loaded.images.entry(key).unwrap().bytes()?, png_bytes(40));
    // Counts are rebuilt by the caller after load.
    assert_eq!(loaded.images.count(key), 0);

    let contents = loaded.tree.contents(&saved.group).unwrap();
    let entry = contents.group_entry.as_ref().unwrap();
    assert_eq!(entry.image_id.as_deref(), Some(key.as_str()));
    assert_eq!(entry.model_map.len(), 2);
    assert_eq!(
        entry.model_map[&ColorKey::new(0, 128, 0)].proxy_time,
        Some(12)
    );
    Ok(())
}

#[test]
fn test_loaded_labellers_do_not_reissue_keys() -> Result<(), StorageError> {
    let saved = sample()?;
    let mut loaded = read_document(&write_document((&saved.doc).into(), true))?;

    let (path_key, _) = loaded.paths.add_path("Another", None)?;
    assert!(path_key != "0" && path_key != "1");

    let (image_key, _) = loaded
        .images
        .add_entry(ImageEntry::from_bytes(&png_bytes(200))?);
    assert_ne!(image_key, saved.image_key);
    Ok(())
}

#[test]
fn test_save_and_load_file() -> Result<(), StorageError> {
    let saved = sample()?;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.xml");
    save_document(&path, (&saved.doc).into(), true)?;

    let loaded = load_document(&path)?;
    assert_eq!(loaded.tree.len(), saved.doc.tree.len());
    assert_eq!(loaded.paths.len(), 2);
    Ok(())
}

#[test]
fn test_missing_sections_load_empty() -> Result<(), StorageError> {
    let doc = read_document("<navigationState/>")?;
    assert!(doc.tree.is_empty());
    assert!(doc.paths.is_empty());
    assert!(doc.images.is_empty());
    assert!(doc.group_settings.all().is_empty());
    Ok(())
}

#[test]
fn test_empty_tree_round_trip() -> Result<(), StorageError> {
    let doc = NavigationDocument::default();
    let loaded = read_document(&write_document((&doc).into(), true))?;
    assert_eq!(loaded.tree.records(), doc.tree.records());
    Ok(())
}

#[test]
fn test_wrong_root_element() {
    let err = read_document("<somethingElse/>").unwrap_err();
    assert!(matches!(
        err,
        StorageError::UnexpectedElement { expected: ROOT_TAG, .. }
    ));
}

#[test]
fn test_missing_attribute_is_reported() {
    let text = r#"<navigationState>
        <userTreePaths><userTreePath id="0"/></userTreePaths>
    </navigationState>"#;
    let err = read_document(text).unwrap_err();
    match err {
        StorageError::MissingAttribute { element, attribute } => {
            assert_eq!(element, "userTreePath");
            assert_eq!(attribute, "name");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_bad_color_and_kind_are_rejected() {
    let bad_color = r#"<navigationState><navTree>
        <navTreeNode type="hiddenRoot" nodeID="0"/>
        <navTreeNode type="groupNode" name="G" nodeID="1" parNodeID="0">
          <grpNodeEntry><grpNodeMapEntry r="300" g="0" b="0"/></grpNodeEntry>
        </navTreeNode>
    </navTree></navigationState>"#;
    assert!(matches!(
        read_document(bad_color),
        Err(StorageError::InvalidAttribute { attribute: "r", .. })
    ));

    let bad_kind = r#"<navigationState><navTree>
        <navTreeNode type="mystery" nodeID="0"/>
    </navTree></navigationState>"#;
    assert!(matches!(
        read_document(bad_kind),
        Err(StorageError::EnumConversion(_))
    ));
}

#[test]
fn test_stop_without_target_is_rejected() {
    let text = r#"<navigationState><userTreePaths>
        <userTreePath name="P" id="0"><pathStop ovr="x"/></userTreePath>
    </userTreePaths></navigationState>"#;
    assert!(matches!(
        read_document(text),
        Err(StorageError::MissingAttribute { attribute: "genome", .. })
    ));
}

#[test]
fn test_corrupt_image_data_is_rejected() {
    let text = r#"<navigationState><images>
        <image name="img0" type="png">***not base64***</image>
    </images></navigationState>"#;
    assert!(matches!(read_document(text), Err(StorageError::Image(_))));
}

#[test]
fn test_duplicate_keys_are_rejected() {
    let images = r#"<navigationState><images>
        <image name="img0" type="png">AAAA</image>
        <image name="img0" type="png">BBBB</image>
    </images></navigationState>"#;
    assert!(matches!(read_document(images), Err(StorageError::Label(_))));

    let paths = r#"<navigationState><userTreePaths>
        <userTreePath name="P" id="3"/>
        <userTreePath name="Q" id="3"/>
    </userTreePaths></navigationState>"#;
    assert!(matches!(read_document(paths), Err(StorageError::Path(_))));
}

#[test]
fn test_escaping() {
    assert_eq!(
        writer::escape(r#"a<b & "c" 'd'>"#),
        "a&lt;b &amp; &quot;c&quot; &apos;d&apos;&gt;"
    );
}

use super::*;
use tapestry_core::{GenomeInfo, ModuleInfo, OverlayInfo, OverlayMode};

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn genome(id: &str) -> GenomeInfo {
    GenomeInfo {
        id: id.to_string(),
        name: format!("Model {id}"),
        image_key: None,
    }
}

fn module(key: &str, shown: bool) -> ModuleInfo {
    ModuleInfo {
        key: key.to_string(),
        name: key.to_uppercase(),
        first_view_shown: shown,
        first_view_revealed: false,
    }
}

fn source() -> InMemoryModelSource {
    let mut source = InMemoryModelSource::new();
    for id in ["root", "A", "A1", "B"] {
        source.add_genome(genome(id));
    }
    source.add_overlay(
        OwnerKey::Genome("A".to_string()),
        OverlayInfo {
            key: "ov1".to_string(),
            name: "Territories".to_string(),
            mode: OverlayMode::Opaque,
            modules: vec![module("m1", true), module("m2", false)],
            first_view: true,
        },
    );
    source
}

struct Fixture {
    session: NavigationSession,
    a: NavNodeId,
    group: NavNodeId,
    a1: NavNodeId,
    b: NavNodeId,
}

/// root -> { A -> G -> A1, B }
fn fixture_with(settings: SessionSettings) -> Fixture {
    let mut session = NavigationSession::new(source(), settings);
    let root = session.add_node(NewNode::root_model("root")).unwrap();
    let a = session
        .add_node(NewNode::instance(NavNodeKind::ROOT_INSTANCE, "A", &root))
        .unwrap();
    let group = session.add_node(NewNode::group("Early", &a)).unwrap();
    let a1 = session
        .add_node(NewNode::instance(
            NavNodeKind::STATIC_CHILD_INSTANCE,
            "A1",
            &group,
        ))
        .unwrap();
    let b = session
        .add_node(NewNode::instance(NavNodeKind::ROOT_INSTANCE, "B", &root))
        .unwrap();
    session.events().drain();
    Fixture {
        session,
        a,
        group,
        a1,
        b,
    }
}

fn fixture() -> Fixture {
    fixture_with(SessionSettings::default())
}

fn write_png(dir: &Path, name: &str, shade: u8) -> PathBuf {
    let path = dir.join(name);
    image::RgbImage::from_pixel(2, 2, image::Rgb([shade, 0, 0]))
        .save(&path)
        .unwrap();
    path
}

#[test]
fn test_selecting_a_model_shows_its_first_view_overlay() {
    let mut f = fixture();
    f.session.select_node(&f.a).unwrap();
    assert_eq!(f.session.overlay().current_overlay(), Some("ov1"));
    assert_eq!(f.session.overlay().current_modules(), &set(&["m1"]));

    f.session.select_node(&f.group).unwrap();
    assert_eq!(f.session.overlay().owner(), None);
    assert_eq!(f.session.overlay().current_overlay(), None);

    // Coming back restores what was last shown, not the first view.
    f.session.select_node(&f.a).unwrap();
    f.session.add_to_current_modules("m2").unwrap();
    f.session.select_node(&f.b).unwrap();
    f.session.select_node(&f.a).unwrap();
    assert_eq!(f.session.overlay().current_modules(), &set(&["m1", "m2"]));
}

#[test]
fn test_overlay_edits_undo() {
    let mut f = fixture();
    f.session.select_node(&f.a).unwrap();
    f.session.toggle_mod_content_display("m1").unwrap();
    assert_eq!(f.session.overlay().revealed_modules(), &set(&["m1"]));

    f.session.undo().unwrap();
    assert!(f.session.overlay().revealed_modules().is_empty());
    f.session.redo().unwrap();
    assert_eq!(f.session.overlay().revealed_modules(), &set(&["m1"]));

    assert!(matches!(
        f.session.toggle_mod_content_display("m2"),
        Err(SessionError::Overlay(OverlayError::ModuleNotShown(_)))
    ));
}

#[test]
fn test_startup_selection_defaults_to_last_child_of_first_instance() {
    let mut f = fixture();
    let selected = f.session.select_startup(None).unwrap();
    assert_eq!(selected, Some(f.group.clone()));

    let selected = f.session.select_startup(Some("B")).unwrap();
    assert_eq!(selected, Some(f.b.clone()));
}

#[test]
fn test_tree_edits_undo_in_order() {
    let mut f = fixture();
    let before = f.session.tree().records();

    f.session
        .rename_node(&f.group, Some("Late".to_string()))
        .unwrap();
    assert!(f.session.shift_node(&f.b, true).unwrap());
    assert!(!f.session.shift_node(&f.b, true).unwrap());

    f.session.undo().unwrap();
    f.session.undo().unwrap();
    assert_eq!(f.session.tree().records(), before);
    assert_eq!(
        f.session.history().redo_description().as_deref(),
        Some("Rename Tree Node")
    );
}

#[test]
fn test_delete_node_fans_out_and_undoes_as_one_step() {
    let mut f = fixture();
    f.session
        .set_group_visibility("A1", "g1", GroupVisibility::Inactive);

    let path = f.session.create_path(None).unwrap();
    f.session.select_node(&f.a1).unwrap();
    f.session.add_stop().unwrap();
    f.session.select_node(&f.group).unwrap();
    f.session.add_stop().unwrap();
    f.session.select_node(&f.b).unwrap();
    f.session.add_stop().unwrap();
    let path_before = f.session.paths().manager().path(&path).cloned();
    let undo_depth = f.session.history().undo_len();

    f.session.delete_node(&f.group).unwrap();
    assert!(f.session.tree().node_for_model("A1").is_none());
    assert!(f.session.group_settings().settings("A1").is_none());
    let remaining = f.session.paths().manager().path(&path).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining.stops()[0].model_id(), Some("B"));
    assert_eq!(f.session.history().undo_len(), undo_depth + 1);

    f.session.undo().unwrap();
    assert_eq!(f.session.tree().node_for_model("A1"), Some(&f.a1));
    assert_eq!(
        f.session.group_settings().visibility("A1", "g1"),
        GroupVisibility::Inactive
    );
    assert_eq!(f.session.paths().manager().path(&path).cloned(), path_before);
    assert_eq!(f.session.tree().check_consistency(), Ok(()));
}

#[test]
fn test_deleting_selected_node_clears_selection() {
    let mut f = fixture();
    f.session.select_node(&f.a1).unwrap();
    f.session.delete_node(&f.group).unwrap();
    assert!(f.session.selected().is_none());

    let refresh = f
        .session
        .events()
        .drain()
        .into_iter()
        .find_map(|e| match e {
            Event::TreeRefresh { select } => Some(select),
            _ => None,
        });
    assert_eq!(refresh, Some(Some(f.a.clone())));
}

#[test]
fn test_delete_model_drops_group_map_refs() {
    let mut f = fixture();
    let mut map = BTreeMap::new();
    map.insert(ColorKey::new(1, 2, 3), GroupNodeMapEntry::for_model("B"));
    map.insert(ColorKey::new(4, 5, 6), GroupNodeMapEntry::for_model("A1"));
    f.session.set_group_model_map(&f.group, map).unwrap();

    f.session.source_mut().remove_genome("B");
    f.session.delete_model("B").unwrap();
    let entry = f
        .session
        .tree()
        .contents(&f.group)
        .and_then(|c| c.group_entry.clone())
        .unwrap();
    assert_eq!(entry.model_map.len(), 1);
    assert!(entry.model_map.contains_key(&ColorKey::new(4, 5, 6)));

    f.session.undo().unwrap();
    assert!(f.session.tree().node_for_model("B").is_some());
}

#[test]
fn test_delete_modules_changes_and_drops_stops() {
    let mut f = fixture();
    let path = f.session.create_path(Some("Tour".to_string())).unwrap();
    f.session.select_node(&f.a).unwrap();
    f.session.add_to_current_modules("m2").unwrap();
    f.session.add_stop().unwrap();
    f.session.set_to_single_current_module("m1").unwrap();
    f.session.add_stop().unwrap();

    let owner = OwnerKey::Genome("A".to_string());
    f.session.source_mut().remove_module(&owner, "ov1", "m1");
    let mut removed = BTreeMap::new();
    removed.insert("ov1".to_string(), set(&["m1"]));
    f.session.delete_modules(&owner, &removed);

    let stops = f.session.paths().manager().path(&path).unwrap().stops().to_vec();
    assert_eq!(stops.len(), 1);
    assert_eq!(stops[0].modules(), &set(&["m2"]));
    assert!(!f.session.overlay().current_modules().contains("m1"));

    f.session.undo().unwrap();
    assert_eq!(f.session.paths().manager().path(&path).unwrap().len(), 2);
}

#[test]
fn test_delete_overlay_drops_stops_and_empty_path() {
    let mut f = fixture();
    let path = f.session.create_path(None).unwrap();
    f.session.select_node(&f.a).unwrap();
    f.session.add_stop().unwrap();

    let owner = OwnerKey::Genome("A".to_string());
    f.session.source_mut().remove_overlay(&owner, "ov1");
    f.session.delete_overlay(&owner, "ov1");
    assert!(f.session.paths().manager().path(&path).is_none());
    assert_eq!(f.session.overlay().current_overlay(), None);

    f.session.undo().unwrap();
    assert_eq!(f.session.paths().manager().path(&path).unwrap().len(), 1);
}

#[test]
fn test_path_navigation_restores_view() {
    let mut f = fixture();
    f.session.create_path(None).unwrap();
    f.session.select_node(&f.a).unwrap();
    f.session.toggle_mod_content_display("m1").unwrap();
    f.session.add_stop().unwrap();
    f.session.select_node(&f.b).unwrap();
    f.session.add_stop().unwrap();
    assert_eq!(f.session.paths().current_stop(), Some(1));

    f.session.path_backward().unwrap();
    assert_eq!(f.session.selected(), Some(&f.a));
    assert_eq!(f.session.overlay().revealed_modules(), &set(&["m1"]));

    f.session.path_forward().unwrap();
    assert_eq!(f.session.selected(), Some(&f.b));
    assert!(f.session.path_forward().is_err());
}

#[test]
fn test_selecting_a_bookmarked_view_moves_the_cursor() {
    let mut f = fixture();
    f.session.create_path(None).unwrap();
    f.session.select_node(&f.a).unwrap();
    f.session.add_stop().unwrap();
    f.session.select_node(&f.b).unwrap();
    f.session.add_stop().unwrap();

    f.session.select_node(&f.group).unwrap();
    assert_eq!(f.session.paths().current_path(), None);
    assert!(f.session.paths().last_path().is_some());

    f.session.select_node(&f.a).unwrap();
    assert_eq!(f.session.paths().current_stop(), Some(0));
}

#[test]
fn test_path_name_prefix_from_settings() {
    let settings = SessionSettings {
        path_name_prefix: "Tour".to_string(),
        ..Default::default()
    };
    let mut f = fixture_with(settings);
    let key = f.session.create_path(None).unwrap();
    let name = f.session.paths().manager().path(&key).unwrap().name().to_string();
    assert_eq!(name, "Tour 1");
}

#[test]
fn test_group_images_follow_node_lifetime() {
    let mut f = fixture();
    let dir = tempfile::tempdir().unwrap();
    let key = f
        .session
        .load_image(&write_png(dir.path(), "g.png", 30))
        .unwrap();
    assert_eq!(f.session.images().count(&key), 0);

    f.session
        .set_group_node_images(&f.group, Some(key.clone()), None)
        .unwrap();
    assert_eq!(f.session.images().count(&key), 1);
    let copy = f.session.copy_group_node(&f.group).unwrap();
    assert_eq!(f.session.images().count(&key), 2);
    assert_eq!(
        f.session.tree().contents(&copy).and_then(|c| c.name.clone()),
        Some("Copy of Early".to_string())
    );

    f.session.delete_node(&copy).unwrap();
    f.session.delete_node(&f.group).unwrap();
    assert!(!f.session.images().contains(&key));

    f.session.undo().unwrap();
    assert_eq!(f.session.images().count(&key), 1);
}

#[test]
fn test_duplicate_image_load_shares_key() {
    let mut f = fixture();
    let dir = tempfile::tempdir().unwrap();
    let undo_before = f.session.history().undo_len();
    let first = f.session.load_image(&write_png(dir.path(), "a.png", 9)).unwrap();
    let second = f.session.load_image(&write_png(dir.path(), "b.png", 9)).unwrap();
    assert_eq!(first, second);
    assert_eq!(f.session.images().len(), 1);
    // Loads hold no usage; only group nodes do.
    assert_eq!(f.session.images().count(&first), 0);
    // The repeat load changed nothing, so only the first is undoable.
    assert_eq!(f.session.history().undo_len(), undo_before + 1);
}

#[test]
fn test_shared_image_survives_deleting_one_node() {
    let mut f = fixture();
    let dir = tempfile::tempdir().unwrap();
    let key = f
        .session
        .load_image(&write_png(dir.path(), "g.png", 40))
        .unwrap();
    let other = f.session.add_group_node(&f.b).unwrap();
    f.session
        .set_group_node_images(&f.group, Some(key.clone()), None)
        .unwrap();
    f.session
        .set_group_node_images(&other, Some(key.clone()), None)
        .unwrap();
    assert_eq!(f.session.images().count(&key), 2);

    f.session.delete_node(&f.group).unwrap();
    assert_eq!(f.session.images().count(&key), 1);
    assert!(f.session.check().is_empty());

    f.session.undo().unwrap();
    assert_eq!(f.session.images().count(&key), 2);

    f.session.delete_node(&other).unwrap();
    f.session.delete_node(&f.group).unwrap();
    assert!(!f.session.images().contains(&key));
}

#[test]
fn test_image_in_both_slots_counts_twice() {
    let mut f = fixture();
    let dir = tempfile::tempdir().unwrap();
    let key = f
        .session
        .load_image(&write_png(dir.path(), "g.png", 50))
        .unwrap();
    f.session
        .set_group_node_images(&f.group, Some(key.clone()), Some(key.clone()))
        .unwrap();
    assert_eq!(f.session.images().count(&key), 2);

    f.session
        .set_group_node_images(&f.group, Some(key.clone()), None)
        .unwrap();
    assert_eq!(f.session.images().count(&key), 1);
    f.session.set_group_node_images(&f.group, None, None).unwrap();
    assert!(!f.session.images().contains(&key));

    f.session.undo().unwrap();
    assert_eq!(f.session.images().count(&key), 1);
    f.session.undo().unwrap();
    assert_eq!(f.session.images().count(&key), 2);
    assert!(f.session.check().is_empty());
}

#[test]
fn test_background_image_load() {
    let mut f = fixture();
    let dir = tempfile::tempdir().unwrap();
    let good = write_png(dir.path(), "a.png", 60);
    f.session.request_image_load(good.clone());
    f.session.request_image_load(dir.path().join("missing.png"));

    let outcomes = f.session.wait_for_image_loads(Duration::from_secs(10));
    assert_eq!(outcomes.len(), 2);
    let key = outcomes
        .iter()
        .find_map(|o| match o {
            ImageLoadOutcome::Loaded { path, key } if *path == good => Some(key.clone()),
            _ => None,
        })
        .unwrap();
    assert!(f.session.images().contains(&key));
    assert!(outcomes
        .iter()
        .any(|o| matches!(o, ImageLoadOutcome::Failed { .. })));

    let events = f.session.events().drain();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::ImageLoaded { key: k, .. } if *k == key)));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::ImageLoadFailed { .. })));
}

#[test]
fn test_save_and_load_round_trip() {
    let mut f = fixture();
    let dir = tempfile::tempdir().unwrap();
    let key = f
        .session
        .load_image(&write_png(dir.path(), "g.png", 80))
        .unwrap();
    // Loaded but never used; dropped on reload.
    let stray = f
        .session
        .load_image(&write_png(dir.path(), "s.png", 81))
        .unwrap();
    f.session
        .set_group_node_images(&f.group, Some(key.clone()), Some(key.clone()))
        .unwrap();
    f.session
        .set_group_visibility("A", "g1", GroupVisibility::None);
    f.session.create_path(None).unwrap();
    f.session.select_node(&f.a).unwrap();
    f.session.add_stop().unwrap();

    let count_before = f.session.images().count(&key);
    assert_eq!(count_before, 2);

    let file = dir.path().join("nav.xml");
    f.session.save(&file).unwrap();

    let mut other = NavigationSession::new(source(), SessionSettings::default());
    other.load(&file).unwrap();
    assert_eq!(other.tree().records(), f.session.tree().records());
    assert_eq!(other.images().count(&key), count_before);
    assert!(!other.images().contains(&stray));
    assert_eq!(other.group_settings().visibility("A", "g1"), GroupVisibility::None);
    assert_eq!(other.paths().manager().len(), 1);
    assert!(!other.history().can_undo());
    assert_eq!(other.selected(), Some(&f.group));
    assert!(other.check().is_empty());
}

#[test]
fn test_shared_image_counts_survive_reload() {
    let mut f = fixture();
    let dir = tempfile::tempdir().unwrap();
    let key = f
        .session
        .load_image(&write_png(dir.path(), "g.png", 90))
        .unwrap();
    let other = f.session.add_group_node(&f.b).unwrap();
    f.session
        .set_group_node_images(&f.group, Some(key.clone()), None)
        .unwrap();
    f.session
        .set_group_node_images(&other, Some(key.clone()), Some(key.clone()))
        .unwrap();
    let count_before = f.session.images().count(&key);

    let file = dir.path().join("nav.xml");
    f.session.save(&file).unwrap();
    let mut reloaded = NavigationSession::new(source(), SessionSettings::default());
    reloaded.load(&file).unwrap();
    assert_eq!(reloaded.images().count(&key), count_before);
    assert_eq!(count_before, 3);

    reloaded.delete_node(&f.group).unwrap();
    f.session.delete_node(&f.group).unwrap();
    assert_eq!(
        reloaded.images().count(&key),
        f.session.images().count(&key)
    );
}

#[test]
fn test_check_reports_usage_mismatch() {
    let mut f = fixture();
    let dir = tempfile::tempdir().unwrap();
    let key = f
        .session
        .load_image(&write_png(dir.path(), "g.png", 70))
        .unwrap();
    assert!(f.session.check().is_empty());
    f.session.state.images.register_image_usage(&key).unwrap();
    let problems = f.session.check();
    assert_eq!(problems.len(), 1);
    assert!(problems[0].contains(&key));
}

#[test]
fn test_retyping_selected_node_reshows_it() {
    let mut f = fixture();
    f.session.select_node(&f.a1).unwrap();
    f.session.change_to_proxy(&f.a1, "px").unwrap();
    assert_eq!(f.session.selected(), Some(&f.a1));
    assert_eq!(
        f.session.overlay().owner(),
        Some(&OwnerKey::Proxy("px".to_string()))
    );
    f.session.undo().unwrap();
    assert_eq!(
        f.session.tree().contents(&f.a1).and_then(|c| c.model_id.clone()),
        Some("A1".to_string())
    );
}

#[test]
fn test_load_missing_file_has_context() {
    let mut f = fixture();
    let dir = tempfile::tempdir().unwrap();
    let err = f.session.load(&dir.path().join("nope.xml")).unwrap_err();
    assert!(err.to_string().contains("Failed to load navigation state"));
}

#[test]
fn test_check_reports_dangling_references() {
    let mut f = fixture();
    f.session
        .set_group_node_images(&f.group, Some("img99".to_string()), None)
        .unwrap();
    f.session
        .set_group_visibility("Z", "g1", GroupVisibility::None);
    let problems = f.session.check();
    assert_eq!(problems.len(), 2);
    assert!(problems.iter().any(|p| p.contains("img99")));
    assert!(problems.iter().any(|p| p.contains("Z")));
}

#[test]
fn test_reset_clears_everything() {
    let mut f = fixture();
    f.session.create_path(None).unwrap();
    f.session.reset();
    assert!(f.session.tree().is_empty());
    assert!(f.session.paths().manager().is_empty());
    assert!(!f.session.history().can_undo());
}

#[test]
fn test_overlay_controls_push_pop() {
    let mut f = fixture();
    assert!(f.session.push_overlay_controls_disabled());
    assert!(!f.session.overlay().is_enabled());
    assert!(!f.session.push_overlay_controls_disabled());
    assert!(f.session.pop_overlay_controls_disabled());
    assert!(f.session.overlay().is_enabled());
}

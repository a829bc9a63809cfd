//! Current overlay, shown modules and revealed modules for the displayed model.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tapestry_core::{ModelSource, OverlayInfo, OverlayMode, OwnerKey};
use tapestry_events::{Event, EventBus, RedrawReason};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OverlayError {
    #[error("No model is being displayed")]
    NoOwner,
    #[error("Overlay {overlay} does not exist on {owner}")]
    UnknownOverlay { owner: OwnerKey, overlay: String },
    #[error("Module {module} does not exist in overlay {overlay}")]
    UnknownModule { overlay: String, module: String },
    #[error("No overlay is being displayed")]
    NoCurrentOverlay,
    #[error("Overlay {0} is not opaque")]
    NotOpaque(String),
    #[error("Module {0} is not shown")]
    ModuleNotShown(String),
}

/// What the user currently sees for one owner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayDisplayState {
    pub overlay: Option<String>,
    pub modules: BTreeSet<String>,
    /// Always a subset of `modules`, and empty unless the overlay is opaque.
    pub revealed: BTreeSet<String>,
}

impl OverlayDisplayState {
    pub fn new(
        overlay: Option<String>,
        modules: BTreeSet<String>,
        revealed: BTreeSet<String>,
    ) -> Self {
        Self {
            overlay,
            modules,
            revealed,
        }
    }

    fn normalize(&mut self, mode: Option<OverlayMode>) {
        if self.overlay.is_none() {
            self.modules.clear();
        }
        let modules = &self.modules;
        self.revealed.retain(|m| modules.contains(m));
        if mode != Some(OverlayMode::Opaque) {
            self.revealed.clear();
        }
    }

    /// State shown the first time `info` is displayed.
    pub fn first_view(info: &OverlayInfo) -> Self {
        let modules: BTreeSet<String> = info
            .modules
            .iter()
            .filter(|m| m.first_view_shown)
            .map(|m| m.key.clone())
            .collect();
        let revealed = info
            .modules
            .iter()
            .filter(|m| m.first_view_revealed)
            .map(|m| m.key.clone())
            .collect();
        let mut state = Self::new(Some(info.key.clone()), modules, revealed);
        state.normalize(Some(info.mode));
        state
    }
}

/// Last-seen display state, so leaving a model or overlay and coming back
/// shows the same thing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlayCache {
    /// `Some(None)` means the user chose to show no overlay.
    last_overlay: HashMap<OwnerKey, Option<String>>,
    last_modules: HashMap<(OwnerKey, String), BTreeSet<String>>,
    last_revealed: HashMap<(OwnerKey, String), BTreeSet<String>>,
}

impl OverlayCache {
    fn remember(&mut self, owner: &OwnerKey, state: &OverlayDisplayState) {
        self.last_overlay.insert(owner.clone(), state.overlay.clone());
        if let Some(overlay) = &state.overlay {
            let key = (owner.clone(), overlay.clone());
            self.last_modules.insert(key.clone(), state.modules.clone());
            self.last_revealed.insert(key, state.revealed.clone());
        }
    }

    pub fn last_overlay(&self, owner: &OwnerKey) -> Option<Option<&str>> {
        self.last_overlay.get(owner).map(|o| o.as_deref())
    }

    /// Last modules and revealed modules seen for one overlay.
    pub fn last_modules(
        &self,
        owner: &OwnerKey,
        overlay: &str,
    ) -> Option<(BTreeSet<String>, BTreeSet<String>)> {
        let key = (owner.clone(), overlay.to_string());
        let modules = self.last_modules.get(&key)?.clone();
        let revealed = self.last_revealed.get(&key).cloned().unwrap_or_default();
        Some((modules, revealed))
    }

    fn drop_modules(&mut self, owner: &OwnerKey, overlay: &str, removed: &BTreeSet<String>) -> bool {
        let key = (owner.clone(), overlay.to_string());
        let mut changed = false;
        for map in [&mut self.last_modules, &mut self.last_revealed] {
            if let Some(set) = map.get_mut(&key) {
                let before = set.len();
                set.retain(|m| !removed.contains(m));
                changed |= set.len() != before;
            }
        }
        changed
    }

    fn forget_overlay(&mut self, owner: &OwnerKey, overlay: &str) -> bool {
        let key = (owner.clone(), overlay.to_string());
        let mut changed = self.last_modules.remove(&key).is_some();
        changed |= self.last_revealed.remove(&key).is_some();
        if let Some(last) = self.last_overlay.get_mut(owner)
            && last.as_deref() == Some(overlay)
        {
            *last = None;
            changed = true;
        }
        changed
    }

    fn forget_owner(&mut self, owner: &OwnerKey) -> bool {
        let mut changed = self.last_overlay.remove(owner).is_some();
        let before = self.last_modules.len() + self.last_revealed.len();
        self.last_modules.retain(|(o, _), _| o != owner);
        self.last_revealed.retain(|(o, _), _| o != owner);
        changed |= before != self.last_modules.len() + self.last_revealed.len();
        changed
    }
}

/// Before/after record of an overlay display edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayDisplayChange {
    pub owner: Option<OwnerKey>,
    pub before: OverlayDisplayState,
    pub after: OverlayDisplayState,
    pub cache_before: OverlayCache,
    pub cache_after: OverlayCache,
}

pub struct NetOverlayController {
    owner: Option<OwnerKey>,
    current: OverlayDisplayState,
    cache: OverlayCache,
    enabled: bool,
    /// Enabled state saved by `push_disabled`.
    pushed: Option<bool>,
    events: EventBus,
}

impl NetOverlayController {
    pub fn new(events: EventBus) -> Self {
        Self {
            owner: None,
            current: OverlayDisplayState::default(),
            cache: OverlayCache::default(),
            enabled: true,
            pushed: None,
            events,
        }
    }

    pub fn owner(&self) -> Option<&OwnerKey> {
        self.owner.as_ref()
    }

    pub fn current(&self) -> &OverlayDisplayState {
        &self.current
    }

    pub fn current_overlay(&self) -> Option<&str> {
        self.current.overlay.as_deref()
    }

    pub fn current_modules(&self) -> &BTreeSet<String> {
        &self.current.modules
    }

    pub fn revealed_modules(&self) -> &BTreeSet<String> {
        &self.current.revealed
    }

    pub fn cache(&self) -> &OverlayCache {
        &self.cache
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Forget everything, as when a new model is loaded.
    pub fn reset(&mut self) {
        self.owner = None;
        self.current = OverlayDisplayState::default();
        self.cache = OverlayCache::default();
        self.redraw(RedrawReason::Cleanup);
    }

    fn redraw(&self, reason: RedrawReason) {
        self.events.publish(Event::OverlayRedraw {
            owner: self.owner.clone(),
            overlay: self.current.overlay.clone(),
            reason,
        });
    }

    fn owner_or_err(&self) -> Result<OwnerKey, OverlayError> {
        self.owner.clone().ok_or(OverlayError::NoOwner)
    }

    fn overlay_info(
        &self,
        source: &dyn ModelSource,
        owner: &OwnerKey,
        overlay: &str,
    ) -> Result<OverlayInfo, OverlayError> {
        source
            .overlay(owner, overlay)
            .ok_or_else(|| OverlayError::UnknownOverlay {
                owner: owner.clone(),
                overlay: overlay.to_string(),
            })
    }

    fn current_info(&self, source: &dyn ModelSource) -> Result<(OwnerKey, OverlayInfo), OverlayError> {
        let owner = self.owner_or_err()?;
        let overlay = self
            .current
            .overlay
            .as_deref()
            .ok_or(OverlayError::NoCurrentOverlay)?;
        let info = self.overlay_info(source, &owner, overlay)?;
        Ok((owner, info))
    }

    fn check_module(info: &OverlayInfo, module: &str) -> Result<(), OverlayError> {
        if info.has_module(module) {
            Ok(())
        } else {
            Err(OverlayError::UnknownModule {
                overlay: info.key.clone(),
                module: module.to_string(),
            })
        }
    }

    /// Install `next` as the live state for the current owner. The only path
    /// through which transitions touch the cache.
    fn install(
        &mut self,
        owner: OwnerKey,
        mut next: OverlayDisplayState,
        mode: Option<OverlayMode>,
        reason: RedrawReason,
    ) -> OverlayDisplayChange {
        next.normalize(mode);
        let before = std::mem::replace(&mut self.current, next);
        let cache_before = self.cache.clone();
        self.cache.remember(&owner, &self.current);
        tracing::debug!(
            "Overlay state for {}: {:?} modules={} revealed={}",
            owner,
            self.current.overlay,
            self.current.modules.len(),
            self.current.revealed.len()
        );
        self.redraw(reason);
        OverlayDisplayChange {
            owner: Some(owner),
            before,
            after: self.current.clone(),
            cache_before,
            cache_after: self.cache.clone(),
        }
    }

    /// Show `overlay` (or none), restoring its last-seen modules or its
    /// first-view defaults.
    pub fn set_current_overlay(
        &mut self,
        source: &dyn ModelSource,
        overlay: Option<&str>,
    ) -> Result<OverlayDisplayChange, OverlayError> {
        let owner = self.owner_or_err()?;
        let Some(key) = overlay else {
            return Ok(self.install(owner, OverlayDisplayState::default(), None, RedrawReason::OverlayChanged));
        };
        let info = self.overlay_info(source, &owner, key)?;
        let next = match self.cache.last_modules(&owner, key) {
            Some((modules, revealed)) => {
                OverlayDisplayState::new(Some(key.to_string()), modules, revealed)
            }
            None => OverlayDisplayState::first_view(&info),
        };
        Ok(self.install(owner, next, Some(info.mode), RedrawReason::OverlayChanged))
    }

    pub fn clear_current_overlay(&mut self, source: &dyn ModelSource) -> Result<OverlayDisplayChange, OverlayError> {
        self.set_current_overlay(source, None)
    }

    pub fn add_to_current_modules(
        &mut self,
        source: &dyn ModelSource,
        module: &str,
    ) -> Result<OverlayDisplayChange, OverlayError> {
        let (owner, info) = self.current_info(source)?;
        Self::check_module(&info, module)?;
        let mut next = self.current.clone();
        next.modules.insert(module.to_string());
        Ok(self.install(owner, next, Some(info.mode), RedrawReason::ModulesChanged))
    }

    pub fn drop_a_current_module(
        &mut self,
        source: &dyn ModelSource,
        module: &str,
    ) -> Result<OverlayDisplayChange, OverlayError> {
        let (owner, info) = self.current_info(source)?;
        let mut next = self.current.clone();
        next.modules.remove(module);
        Ok(self.install(owner, next, Some(info.mode), RedrawReason::ModulesChanged))
    }

    pub fn set_to_single_current_module(
        &mut self,
        source: &dyn ModelSource,
        module: &str,
    ) -> Result<OverlayDisplayChange, OverlayError> {
        let (owner, info) = self.current_info(source)?;
        Self::check_module(&info, module)?;
        let mut next = self.current.clone();
        next.modules = BTreeSet::from([module.to_string()]);
        Ok(self.install(owner, next, Some(info.mode), RedrawReason::ModulesChanged))
    }

    pub fn set_current_revealed(
        &mut self,
        source: &dyn ModelSource,
        revealed: BTreeSet<String>,
    ) -> Result<OverlayDisplayChange, OverlayError> {
        let (owner, info) = self.current_info(source)?;
        let mut next = self.current.clone();
        next.revealed = revealed;
        Ok(self.install(owner, next, Some(info.mode), RedrawReason::RevealChanged))
    }

    /// Flip whether a shown module's contents are revealed. Opaque overlays only.
    pub fn toggle_mod_content_display(
        &mut self,
        source: &dyn ModelSource,
        module: &str,
    ) -> Result<OverlayDisplayChange, OverlayError> {
        let (owner, info) = self.current_info(source)?;
        if info.mode != OverlayMode::Opaque {
            return Err(OverlayError::NotOpaque(info.key));
        }
        if !self.current.modules.contains(module) {
            return Err(OverlayError::ModuleNotShown(module.to_string()));
        }
        let mut next = self.current.clone();
        if !next.revealed.remove(module) {
            next.revealed.insert(module.to_string());
        }
        Ok(self.install(owner, next, Some(info.mode), RedrawReason::RevealChanged))
    }

    /// Replace the whole display state, e.g. when replaying a path stop.
    /// Modules the overlay no longer has are dropped.
    pub fn set_full_overlay_state(
        &mut self,
        source: &dyn ModelSource,
        state: OverlayDisplayState,
    ) -> Result<OverlayDisplayChange, OverlayError> {
        let owner = self.owner_or_err()?;
        let mut next = state;
        let mode = match next.overlay.as_deref() {
            Some(key) => {
                let info = self.overlay_info(source, &owner, key)?;
                next.modules.retain(|m| info.has_module(m));
                Some(info.mode)
            }
            None => None,
        };
        Ok(self.install(owner, next, mode, RedrawReason::OverlayChanged))
    }

    /// Switch the displayed owner, restoring what was last shown for it or
    /// the first-view overlay when it has never been shown.
    pub fn preload_for_owner(&mut self, source: &dyn ModelSource, owner: Option<OwnerKey>) {
        self.owner = owner.clone();
        let Some(owner) = owner else {
            self.current = OverlayDisplayState::default();
            self.redraw(RedrawReason::OverlayChanged);
            return;
        };

        let overlays = source.overlays(&owner);
        let remembered = self
            .cache
            .last_overlay(&owner)
            .map(|o| o.and_then(|key| overlays.iter().find(|info| info.key == key)));
        let (next, mode) = match remembered {
            Some(None) => (OverlayDisplayState::default(), None),
            Some(Some(info)) => {
                let next = match self.cache.last_modules(&owner, &info.key) {
                    Some((modules, revealed)) => {
                        OverlayDisplayState::new(Some(info.key.clone()), modules, revealed)
                    }
                    None => OverlayDisplayState::first_view(info),
                };
                (next, Some(info.mode))
            }
            None => match overlays.iter().find(|info| info.first_view) {
                Some(info) => (OverlayDisplayState::first_view(info), Some(info.mode)),
                None => (OverlayDisplayState::default(), None),
            },
        };
        self.install(owner, next, mode, RedrawReason::OverlayChanged);
    }

    /// Remove deleted modules from the cache and the live state.
    /// `removed` maps overlay key to the module keys that were deleted.
    pub fn cleanup_deleted_modules(
        &mut self,
        owner: &OwnerKey,
        removed: &BTreeMap<String, BTreeSet<String>>,
    ) -> Option<OverlayDisplayChange> {
        let cache_before = self.cache.clone();
        let mut changed = false;
        for (overlay, modules) in removed {
            changed |= self.cache.drop_modules(owner, overlay, modules);
        }

        let before = self.current.clone();
        if self.owner.as_ref() == Some(owner)
            && let Some(overlay) = &self.current.overlay
            && let Some(modules) = removed.get(overlay)
        {
            self.current.modules.retain(|m| !modules.contains(m));
            self.current.revealed.retain(|m| !modules.contains(m));
            changed |= before != self.current;
        }
        if !changed {
            return None;
        }
        self.redraw(RedrawReason::Cleanup);
        Some(OverlayDisplayChange {
            owner: Some(owner.clone()),
            before,
            after: self.current.clone(),
            cache_before,
            cache_after: self.cache.clone(),
        })
    }

    pub fn cleanup_deleted_overlay(&mut self, owner: &OwnerKey, overlay: &str) -> Option<OverlayDisplayChange> {
        let cache_before = self.cache.clone();
        let mut changed = self.cache.forget_overlay(owner, overlay);
        let before = self.current.clone();
        if self.owner.as_ref() == Some(owner) && self.current.overlay.as_deref() == Some(overlay) {
            self.current = OverlayDisplayState::default();
            changed = true;
        }
        if !changed {
            return None;
        }
        self.redraw(RedrawReason::Cleanup);
        Some(OverlayDisplayChange {
            owner: Some(owner.clone()),
            before,
            after: self.current.clone(),
            cache_before,
            cache_after: self.cache.clone(),
        })
    }

    pub fn cleanup_deleted_owner(&mut self, owner: &OwnerKey) -> Option<OverlayDisplayChange> {
        let cache_before = self.cache.clone();
        let mut changed = self.cache.forget_owner(owner);
        let before = self.current.clone();
        if self.owner.as_ref() == Some(owner) {
            self.current = OverlayDisplayState::default();
            changed |= before != self.current;
        }
        if !changed {
            return None;
        }
        self.redraw(RedrawReason::Cleanup);
        Some(OverlayDisplayChange {
            owner: Some(owner.clone()),
            before,
            after: self.current.clone(),
            cache_before,
            cache_after: self.cache.clone(),
        })
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.pushed.is_some() {
            return;
        }
        self.enabled = enabled;
        self.events.publish(Event::OverlayControlsEnabled { enabled });
    }

    /// Force the controls off. Returns false if already pushed.
    pub fn push_disabled(&mut self) -> bool {
        if self.pushed.is_some() {
            return false;
        }
        self.pushed = Some(self.enabled);
        self.enabled = false;
        self.events.publish(Event::OverlayControlsEnabled { enabled: false });
        true
    }

    /// Restore the enabled state saved by [`NetOverlayController::push_disabled`].
    pub fn pop_disabled(&mut self) -> bool {
        let Some(saved) = self.pushed.take() else {
            return false;
        };
        self.enabled = saved;
        self.events.publish(Event::OverlayControlsEnabled { enabled: saved });
        true
    }

    pub fn change_undo(&mut self, change: &OverlayDisplayChange) {
        self.apply_change(change.owner.as_ref(), &change.before, &change.cache_before);
    }

    pub fn change_redo(&mut self, change: &OverlayDisplayChange) {
        self.apply_change(change.owner.as_ref(), &change.after, &change.cache_after);
    }

    fn apply_change(&mut self, owner: Option<&OwnerKey>, state: &OverlayDisplayState, cache: &OverlayCache) {
        self.cache = cache.clone();
        if self.owner.as_ref() == owner {
            self.current = state.clone();
        }
        self.redraw(RedrawReason::UndoRedo);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tapestry_core::{InMemoryModelSource, ModuleInfo};

    fn module(key: &str, shown: bool, revealed: bool) -> ModuleInfo {
        ModuleInfo {
            key: key.to_string(),
            name: key.to_uppercase(),
            first_view_shown: shown,
            first_view_revealed: revealed,
        }
    }

    fn genome(id: &str) -> OwnerKey {
        OwnerKey::Genome(id.to_string())
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn source() -> InMemoryModelSource {
        let mut source = InMemoryModelSource::new();
        source.add_overlay(
            genome("A"),
            OverlayInfo {
                key: "opq".to_string(),
                name: "Opaque".to_string(),
                mode: OverlayMode::Opaque,
                modules: vec![
                    module("m1", true, true),
                    module("m2", true, false),
                    module("m3", false, false),
                ],
                first_view: true,
            },
        );
        source.add_overlay(
            genome("A"),
            OverlayInfo {
                key: "trn".to_string(),
                name: "Transparent".to_string(),
                mode: OverlayMode::Transparent,
                modules: vec![module("t1", true, true), module("t2", false, false)],
                first_view: false,
            },
        );
        source.add_overlay(
            genome("B"),
            OverlayInfo {
                key: "plain".to_string(),
                name: "Plain".to_string(),
                mode: OverlayMode::Underlay,
                modules: vec![module("p1", false, false)],
                first_view: false,
            },
        );
        source
    }

    fn controller() -> (NetOverlayController, InMemoryModelSource, EventBus) {
        let bus = EventBus::new();
        let mut ctrl = NetOverlayController::new(bus.clone());
        let source = source();
        ctrl.preload_for_owner(&source, Some(genome("A")));
        (ctrl, source, bus)
    }

    #[test]
    fn test_preload_uses_first_view() {
        let (ctrl, _, bus) = controller();
        assert_eq!(ctrl.current_overlay(), Some("opq"));
        assert_eq!(ctrl.current_modules(), &set(&["m1", "m2"]));
        assert_eq!(ctrl.revealed_modules(), &set(&["m1"]));
        assert!(bus
            .drain()
            .iter()
            .any(|e| matches!(e, Event::OverlayRedraw { reason: RedrawReason::OverlayChanged, .. })));
    }

    #[test]
    fn test_owner_without_first_view_shows_nothing() {
        let (mut ctrl, source, _) = controller();
        ctrl.preload_for_owner(&source, Some(genome("B")));
        assert_eq!(ctrl.current(), &OverlayDisplayState::default());
    }

    #[test]
    fn test_revisit_restores_last_seen() {
        let (mut ctrl, source, _) = controller();
        ctrl.set_to_single_current_module(&source, "m3").unwrap();
        ctrl.preload_for_owner(&source, Some(genome("B")));
        ctrl.preload_for_owner(&source, Some(genome("A")));
        assert_eq!(ctrl.current_overlay(), Some("opq"));
        assert_eq!(ctrl.current_modules(), &set(&["m3"]));
        assert!(ctrl.revealed_modules().is_empty());
    }

    #[test]
    fn test_transparent_overlay_never_reveals() {
        let (mut ctrl, source, _) = controller();
        ctrl.set_current_overlay(&source, Some("trn")).unwrap();
        assert_eq!(ctrl.current_modules(), &set(&["t1"]));
        assert!(ctrl.revealed_modules().is_empty());
        assert_eq!(
            ctrl.toggle_mod_content_display(&source, "t1").unwrap_err(),
            OverlayError::NotOpaque("trn".to_string())
        );
        ctrl.set_current_revealed(&source, set(&["t1"])).unwrap();
        assert!(ctrl.revealed_modules().is_empty());
    }

    #[test]
    fn test_switching_overlays_restores_modules() {
        let (mut ctrl, source, _) = controller();
        ctrl.add_to_current_modules(&source, "m3").unwrap();
        ctrl.set_current_overlay(&source, Some("trn")).unwrap();
        ctrl.set_current_overlay(&source, Some("opq")).unwrap();
        assert_eq!(ctrl.current_modules(), &set(&["m1", "m2", "m3"]));
    }

    #[test]
    fn test_unknown_module_rejected() {
        let (mut ctrl, source, _) = controller();
        assert!(matches!(
            ctrl.add_to_current_modules(&source, "zz"),
            Err(OverlayError::UnknownModule { .. })
        ));
        assert!(matches!(
            ctrl.set_current_overlay(&source, Some("zz")),
            Err(OverlayError::UnknownOverlay { .. })
        ));
    }

    #[test]
    fn test_drop_module_drops_revealed() {
        let (mut ctrl, source, _) = controller();
        ctrl.drop_a_current_module(&source, "m1").unwrap();
        assert_eq!(ctrl.current_modules(), &set(&["m2"]));
        assert!(ctrl.revealed_modules().is_empty());
    }

    #[test]
    fn test_undo_redo_installs_snapshots() {
        let (mut ctrl, source, _) = controller();
        let start = ctrl.current().clone();
        let change = ctrl.toggle_mod_content_display(&source, "m2").unwrap();
        assert_eq!(ctrl.revealed_modules(), &set(&["m1", "m2"]));

        ctrl.change_undo(&change);
        assert_eq!(ctrl.current(), &start);
        ctrl.change_redo(&change);
        assert_eq!(ctrl.revealed_modules(), &set(&["m1", "m2"]));
    }

    #[test]
    fn test_undo_for_other_owner_only_touches_cache() {
        let (mut ctrl, source, _) = controller();
        let change = ctrl.set_to_single_current_module(&source, "m2").unwrap();
        ctrl.preload_for_owner(&source, Some(genome("B")));
        ctrl.change_undo(&change);
        assert_eq!(ctrl.current(), &OverlayDisplayState::default());
        assert_eq!(ctrl.cache().last_modules(&genome("A"), "opq").unwrap().0, set(&["m1", "m2"]));
    }

    #[test]
    fn test_cleanup_deleted_modules() {
        let (mut ctrl, _, _) = controller();
        let removed = BTreeMap::from([("opq".to_string(), set(&["m1"]))]);
        let change = ctrl.cleanup_deleted_modules(&genome("A"), &removed).unwrap();
        assert_eq!(ctrl.current_modules(), &set(&["m2"]));
        assert!(ctrl.revealed_modules().is_empty());
        assert_eq!(ctrl.cache().last_modules(&genome("A"), "opq").unwrap().0, set(&["m2"]));

        ctrl.change_undo(&change);
        assert_eq!(ctrl.current_modules(), &set(&["m1", "m2"]));

        let untouched = BTreeMap::from([("trn".to_string(), set(&["t9"]))]);
        assert!(ctrl.cleanup_deleted_modules(&genome("A"), &untouched).is_none());
    }

    #[test]
    fn test_cleanup_deleted_overlay_and_owner() {
        let (mut ctrl, _, _) = controller();
        assert!(ctrl.cleanup_deleted_overlay(&genome("A"), "opq").is_some());
        assert_eq!(ctrl.current(), &OverlayDisplayState::default());
        assert_eq!(ctrl.cache().last_overlay(&genome("A")), Some(None));

        assert!(ctrl.cleanup_deleted_owner(&genome("A")).is_some());
        assert_eq!(ctrl.cache().last_overlay(&genome("A")), None);
        assert!(ctrl.cleanup_deleted_owner(&genome("Z")).is_none());
    }

    #[test]
    fn test_push_pop_restores_exact_state() {
        let (mut ctrl, _, _) = controller();
        ctrl.set_enabled(false);
        assert!(ctrl.push_disabled());
        assert!(!ctrl.push_disabled());
        ctrl.set_enabled(true);
        assert!(!ctrl.is_enabled());
        assert!(ctrl.pop_disabled());
        assert!(!ctrl.is_enabled());
        assert!(!ctrl.pop_disabled());

        ctrl.set_enabled(true);
        ctrl.push_disabled();
        assert!(!ctrl.is_enabled());
        ctrl.pop_disabled();
        assert!(ctrl.is_enabled());
    }

    #[test]
    fn test_no_owner_is_an_error() {
        let mut ctrl = NetOverlayController::new(EventBus::new());
        assert_eq!(
            ctrl.set_current_overlay(&source(), Some("opq")).unwrap_err(),
            OverlayError::NoOwner
        );
    }

    #[derive(Debug, Clone)]
    enum Step {
        Overlay(Option<&'static str>),
        Add(&'static str),
        Drop(&'static str),
        Single(&'static str),
        Reveal(Vec<&'static str>),
        Toggle(&'static str),
    }

    fn step_strategy() -> impl Strategy<Value = Step> {
        let module = prop::sample::select(vec!["m1", "m2", "m3", "t1", "t2"]);
        prop_oneof![
            prop::sample::select(vec![None, Some("opq"), Some("trn")]).prop_map(Step::Overlay),
            module.clone().prop_map(Step::Add),
            module.clone().prop_map(Step::Drop),
            module.clone().prop_map(Step::Single),
            prop::collection::vec(module.clone(), 0..4).prop_map(Step::Reveal),
            module.prop_map(Step::Toggle),
        ]
    }

    proptest! {
        /// Revealed stays inside current, and is empty unless the overlay is opaque.
        #[test]
        fn prop_revealed_subset_of_current(steps in prop::collection::vec(step_strategy(), 1..30)) {
            let (mut ctrl, source, _) = controller();
            for step in steps {
                let _ = match step {
                    Step::Overlay(o) => ctrl.set_current_overlay(&source, o),
                    Step::Add(m) => ctrl.add_to_current_modules(&source, m),
                    Step::Drop(m) => ctrl.drop_a_current_module(&source, m),
                    Step::Single(m) => ctrl.set_to_single_current_module(&source, m),
                    Step::Reveal(ms) => ctrl.set_current_revealed(&source, ms.iter().map(|m| m.to_string()).collect()),
                    Step::Toggle(m) => ctrl.toggle_mod_content_display(&source, m),
                };
                let state = ctrl.current();
                prop_assert!(state.revealed.is_subset(&state.modules));
                if state.overlay.as_deref() != Some("opq") {
                    prop_assert!(state.revealed.is_empty());
                }
            }
        }
    }
}

use super::{UserTreePath, UserTreePathStop};
use std::collections::{BTreeSet, HashMap};
use tapestry_core::{LabelError, NavNodeId, OwnerKey, UniqueLabeller};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Unknown path: {0}")]
    UnknownPath(String),
    #[error("Stop {index} out of range for path {path} with {len} stops")]
    StopOutOfRange {
        path: String,
        index: usize,
        len: usize,
    },
    #[error("Position {index} out of range for {len} paths")]
    PositionOutOfRange { index: usize, len: usize },
    #[error("No path is selected")]
    NoCurrentPath,
    #[error("No stop is selected")]
    NoCurrentStop,
    #[error(transparent)]
    Label(#[from] LabelError),
}

/// Before/after record of one path edit. A `None` side means the path does
/// not exist on that side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserTreePathChange {
    pub path_key: String,
    pub before: Option<UserTreePath>,
    pub after: Option<UserTreePath>,
    pub order_before: Vec<String>,
    pub order_after: Vec<String>,
}

/// Changes from one cross-cutting cleanup, kept apart so each can be undone
/// on its own. Apply order is `modified`, then `dropped`, then `deleted_paths`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopEdits {
    pub modified: Vec<UserTreePathChange>,
    pub dropped: Vec<UserTreePathChange>,
    pub deleted_paths: Vec<UserTreePathChange>,
}

impl StopEdits {
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.dropped.is_empty() && self.deleted_paths.is_empty()
    }

    /// All changes in the order they were applied.
    pub fn into_changes(self) -> Vec<UserTreePathChange> {
        let mut changes = self.modified;
        changes.extend(self.dropped);
        changes.extend(self.deleted_paths);
        changes
    }
}

/// What a cleanup pass does to one stop.
enum StopFate {
    Keep,
    Modify(UserTreePathStop),
    Drop,
}

#[derive(Debug, Clone, Default)]
pub struct UserTreePathManager {
    paths: HashMap<String, UserTreePath>,
    order: Vec<String>,
    labeller: UniqueLabeller,
}

impl UserTreePathManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn keys(&self) -> &[String] {
        &self.order
    }

    pub fn path(&self, key: &str) -> Option<&UserTreePath> {
        self.paths.get(key)
    }

    /// Paths in display order.
    pub fn paths(&self) -> impl Iterator<Item = &UserTreePath> {
        self.order.iter().filter_map(|k| self.paths.get(k))
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.paths.values().any(|p| p.name() == name)
    }

    pub fn clear(&mut self) {
        self.paths.clear();
        self.order.clear();
        self.labeller = UniqueLabeller::new();
    }

    fn require(&self, key: &str) -> Result<&UserTreePath, PathError> {
        self.paths
            .get(key)
            .ok_or_else(|| PathError::UnknownPath(key.to_string()))
    }

    fn install(&mut self, key: &str, path: Option<&UserTreePath>, order: &[String]) {
        match path {
            Some(path) => {
                if !self.labeller.contains(key)
                    && let Err(e) = self.labeller.add_existing_label(key)
                {
                    tracing::debug!("Path key {} not reserved: {}", key, e);
                }
                self.paths.insert(key.to_string(), path.clone());
            }
            None => {
                self.paths.remove(key);
                self.labeller.remove_label(key);
            }
        }
        self.order = order.to_vec();
    }

    /// Apply `edit` to a copy of the path and install it.
    fn edit<F>(&mut self, key: &str, edit: F) -> Result<UserTreePathChange, PathError>
    where
        F: FnOnce(&mut UserTreePath) -> Result<(), PathError>,
    {
        let before = self.require(key)?.clone();
        let mut after = before.clone();
        edit(&mut after)?;
        self.paths.insert(key.to_string(), after.clone());
        Ok(UserTreePathChange {
            path_key: key.to_string(),
            before: Some(before),
            after: Some(after),
            order_before: self.order.clone(),
            order_after: self.order.clone(),
        })
    }

    /// Create an empty path. `index` positions it in the list; `None` appends.
    pub fn add_path(
        &mut self,
        name: impl Into<String>,
        index: Option<usize>,
    ) -> Result<(String, UserTreePathChange), PathError> {
        if let Some(i) = index
            && i > self.order.len()
        {
            return Err(PathError::PositionOutOfRange {
                index: i,
                len: self.order.len(),
            });
        }
        let key = self.labeller.next_label();
        let path = UserTreePath::new(key.clone(), name);
        let order_before = self.order.clone();
        match index {
            Some(i) => self.order.insert(i, key.clone()),
            None => self.order.push(key.clone()),
        }
        self.paths.insert(key.clone(), path.clone());
        tracing::debug!("Created path {} ({})", key, path.name());
        Ok((
            key.clone(),
            UserTreePathChange {
                path_key: key,
                before: None,
                after: Some(path),
                order_before,
                order_after: self.order.clone(),
            },
        ))
    }

    /// Add a path read from a file, keeping its ID.
    pub fn add_existing_path(&mut self, path: UserTreePath) -> Result<UserTreePathChange, PathError> {
        self.labeller.add_existing_label(path.id())?;
        let key = path.id().to_string();
        let order_before = self.order.clone();
        self.order.push(key.clone());
        self.paths.insert(key.clone(), path.clone());
        Ok(UserTreePathChange {
            path_key: key,
            before: None,
            after: Some(path),
            order_before,
            order_after: self.order.clone(),
        })
    }

    pub fn delete_path(&mut self, key: &str) -> Result<UserTreePathChange, PathError> {
        let before = self.require(key)?.clone();
        let order_before = self.order.clone();
        self.order.retain(|k| k != key);
        self.paths.remove(key);
        self.labeller.remove_label(key);
        tracing::info!("Deleted path {} ({})", key, before.name());
        Ok(UserTreePathChange {
            path_key: key.to_string(),
            before: Some(before),
            after: None,
            order_before,
            order_after: self.order.clone(),
        })
    }

    pub fn add_stop(&mut self, key: &str, stop: UserTreePathStop) -> Result<UserTreePathChange, PathError> {
        self.edit(key, |path| {
            path.stops_mut().push(stop);
            Ok(())
        })
    }

    pub fn insert_stop(
        &mut self,
        key: &str,
        index: usize,
        stop: UserTreePathStop,
    ) -> Result<UserTreePathChange, PathError> {
        self.edit(key, |path| {
            let len = path.len();
            if index > len {
                return Err(PathError::StopOutOfRange {
                    path: path.id().to_string(),
                    index,
                    len,
                });
            }
            path.stops_mut().insert(index, stop);
            Ok(())
        })
    }

    pub fn delete_stop(&mut self, key: &str, index: usize) -> Result<UserTreePathChange, PathError> {
        self.edit(key, |path| {
            let len = path.len();
            if index >= len {
                return Err(PathError::StopOutOfRange {
                    path: path.id().to_string(),
                    index,
                    len,
                });
            }
            path.stops_mut().remove(index);
            Ok(())
        })
    }

    pub fn replace_stop(
        &mut self,
        key: &str,
        index: usize,
        stop: UserTreePathStop,
    ) -> Result<UserTreePathChange, PathError> {
        self.edit(key, |path| {
            let len = path.len();
            let slot = path
                .stops_mut()
                .get_mut(index)
                .ok_or_else(|| PathError::StopOutOfRange {
                    path: key.to_string(),
                    index,
                    len,
                })?;
            *slot = stop;
            Ok(())
        })
    }

    pub fn rename_path(&mut self, key: &str, name: impl Into<String>) -> Result<UserTreePathChange, PathError> {
        let name = name.into();
        self.edit(key, |path| {
            path.set_name(name);
            Ok(())
        })
    }

    /// Move a path to `index` in the display order.
    pub fn move_path(&mut self, key: &str, index: usize) -> Result<UserTreePathChange, PathError> {
        let path = self.require(key)?.clone();
        let len = self.order.len();
        if index >= len {
            return Err(PathError::PositionOutOfRange { index, len });
        }
        let order_before = self.order.clone();
        self.order.retain(|k| k != key);
        self.order.insert(index, key.to_string());
        Ok(UserTreePathChange {
            path_key: key.to_string(),
            before: Some(path.clone()),
            after: Some(path),
            order_before,
            order_after: self.order.clone(),
        })
    }

    pub fn change_undo(&mut self, change: &UserTreePathChange) {
        self.install(&change.path_key, change.before.as_ref(), &change.order_before);
    }

    pub fn change_redo(&mut self, change: &UserTreePathChange) {
        self.install(&change.path_key, change.after.as_ref(), &change.order_after);
    }

    // ------------------------------------------------------------------
    // Cross-cutting cleanup
    // ------------------------------------------------------------------

    fn cleanup<F>(&mut self, fate: F) -> StopEdits
    where
        F: Fn(&UserTreePathStop) -> StopFate,
    {
        let mut edits = StopEdits::default();
        for key in self.order.clone() {
            let Some(path) = self.paths.get(&key) else {
                continue;
            };
            let fates: Vec<StopFate> = path.stops().iter().map(&fate).collect();
            let any_modified = fates.iter().any(|f| matches!(f, StopFate::Modify(_)));
            let any_dropped = fates.iter().any(|f| matches!(f, StopFate::Drop));

            if any_modified {
                let replacements: Vec<(usize, UserTreePathStop)> = fates
                    .iter()
                    .enumerate()
                    .filter_map(|(i, f)| match f {
                        StopFate::Modify(stop) => Some((i, stop.clone())),
                        _ => None,
                    })
                    .collect();
                if let Ok(change) = self.edit(&key, |p| {
                    for (i, stop) in replacements {
                        p.stops_mut()[i] = stop;
                    }
                    Ok(())
                }) {
                    edits.modified.push(change);
                }
            }

            if any_dropped {
                let mut index = 0;
                let doomed: Vec<bool> = fates.iter().map(|f| matches!(f, StopFate::Drop)).collect();
                if let Ok(change) = self.edit(&key, |p| {
                    p.stops_mut().retain(|_| {
                        let keep = !doomed[index];
                        index += 1;
                        keep
                    });
                    Ok(())
                }) {
                    edits.dropped.push(change);
                }
                if self.paths.get(&key).is_some_and(UserTreePath::is_empty)
                    && let Ok(change) = self.delete_path(&key)
                {
                    edits.deleted_paths.push(change);
                }
            }
        }
        edits
    }

    pub fn drop_stops_on_model(&mut self, model_id: &str) -> StopEdits {
        self.cleanup(|stop| {
            if stop.model_id() == Some(model_id) {
                StopFate::Drop
            } else {
                StopFate::Keep
            }
        })
    }

    pub fn drop_stops_on_node(&mut self, node_id: &NavNodeId) -> StopEdits {
        self.cleanup(|stop| {
            if stop.node_id() == Some(node_id) {
                StopFate::Drop
            } else {
                StopFate::Keep
            }
        })
    }

    /// Drop stops showing `overlay` on any model owned by `owner`.
    pub fn drop_stops_on_overlay(&mut self, owner: &OwnerKey, overlay: &str) -> StopEdits {
        self.cleanup(|stop| {
            if stop.owner().as_ref() == Some(owner) && stop.overlay() == Some(overlay) {
                StopFate::Drop
            } else {
                StopFate::Keep
            }
        })
    }

    /// Remove deleted modules from stops. A stop that loses every module is
    /// dropped; one that keeps some is modified in place.
    pub fn drop_or_change_stops_on_modules(
        &mut self,
        owner: &OwnerKey,
        overlay: &str,
        removed: &BTreeSet<String>,
    ) -> StopEdits {
        self.cleanup(|stop| {
            if stop.owner().as_ref() != Some(owner)
                || stop.overlay() != Some(overlay)
                || stop.modules().is_disjoint(removed)
            {
                return StopFate::Keep;
            }
            if stop.modules().is_subset(removed) {
                StopFate::Drop
            } else {
                StopFate::Modify(stop.without_modules(removed))
            }
        })
    }
}

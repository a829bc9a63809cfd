//! Navigation and view state: the model tree, overlay display state, user
//! paths, group visibility and the image store.
//!
//! Every mutating call returns a change record. Handing that record back to
//! the same manager's `change_undo` / `change_redo` installs the stored
//! before or after state.

pub mod group_settings;
pub mod image_manager;
pub mod nav_tree;
pub mod overlay;
pub mod user_path;

pub use group_settings::{GroupSettingChange, GroupSettingManager, GroupSettings, GroupVisibility};
pub use image_manager::{ImageChange, ImageEntry, ImageError, ImageManager, ImageSlot, LoadedImage};
pub use nav_tree::{
    ColorKey, GroupNodeEntry, GroupNodeMapEntry, NavNode, NavNodeContents, NavNodeRecord, NavTree,
    NavTreeChange, NavTreeError, NewNode, TreeState, XPlatModelNode, XPlatModelTree,
    XPlatOverlayDef,
};
pub use overlay::{
    NetOverlayController, OverlayCache, OverlayDisplayChange, OverlayDisplayState, OverlayError,
};
pub use user_path::{
    PathError, StopEdits, StopTarget, UserTreePath, UserTreePathChange, UserTreePathController,
    UserTreePathManager, UserTreePathStop,
};

//! User-authored paths through the model hierarchy.

mod controller;
mod manager;
mod path;
mod stop;

pub use controller::UserTreePathController;
pub use manager::{PathError, StopEdits, UserTreePathChange, UserTreePathManager};
pub use path::UserTreePath;
pub use stop::{StopTarget, UserTreePathStop};

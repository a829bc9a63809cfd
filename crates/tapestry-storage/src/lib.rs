//! XML persistence for navigation state.
//!
//! A saved session is one `<navigationState>` document holding the nav tree,
//! the user paths, the image store and the group visibility settings. Each
//! section is optional on read; a missing section loads as empty.

use roxmltree::Node;
use std::path::Path;
use std::str::FromStr;
use tapestry_core::{EnumConversionError, LabelError};
use tapestry_nav::{
    GroupSettingManager, ImageError, ImageManager, NavTree, NavTreeError, PathError,
    UserTreePathManager,
};
use thiserror::Error;

mod group_settings;
mod images;
mod nav_tree;
mod user_paths;
pub mod writer;

pub use writer::{Attrs, XmlWriter};

pub const ROOT_TAG: &str = "navigationState";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML error: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("Invalid enum value: {0}")]
    EnumConversion(#[from] EnumConversionError),
    #[error("<{element}> is missing attribute {attribute}")]
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },
    #[error("<{element}> has invalid {attribute}=\"{value}\"")]
    InvalidAttribute {
        element: String,
        attribute: &'static str,
        value: String,
    },
    #[error("Expected <{expected}>, found <{found}>")]
    UnexpectedElement {
        expected: &'static str,
        found: String,
    },
    #[error("Nav tree error: {0}")]
    NavTree(#[from] NavTreeError),
    #[error("Path error: {0}")]
    Path(#[from] PathError),
    #[error("Image error: {0}")]
    Image(#[from] ImageError),
    #[error("Label error: {0}")]
    Label(#[from] LabelError),
}

/// Everything restored from one saved document.
#[derive(Debug, Default)]
pub struct NavigationDocument {
    pub tree: NavTree,
    pub paths: UserTreePathManager,
    pub images: ImageManager,
    pub group_settings: GroupSettingManager,
}

/// Borrowed view of the live managers, for writing.
#[derive(Clone, Copy)]
pub struct DocumentRef<'a> {
    pub tree: &'a NavTree,
    pub paths: &'a UserTreePathManager,
    pub images: &'a ImageManager,
    pub group_settings: &'a GroupSettingManager,
}

impl<'a> From<&'a NavigationDocument> for DocumentRef<'a> {
    fn from(doc: &'a NavigationDocument) -> Self {
        Self {
            tree: &doc.tree,
            paths: &doc.paths,
            images: &doc.images,
            group_settings: &doc.group_settings,
        }
    }
}

pub fn write_document(doc: DocumentRef<'_>, indent: bool) -> String {
    let mut w = XmlWriter::new(indent);
    w.open(ROOT_TAG, Attrs::new());
    nav_tree::write_nav_tree(&mut w, doc.tree);
    user_paths::write_user_paths(&mut w, doc.paths);
    images::write_images(&mut w, doc.images);
    group_settings::write_group_settings(&mut w, doc.group_settings);
    w.close(ROOT_TAG);
    w.finish()
}

pub fn read_document(text: &str) -> Result<NavigationDocument, StorageError> {
    let xml = roxmltree::Document::parse(text)?;
    let root = xml.root_element();
    expect_tag(root, ROOT_TAG)?;

    let mut doc = NavigationDocument::default();
    for section in root.children().filter(Node::is_element) {
        match section.tag_name().name() {
            nav_tree::TAG => doc.tree = nav_tree::read_nav_tree(section)?,
            user_paths::TAG => doc.paths = user_paths::read_user_paths(section)?,
            images::TAG => doc.images = images::read_images(section)?,
            group_settings::TAG => {
                doc.group_settings = group_settings::read_group_settings(section)?
            }
            other => tracing::warn!("Skipping unknown section <{}>", other),
        }
    }
    tracing::debug!(
        "Read navigation state: {} nodes, {} paths, {} images",
        doc.tree.len(),
        doc.paths.len(),
        doc.images.len()
    );
    Ok(doc)
}

pub fn save_document(path: &Path, doc: DocumentRef<'_>, indent: bool) -> Result<(), StorageError> {
    let text = write_document(doc, indent);
    std::fs::write(path, text)?;
    tracing::info!("Saved navigation state to {}", path.display());
    Ok(())
}

pub fn load_document(path: &Path) -> Result<NavigationDocument, StorageError> {
    let text = std::fs::read_to_string(path)?;
    let doc = read_document(&text)?;
    tracing::info!("Loaded navigation state from {}", path.display());
    Ok(doc)
}

fn expect_tag(node: Node<'_, '_>, tag: &'static str) -> Result<(), StorageError> {
    if node.tag_name().name() == tag {
        Ok(())
    } else {
        Err(StorageError::UnexpectedElement {
            expected: tag,
            found: node.tag_name().name().to_string(),
        })
    }
}

fn child_elements<'a, 'i>(
    node: Node<'a, 'i>,
    tag: &'static str,
) -> impl Iterator<Item = Node<'a, 'i>> {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == tag)
}

fn first_child<'a, 'i>(node: Node<'a, 'i>, tag: &'static str) -> Option<Node<'a, 'i>> {
    child_elements(node, tag).next()
}

fn optional(node: Node<'_, '_>, attribute: &'static str) -> Option<String> {
    node.attribute(attribute).map(str::to_string)
}

fn required<'a>(node: Node<'a, '_>, attribute: &'static str) -> Result<&'a str, StorageError> {
    node.attribute(attribute)
        .ok_or_else(|| StorageError::MissingAttribute {
            element: node.tag_name().name().to_string(),
            attribute,
        })
}

fn parse_value<T: FromStr>(
    node: Node<'_, '_>,
    attribute: &'static str,
    value: &str,
) -> Result<T, StorageError> {
    value
        .trim()
        .parse()
        .map_err(|_| StorageError::InvalidAttribute {
            element: node.tag_name().name().to_string(),
            attribute,
            value: value.to_string(),
        })
}

fn parse_required<T: FromStr>(
    node: Node<'_, '_>,
    attribute: &'static str,
) -> Result<T, StorageError> {
    parse_value(node, attribute, required(node, attribute)?)
}

fn parse_optional<T: FromStr>(
    node: Node<'_, '_>,
    attribute: &'static str,
) -> Result<Option<T>, StorageError> {
    node.attribute(attribute)
        .map(|value| parse_value(node, attribute, value))
        .transpose()
}

#[cfg(test)]
mod tests;

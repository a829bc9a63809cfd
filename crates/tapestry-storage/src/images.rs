use super::*;
use tapestry_nav::ImageEntry;

pub(super) const TAG: &str = "images";
const IMAGE_TAG: &str = "image";

pub(super) fn write_images(w: &mut XmlWriter, images: &ImageManager) {
    w.open(TAG, Attrs::new());
    for key in images.keys() {
        if let Some(entry) = images.entry(&key) {
            w.text_leaf(
                IMAGE_TAG,
                Attrs::new().with("name", &key).with("type", &entry.type_tag),
                &entry.encoded,
            );
        }
    }
    w.close(TAG);
}

/// Images come back with a usage count of zero. The caller re-registers
/// usages from the tree and purges whatever stays unused.
pub(super) fn read_images(section: Node<'_, '_>) -> Result<ImageManager, StorageError> {
    let mut images = ImageManager::new();
    for node in child_elements(section, IMAGE_TAG) {
        let key = required(node, "name")?;
        let encoded: String = node
            .text()
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let entry = ImageEntry {
            encoded,
            type_tag: required(node, "type")?.to_string(),
        };
        entry.bytes()?;
        images.install_from_load(key, entry)?;
    }
    Ok(images)
}

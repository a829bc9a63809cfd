//! Reference-counted store of images used by group nodes and models.
//!
//! Images are kept as base64 text, exactly as they are written to a file.
//! Decoding to pixels happens on first use and is cached.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::DynamicImage;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tapestry_core::{LabelError, UniqueLabeller};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Invalid base64 image data: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("Unknown image: {0}")]
    UnknownImage(String),
}

/// Encoded bytes and the format tag written alongside them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    pub encoded: String,
    pub type_tag: String,
}

impl ImageEntry {
    /// Sniff the format and encode raw file bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageError> {
        let format = image::guess_format(bytes)?;
        let type_tag = format
            .extensions_str()
            .first()
            .copied()
            .unwrap_or("bin")
            .to_string();
        Ok(Self {
            encoded: STANDARD.encode(bytes),
            type_tag,
        })
    }

    pub fn bytes(&self) -> Result<Vec<u8>, ImageError> {
        Ok(STANDARD.decode(self.encoded.as_bytes())?)
    }
}

/// Result of the file-reading half of an image load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    pub path: PathBuf,
    pub entry: ImageEntry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSlot {
    pub entry: ImageEntry,
    pub count: usize,
}

/// Before/after record of one image key. Carries the full payload so an
/// evicted image can be put back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageChange {
    pub key: String,
    pub before: Option<ImageSlot>,
    pub after: Option<ImageSlot>,
}

#[derive(Debug)]
pub struct ImageManager {
    slots: HashMap<String, ImageSlot>,
    decoded: HashMap<String, Arc<DynamicImage>>,
    labeller: UniqueLabeller,
}

impl Default for ImageManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageManager {
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            decoded: HashMap::new(),
            labeller: UniqueLabeller::with_prefix("img"),
        }
    }

    /// Read and encode an image file. Touches no manager state, so it can
    /// run on a worker thread.
    pub fn load_image_from_file_start(path: &Path) -> Result<LoadedImage, ImageError> {
        let bytes = std::fs::read(path)?;
        let entry = ImageEntry::from_bytes(&bytes)?;
        tracing::debug!("Read image {:?} ({} bytes, {})", path, bytes.len(), entry.type_tag);
        Ok(LoadedImage {
            path: path.to_path_buf(),
            entry,
        })
    }

    /// Store a loaded image, reusing the key of an identical image if there
    /// is one. Either way the caller holds one new usage of the key.
    pub fn load_image_from_file_finish(&mut self, loaded: LoadedImage) -> (String, ImageChange) {
        self.add_entry(loaded.entry)
    }

    pub fn add_entry(&mut self, entry: ImageEntry) -> (String, ImageChange) {
        let key = match self.key_for(&entry) {
            Some(key) => key,
            None => self.labeller.next_label(),
        };
        let before = self.slots.get(&key).cloned();
        let after = ImageSlot {
            entry: before.as_ref().map_or(entry, |s| s.entry.clone()),
            count: before.as_ref().map_or(1, |s| s.count + 1),
        };
        self.slots.insert(key.clone(), after.clone());
        (
            key.clone(),
            ImageChange {
                key,
                before,
                after: Some(after),
            },
        )
    }

    /// Store a loaded image without taking a usage. Identical bytes reuse
    /// the existing key and record no change; a new image starts at zero
    /// usages until something refers to it.
    pub fn store_image(&mut self, loaded: LoadedImage) -> (String, Option<ImageChange>) {
        if let Some(key) = self.key_for(&loaded.entry) {
            return (key, None);
        }
        let key = self.labeller.next_label();
        let after = ImageSlot {
            entry: loaded.entry,
            count: 0,
        };
        self.slots.insert(key.clone(), after.clone());
        (
            key.clone(),
            Some(ImageChange {
                key,
                before: None,
                after: Some(after),
            }),
        )
    }

    fn key_for(&self, entry: &ImageEntry) -> Option<String> {
        self.slots
            .iter()
            .find(|(_, slot)| slot.entry.encoded == entry.encoded)
            .map(|(key, _)| key.clone())
    }

    /// Install an image read from a file under its saved key, with no usages yet.
    pub fn install_from_load(&mut self, key: &str, entry: ImageEntry) -> Result<(), LabelError> {
        self.labeller.add_existing_label(key)?;
        self.slots.insert(key.to_string(), ImageSlot { entry, count: 0 });
        Ok(())
    }

    pub fn register_image_usage(&mut self, key: &str) -> Result<ImageChange, ImageError> {
        let slot = self
            .slots
            .get_mut(key)
            .ok_or_else(|| ImageError::UnknownImage(key.to_string()))?;
        let before = slot.clone();
        slot.count += 1;
        Ok(ImageChange {
            key: key.to_string(),
            before: Some(before),
            after: Some(slot.clone()),
        })
    }

    /// Release one usage; the last release evicts the image entirely.
    pub fn drop_image_usage(&mut self, key: &str) -> Result<ImageChange, ImageError> {
        let before = self
            .slots
            .get(key)
            .cloned()
            .ok_or_else(|| ImageError::UnknownImage(key.to_string()))?;
        let after = (before.count > 1).then(|| ImageSlot {
            entry: before.entry.clone(),
            count: before.count - 1,
        });
        self.install(key, after.as_ref());
        Ok(ImageChange {
            key: key.to_string(),
            before: Some(before),
            after,
        })
    }

    /// Evict images nobody uses, as after a file load.
    pub fn purge_unused(&mut self) -> Vec<ImageChange> {
        let mut unused: Vec<String> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.count == 0)
            .map(|(key, _)| key.clone())
            .collect();
        unused.sort();
        unused
            .into_iter()
            .map(|key| {
                let before = self.slots.get(&key).cloned();
                self.install(&key, None);
                ImageChange {
                    key,
                    before,
                    after: None,
                }
            })
            .collect()
    }

    fn install(&mut self, key: &str, slot: Option<&ImageSlot>) {
        match slot {
            Some(slot) => {
                if !self.labeller.contains(key)
                    && let Err(e) = self.labeller.add_existing_label(key)
                {
                    tracing::debug!("Image key {} not reserved: {}", key, e);
                }
                let changed = self
                    .slots
                    .get(key)
                    .is_none_or(|old| old.entry != slot.entry);
                if changed {
                    self.decoded.remove(key);
                }
                self.slots.insert(key.to_string(), slot.clone());
            }
            None => {
                self.slots.remove(key);
                self.decoded.remove(key);
                self.labeller.remove_label(key);
                tracing::debug!("Evicted image {}", key);
            }
        }
    }

    pub fn change_undo(&mut self, change: &ImageChange) {
        self.install(&change.key, change.before.as_ref());
    }

    pub fn change_redo(&mut self, change: &ImageChange) {
        self.install(&change.key, change.after.as_ref());
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.decoded.clear();
        self.labeller = UniqueLabeller::with_prefix("img");
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    pub fn count(&self, key: &str) -> usize {
        self.slots.get(key).map_or(0, |s| s.count)
    }

    pub fn entry(&self, key: &str) -> Option<&ImageEntry> {
        self.slots.get(key).map(|s| &s.entry)
    }

    pub fn encoded(&self, key: &str) -> Option<&str> {
        self.entry(key).map(|e| e.encoded.as_str())
    }

    pub fn type_tag(&self, key: &str) -> Option<&str> {
        self.entry(key).map(|e| e.type_tag.as_str())
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.slots.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Decoded pixels for `key`, decoded on first request.
    pub fn image(&mut self, key: &str) -> Result<Option<Arc<DynamicImage>>, ImageError> {
        if let Some(img) = self.decoded.get(key) {
            return Ok(Some(Arc::clone(img)));
        }
        let Some(slot) = self.slots.get(key) else {
            return Ok(None);
        };
        let bytes = slot.entry.bytes()?;
        let img = Arc::new(image::load_from_memory(&bytes)?);
        self.decoded.insert(key.to_string(), Arc::clone(&img));
        Ok(Some(img))
    }
}

//! Registries that turn encoded images into caller-facing handles.

mod temp;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;

use crate::error::ThumbnailError;
use crate::media::EncodedImage;

pub use temp::TempDirBlobRegistry;

/// Issues opaque handles for encoded images and invalidates them on request.
pub trait BlobRegistry: Send + Sync + 'static {
    fn create_object_url(&self, image: EncodedImage) -> Result<String, ThumbnailError>;

    /// Releases the backing storage. Unknown or already revoked handles are ignored.
    fn revoke_object_url(&self, url: &str);
}

const MEMORY_URL_PREFIX: &str = "blob:video-thumbnails/";

static SHARED_REGISTRY: LazyLock<Arc<MemoryBlobRegistry>> =
    LazyLock::new(|| Arc::new(MemoryBlobRegistry::new()));

/// Keeps encoded images in memory behind `blob:` handles.
#[derive(Debug, Default)]
pub struct MemoryBlobRegistry {
    entries: Mutex<HashMap<String, EncodedImage>>,
    next_id: AtomicU64,
}

impl MemoryBlobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry, analogous to a browser's object URL store.
    pub fn shared() -> Arc<MemoryBlobRegistry> {
        Arc::clone(&SHARED_REGISTRY)
    }

    pub fn get(&self, url: &str) -> Option<EncodedImage> {
        self.entries.lock().get(url).cloned()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.lock().contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl BlobRegistry for MemoryBlobRegistry {
    fn create_object_url(&self, image: EncodedImage) -> Result<String, ThumbnailError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let url = format!("{}{}", MEMORY_URL_PREFIX, id);
        log::trace!(
            target: "video_thumbnails::blob",
            "registered {} ({} bytes, {})",
            url,
            image.bytes.len(),
            image.mime_type
        );
        self.entries.lock().insert(url.clone(), image);
        Ok(url)
    }

    fn revoke_object_url(&self, url: &str) {
        if self.entries.lock().remove(url).is_some() {
            log::trace!(target: "video_thumbnails::blob", "revoked {}", url);
        }
    }
}
